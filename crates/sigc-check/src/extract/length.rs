//! Additive length expressions and implicit length variables.
//!
//! A length such as `n + m` where `m` is not a parameter leaves `m` to the
//! caller. The sequence declaring that length fixes `m` implicitly
//! (`m = len(xs) - n`), so other positions mentioning `m` can still be
//! checked exactly while `xs` itself can only be checked against its lower
//! bound.

use sigc_core::{BinOp, ExprArena, ExprId, ValueExpr};

/// One signed term of a sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Term {
    pub positive: bool,
    pub expr: ExprId,
}

/// Flattens `+`, `-` and `S(..)` into signed terms. Any other node is a
/// single positive term.
pub(crate) fn additive_terms(exprs: &mut ExprArena, id: ExprId) -> Vec<Term> {
    let mut terms = Vec::new();
    collect(exprs, id, true, &mut terms);
    terms
}

fn collect(exprs: &mut ExprArena, id: ExprId, positive: bool, out: &mut Vec<Term>) {
    match exprs.get(id).clone() {
        ValueExpr::Binary(BinOp::Add, a, b) => {
            collect(exprs, a, positive, out);
            collect(exprs, b, positive, out);
        }
        ValueExpr::Binary(BinOp::Sub, a, b) => {
            collect(exprs, a, positive, out);
            collect(exprs, b, !positive, out);
        }
        ValueExpr::Succ(a) => {
            collect(exprs, a, positive, out);
            let one = exprs.int(1);
            out.push(Term {
                positive,
                expr: one,
            });
        }
        _ => out.push(Term { positive, expr: id }),
    }
}

/// True when `var` occurs in `expr` exactly once, as a whole positive term
/// of the top-level sum. Only then can it be solved for or weakened to 0.
pub(crate) fn is_lone_positive_term(exprs: &mut ExprArena, expr: ExprId, var: &str) -> bool {
    let terms = additive_terms(exprs, expr);
    let mut exact = 0;
    for term in &terms {
        let is_var = matches!(exprs.get(term.expr), ValueExpr::Implicit(name) if name == var);
        if is_var {
            if !term.positive {
                return false;
            }
            exact += 1;
        } else if exprs.implicits(term.expr).iter().any(|name| name == var) {
            return false;
        }
    }
    exact == 1
}

/// Builds `len_expr - (sum of the other terms)`, solving `var` out of the
/// length expression `expr`.
pub(crate) fn solve_for(
    exprs: &mut ExprArena,
    expr: ExprId,
    var: &str,
    len_expr: ExprId,
) -> ExprId {
    let terms = additive_terms(exprs, expr);
    let mut acc = len_expr;
    for term in terms {
        if matches!(exprs.get(term.expr), ValueExpr::Implicit(name) if name == var) {
            continue;
        }
        let op = if term.positive { BinOp::Sub } else { BinOp::Add };
        acc = exprs.binary(op, acc, term.expr);
    }
    exprs.simplify(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigc_core::Place;

    fn implicit(exprs: &mut ExprArena, name: &str) -> ExprId {
        exprs.intern(ValueExpr::Implicit(name.into()))
    }

    #[test]
    fn successor_contributes_a_positive_one() {
        let mut exprs = ExprArena::new();
        let n = implicit(&mut exprs, "n");
        let one = exprs.int(1);
        let succ = exprs.intern(ValueExpr::Succ(n));
        let terms = additive_terms(&mut exprs, succ);
        assert_eq!(
            terms,
            vec![
                Term { positive: true, expr: n },
                Term { positive: true, expr: one },
            ]
        );
    }

    #[test]
    fn lone_positive_term_detection() {
        let mut exprs = ExprArena::new();
        let n = exprs.place(Place::param("n"));
        let m = implicit(&mut exprs, "m");
        let sum = exprs.binary(BinOp::Add, n, m);
        assert!(is_lone_positive_term(&mut exprs, sum, "m"));

        let diff = exprs.binary(BinOp::Sub, n, m);
        assert!(!is_lone_positive_term(&mut exprs, diff, "m"));

        let prod = exprs.binary(BinOp::Mul, n, m);
        assert!(!is_lone_positive_term(&mut exprs, prod, "m"));

        let twice = exprs.binary(BinOp::Add, m, m);
        assert!(!is_lone_positive_term(&mut exprs, twice, "m"));
    }

    #[test]
    fn solving_for_the_remainder() {
        let mut exprs = ExprArena::new();
        let n = exprs.place(Place::param("n"));
        let m = implicit(&mut exprs, "m");
        let sum = exprs.binary(BinOp::Add, n, m);
        let xs = exprs.place(Place::param("xs"));
        let len = exprs.len_of(xs);
        let solved = solve_for(&mut exprs, sum, "m", len);
        assert_eq!(exprs.render(solved), "len(xs) - n");
    }

    #[test]
    fn solving_successor_subtracts_one() {
        let mut exprs = ExprArena::new();
        let n = implicit(&mut exprs, "n");
        let succ = exprs.intern(ValueExpr::Succ(n));
        let xs = exprs.place(Place::param("xs"));
        let len = exprs.len_of(xs);
        let solved = solve_for(&mut exprs, succ, "n", len);
        assert_eq!(exprs.render(solved), "len(xs) - 1");
    }
}
