//! Value-level expressions and the hash-consing [`ExprArena`].
//!
//! Bounds, lengths and refinement predicates are small arithmetic/boolean
//! trees over parameter names and literals. Nodes live in an arena addressed
//! by [`ExprId`]; interning the same node twice returns the same id, so a
//! length expression mentioned by two parameters is a single node referenced
//! twice and structural equality is id equality.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::ExprId;

/// Binary operators, arithmetic through logical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    /// Source-level spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 5,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 3
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// One step from a value to a component of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathStep {
    /// A named record field.
    Field(String),
    /// Every element of a sequence.
    Element,
    /// The payload of an optional value, when present.
    Present,
}

/// Path from a root value to the constrained component.
pub type ValuePath = Vec<PathStep>;

/// The value a [`Place`] starts from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Root {
    /// A named parameter.
    Param(String),
    /// The function's return value.
    Result,
    /// The value of a named record under construction (invariant scope).
    Record(String),
}

impl Root {
    /// Name used for this root in rendered expressions.
    pub fn name(&self) -> &str {
        match self {
            Root::Param(name) => name,
            Root::Result => "result",
            Root::Record(_) => "self",
        }
    }
}

/// A resolved reference to (a component of) a parameter, the result, or a
/// record value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Place {
    pub root: Root,
    pub path: ValuePath,
}

impl Place {
    pub fn root(root: Root) -> Self {
        Place {
            root,
            path: Vec::new(),
        }
    }

    pub fn param(name: &str) -> Self {
        Place::root(Root::Param(name.to_string()))
    }

    /// Returns this place extended by one step.
    pub fn child(&self, step: PathStep) -> Self {
        let mut path = self.path.clone();
        path.push(step);
        Place {
            root: self.root.clone(),
            path,
        }
    }

    /// True when the path passes through no sequence element or optional
    /// payload, i.e. the place names exactly one value per call.
    pub fn is_singular(&self) -> bool {
        self.path.iter().all(|s| matches!(s, PathStep::Field(_)))
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.name())?;
        for step in &self.path {
            match step {
                PathStep::Field(name) => write!(f, ".{name}")?,
                PathStep::Element => write!(f, "[*]")?,
                PathStep::Present => write!(f, "?")?,
            }
        }
        Ok(())
    }
}

/// A node of a value-level expression.
///
/// The parser produces `Symbol`, `SelfRef`, `Field`, `Len` and `Succ`; the
/// constraint extractor rewrites symbols into `Place` or `Implicit`
/// references once names are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueExpr {
    Int(i64),
    Bool(bool),
    /// An unresolved name as written in the source.
    Symbol(String),
    /// `self` inside a refinement predicate.
    SelfRef,
    /// A resolved reference to a value.
    Place(Place),
    /// An implicit length variable (not a parameter), e.g. `m` in `n+m`.
    Implicit(String),
    /// Length of a sequence.
    Len(ExprId),
    /// Successor, `S(n)` = `n + 1`.
    Succ(ExprId),
    /// Field access on a record-valued expression.
    Field(ExprId, String),
    Unary(UnOp, ExprId),
    Binary(BinOp, ExprId, ExprId),
}

/// Hash-consing arena of [`ValueExpr`] nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<ValueExpr>", into = "Vec<ValueExpr>")]
pub struct ExprArena {
    nodes: Vec<ValueExpr>,
    index: HashMap<ValueExpr, ExprId>,
}

impl From<Vec<ValueExpr>> for ExprArena {
    fn from(nodes: Vec<ValueExpr>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.clone(), ExprId(i as u32)))
            .collect();
        ExprArena { nodes, index }
    }
}

impl From<ExprArena> for Vec<ValueExpr> {
    fn from(arena: ExprArena) -> Self {
        arena.nodes
    }
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a node, returning the existing id when an identical node is
    /// already present.
    pub fn intern(&mut self, node: ValueExpr) -> ExprId {
        if let Some(id) = self.index.get(&node) {
            return *id;
        }
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node.clone());
        self.index.insert(node, id);
        id
    }

    /// Looks up a node.
    ///
    /// # Panics
    /// If `id` was not issued by this arena.
    pub fn get(&self, id: ExprId) -> &ValueExpr {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.intern(ValueExpr::Int(value))
    }

    pub fn boolean(&mut self, value: bool) -> ExprId {
        self.intern(ValueExpr::Bool(value))
    }

    pub fn place(&mut self, place: Place) -> ExprId {
        self.intern(ValueExpr::Place(place))
    }

    pub fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.intern(ValueExpr::Binary(op, lhs, rhs))
    }

    pub fn len_of(&mut self, base: ExprId) -> ExprId {
        self.intern(ValueExpr::Len(base))
    }

    /// Field access that folds into the place when the base is already a
    /// resolved place (`xs.rows` becomes `Place{xs, [rows]}`).
    pub fn field(&mut self, base: ExprId, name: &str) -> ExprId {
        if let ValueExpr::Place(place) = self.get(base) {
            let folded = place.child(PathStep::Field(name.to_string()));
            return self.place(folded);
        }
        self.intern(ValueExpr::Field(base, name.to_string()))
    }

    /// Immediate children of a node, left to right.
    pub fn children(&self, id: ExprId) -> Vec<ExprId> {
        match self.get(id) {
            ValueExpr::Len(a) | ValueExpr::Succ(a) | ValueExpr::Field(a, _) => vec![*a],
            ValueExpr::Unary(_, a) => vec![*a],
            ValueExpr::Binary(_, a, b) => vec![*a, *b],
            _ => Vec::new(),
        }
    }

    /// Unresolved symbol names in first-occurrence order.
    pub fn symbols(&self, id: ExprId) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(id, &mut |node| {
            if let ValueExpr::Symbol(name) = node {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        });
        out
    }

    /// Implicit length variables in first-occurrence order.
    pub fn implicits(&self, id: ExprId) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(id, &mut |node| {
            if let ValueExpr::Implicit(name) = node {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        });
        out
    }

    /// Resolved places in first-occurrence order.
    pub fn places(&self, id: ExprId) -> Vec<Place> {
        let mut out = Vec::new();
        self.walk(id, &mut |node| {
            if let ValueExpr::Place(place) = node {
                if !out.contains(place) {
                    out.push(place.clone());
                }
            }
        });
        out
    }

    /// Pre-order traversal.
    pub fn walk(&self, id: ExprId, visit: &mut impl FnMut(&ValueExpr)) {
        visit(self.get(id));
        for child in self.children(id) {
            self.walk(child, visit);
        }
    }

    /// Rebuilds an expression bottom-up. `replace` is consulted first for
    /// every node; returning `Some` substitutes that subtree wholesale,
    /// `None` rebuilds the node from its rewritten children.
    pub fn rewrite<E>(
        &mut self,
        id: ExprId,
        replace: &mut impl FnMut(&mut ExprArena, &ValueExpr) -> Result<Option<ExprId>, E>,
    ) -> Result<ExprId, E> {
        let node = self.get(id).clone();
        if let Some(done) = replace(self, &node)? {
            return Ok(done);
        }
        let rebuilt = match node {
            ValueExpr::Len(a) => {
                let a = self.rewrite(a, replace)?;
                self.len_of(a)
            }
            ValueExpr::Succ(a) => {
                let a = self.rewrite(a, replace)?;
                self.intern(ValueExpr::Succ(a))
            }
            ValueExpr::Field(a, name) => {
                let a = self.rewrite(a, replace)?;
                self.field(a, &name)
            }
            ValueExpr::Unary(op, a) => {
                let a = self.rewrite(a, replace)?;
                self.intern(ValueExpr::Unary(op, a))
            }
            ValueExpr::Binary(op, a, b) => {
                let a = self.rewrite(a, replace)?;
                let b = self.rewrite(b, replace)?;
                self.binary(op, a, b)
            }
            other => self.intern(other),
        };
        Ok(rebuilt)
    }

    /// Constant folding and arithmetic identities (`x + 0`, `S(k)`, `x - 0`,
    /// `1 * x`). Leaves everything it cannot fold intact.
    pub fn simplify(&mut self, id: ExprId) -> ExprId {
        match self.get(id).clone() {
            ValueExpr::Succ(a) => {
                let a = self.simplify(a);
                match self.get(a) {
                    ValueExpr::Int(k) => self.int(k.saturating_add(1)),
                    _ => {
                        let one = self.int(1);
                        self.simplify_binary(BinOp::Add, a, one)
                    }
                }
            }
            ValueExpr::Binary(op, a, b) => {
                let a = self.simplify(a);
                let b = self.simplify(b);
                self.simplify_binary(op, a, b)
            }
            ValueExpr::Unary(UnOp::Neg, a) => {
                let a = self.simplify(a);
                match self.get(a) {
                    ValueExpr::Int(k) => self.int(k.saturating_neg()),
                    _ => self.intern(ValueExpr::Unary(UnOp::Neg, a)),
                }
            }
            ValueExpr::Len(a) => {
                let a = self.simplify(a);
                self.len_of(a)
            }
            _ => id,
        }
    }

    fn simplify_binary(&mut self, op: BinOp, a: ExprId, b: ExprId) -> ExprId {
        let (lhs, rhs) = (self.get(a).clone(), self.get(b).clone());
        match (op, &lhs, &rhs) {
            (BinOp::Add, ValueExpr::Int(x), ValueExpr::Int(y)) => self.int(x.saturating_add(*y)),
            (BinOp::Sub, ValueExpr::Int(x), ValueExpr::Int(y)) => self.int(x.saturating_sub(*y)),
            (BinOp::Mul, ValueExpr::Int(x), ValueExpr::Int(y)) => self.int(x.saturating_mul(*y)),
            (BinOp::Add, _, ValueExpr::Int(0)) | (BinOp::Sub, _, ValueExpr::Int(0)) => a,
            (BinOp::Add, ValueExpr::Int(0), _) => b,
            (BinOp::Mul, _, ValueExpr::Int(1)) => a,
            (BinOp::Mul, ValueExpr::Int(1), _) => b,
            (BinOp::Mul, _, ValueExpr::Int(0)) | (BinOp::Mul, ValueExpr::Int(0), _) => self.int(0),
            // (x + k1) + k2 => x + (k1 + k2)
            (BinOp::Add, ValueExpr::Binary(BinOp::Add, inner, k1), ValueExpr::Int(k2)) => {
                match self.get(*k1).clone() {
                    ValueExpr::Int(k1) => {
                        let k = self.int(k1.saturating_add(*k2));
                        let inner = *inner;
                        self.simplify_binary(BinOp::Add, inner, k)
                    }
                    _ => self.binary(op, a, b),
                }
            }
            _ => self.binary(op, a, b),
        }
    }

    /// Renders an expression in source syntax with minimal parentheses.
    pub fn render(&self, id: ExprId) -> String {
        let mut out = String::new();
        self.render_into(id, 0, &mut out);
        out
    }

    fn render_into(&self, id: ExprId, min_prec: u8, out: &mut String) {
        match self.get(id) {
            ValueExpr::Int(v) => out.push_str(&v.to_string()),
            ValueExpr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            ValueExpr::Symbol(name) | ValueExpr::Implicit(name) => out.push_str(name),
            ValueExpr::SelfRef => out.push_str("self"),
            ValueExpr::Place(place) => out.push_str(&place.to_string()),
            ValueExpr::Len(a) => {
                out.push_str("len(");
                self.render_into(*a, 0, out);
                out.push(')');
            }
            ValueExpr::Succ(a) => {
                out.push_str("S(");
                self.render_into(*a, 0, out);
                out.push(')');
            }
            ValueExpr::Field(a, name) => {
                self.render_into(*a, 7, out);
                out.push('.');
                out.push_str(name);
            }
            ValueExpr::Unary(op, a) => {
                let wrap = min_prec > 6;
                if wrap {
                    out.push('(');
                }
                out.push(match op {
                    UnOp::Neg => '-',
                    UnOp::Not => '!',
                });
                self.render_into(*a, 6, out);
                if wrap {
                    out.push(')');
                }
            }
            ValueExpr::Binary(op, a, b) => {
                let prec = op.precedence();
                let wrap = prec < min_prec;
                if wrap {
                    out.push('(');
                }
                let lhs_prec = if op.is_comparison() { prec + 1 } else { prec };
                self.render_into(*a, lhs_prec, out);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                self.render_into(*b, prec + 1, out);
                if wrap {
                    out.push(')');
                }
            }
        }
    }
}
