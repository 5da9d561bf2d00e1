//! Contract synthesis: lower a [`ConstraintModel`] into [`ContractCode`].
//!
//! Checks follow the model's check order, so a check never runs before the
//! checks that validate the values it reads. Constraints on sequence
//! elements are wrapped in loops; `Disjoint` constraints become exhaustive
//! matches with their payload constraints inside the present branch.

use tracing::debug;

use sigc_core::{BinOp, ConstraintId, ExprId, PathStep, Place, Signature, ValueExpr, Visibility};

use crate::fingerprint::source_fingerprint;
use crate::model::{Constraint, ConstraintKind, ConstraintModel, Scope};

use super::profile::{EmissionProfile, OptionalRepresentation};
use super::{
    CheckExpr, CheckStmt, ContractCode, ContractKind, HookPoint, ParamName, RecordInvariant,
    UnreachableFallback,
};

/// A constraint the synthesizer cannot express as a check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// A place steps into a sequence element or optional payload that no
    /// enclosing loop or match binds.
    #[error("check {constraint} reads `{place}` outside any loop or match binding it")]
    UnboundPath {
        constraint: ConstraintId,
        place: String,
    },
    /// Field access on a computed value.
    #[error("check {constraint} accesses field `{field}` of a computed value")]
    ComputedField {
        constraint: ConstraintId,
        field: String,
    },
}

/// Synthesizes the runtime contracts of `sig` from its constraint model.
pub fn synthesize(
    sig: &Signature,
    model: &ConstraintModel,
    profile: &EmissionProfile,
) -> Result<ContractCode, SynthesisError> {
    let mut lowering = Lowering {
        model,
        profile,
        binders: Vec::new(),
    };

    let mut preconditions = Vec::new();
    for constraint in model.ordered(|c| c.scope.is_precondition() && c.parent.is_none()) {
        preconditions.extend(lowering.constraint(constraint)?);
    }

    let mut postconditions = Vec::new();
    for constraint in model.ordered(|c| c.scope == Scope::Return && c.parent.is_none()) {
        postconditions.extend(lowering.constraint(constraint)?);
    }

    let mut invariants = Vec::new();
    let mut hooks = vec![HookPoint::Entry, HookPoint::BeforeReturn];
    for (record, constraints) in model.invariants() {
        let mut checks = Vec::new();
        for constraint in constraints.into_iter().filter(|c| c.parent.is_none()) {
            checks.extend(lowering.constraint(constraint)?);
        }
        hooks.push(HookPoint::Construct(record.clone()));
        invariants.push(RecordInvariant { record, checks });
    }

    let styled = profile.style(&sig.name);
    let function_name = match sig.visibility {
        Visibility::Private => format!("{}{styled}", profile.private_prefix),
        Visibility::Public => styled,
    };

    debug!(
        function = %sig.name,
        preconditions = preconditions.len(),
        postconditions = postconditions.len(),
        invariants = invariants.len(),
        "contracts synthesized"
    );

    Ok(ContractCode {
        function_name,
        source_name: sig.name.clone(),
        params: sig
            .params
            .iter()
            .map(|p| ParamName {
                source: p.name.clone(),
                emitted: profile.style(&p.name),
            })
            .collect(),
        result_name: "result".to_string(),
        preconditions,
        postconditions,
        invariants,
        hooks,
        profile: profile.clone(),
        source_fingerprint: source_fingerprint(&sig.source),
    })
}

/// The phase a constraint is checked in.
pub fn contract_kind(scope: &Scope) -> ContractKind {
    match scope {
        Scope::Parameter(_) | Scope::CrossParameter(_) => ContractKind::Precondition,
        Scope::Return => ContractKind::Postcondition,
        Scope::Record(_) => ContractKind::Invariant,
    }
}

struct Lowering<'m> {
    model: &'m ConstraintModel,
    profile: &'m EmissionProfile,
    /// Places bound by enclosing loops and matches, innermost last. Each
    /// place ends in the `Element` or `Present` step it binds.
    binders: Vec<(Place, String)>,
}

impl Lowering<'_> {
    /// Checks for one constraint, wrapped in loops over every sequence
    /// element its subject passes through.
    fn constraint(&mut self, constraint: &Constraint) -> Result<Vec<CheckStmt>, SynthesisError> {
        let subject = constraint.subject().clone();
        let bound = self
            .binders
            .iter()
            .filter(|(place, _)| is_prefix(place, &subject))
            .map(|(place, _)| place.path.len())
            .max()
            .unwrap_or(0);

        let Some(offset) = subject.path[bound..]
            .iter()
            .position(|step| !matches!(step, PathStep::Field(_)))
        else {
            return self.check(constraint).map(|stmt| vec![stmt]);
        };

        let step_at = bound + offset;
        let container = Place {
            root: subject.root.clone(),
            path: subject.path[..step_at].to_vec(),
        };
        let stepped = container.child(subject.path[step_at].clone());
        let target = self.place(&container, constraint.id)?;
        let depth = self.binders.len();

        let stmt = match subject.path[step_at] {
            PathStep::Element => {
                let binder = format!("elem{depth}");
                self.binders.push((stepped, binder.clone()));
                let body = self.constraint(constraint);
                self.binders.pop();
                CheckStmt::ForEach {
                    constraint: constraint.id,
                    sequence: target,
                    binder,
                    body: body?,
                }
            }
            // Payload constraints normally sit inside their parent's match.
            // One reached directly still gets an exhaustive match.
            _ => {
                let binder = format!("value{depth}");
                self.binders.push((stepped, binder.clone()));
                let body = self.constraint(constraint);
                self.binders.pop();
                CheckStmt::MatchOptional {
                    constraint: constraint.id,
                    subject: target,
                    binder,
                    on_absent: Vec::new(),
                    on_present: body?,
                    fallback: self.fallback(constraint),
                }
            }
        };
        Ok(vec![stmt])
    }

    fn fallback(&self, constraint: &Constraint) -> Option<UnreachableFallback> {
        match self.profile.optional_representation {
            OptionalRepresentation::Tagged => None,
            OptionalRepresentation::Nullable => Some(UnreachableFallback {
                message: format!(
                    "unreachable case [{} {}]: {} is neither absent nor present",
                    constraint.id,
                    constraint.kind.label(),
                    constraint.subject()
                ),
            }),
        }
    }

    /// The check itself, once every element step of the subject is bound.
    fn check(&mut self, constraint: &Constraint) -> Result<CheckStmt, SynthesisError> {
        let id = constraint.id;
        let subject = self.place(constraint.subject(), id)?;

        let condition = match &constraint.kind {
            ConstraintKind::Disjoint => {
                let depth = self.binders.len();
                let binder = format!("value{depth}");
                self.binders
                    .push((constraint.subject().child(PathStep::Present), binder.clone()));
                let model = self.model;
                let mut on_present = Vec::new();
                let mut result = Ok(());
                for child in model.children(id) {
                    match self.constraint(child) {
                        Ok(stmts) => on_present.extend(stmts),
                        Err(err) => {
                            result = Err(err);
                            break;
                        }
                    }
                }
                self.binders.pop();
                result?;
                return Ok(CheckStmt::MatchOptional {
                    constraint: id,
                    subject,
                    binder,
                    on_absent: Vec::new(),
                    on_present,
                    fallback: self.fallback(constraint),
                });
            }
            ConstraintKind::Nonnegative => {
                CheckExpr::binary(BinOp::Ge, subject, CheckExpr::Int(0))
            }
            ConstraintKind::IndexBound { bound } => {
                let bound = self.expr(*bound, id)?;
                CheckExpr::binary(
                    BinOp::And,
                    CheckExpr::binary(BinOp::Le, CheckExpr::Int(0), subject.clone()),
                    CheckExpr::binary(BinOp::Lt, subject, bound),
                )
            }
            ConstraintKind::LengthEquals { length } => {
                let declared = *length;
                let length = self.expr(declared, id)?;
                let mut condition: Option<CheckExpr> = None;
                for place in &constraint.subjects {
                    // The binding sequence is its own measure.
                    if measures(self.model, declared, place) {
                        continue;
                    }
                    let side = CheckExpr::binary(
                        BinOp::Eq,
                        CheckExpr::len(self.place(place, id)?),
                        length.clone(),
                    );
                    condition = Some(match condition {
                        Some(prev) => CheckExpr::binary(BinOp::And, prev, side),
                        None => side,
                    });
                }
                condition.unwrap_or(CheckExpr::Bool(true))
            }
            ConstraintKind::LengthAtLeast { minimum } => {
                let minimum = self.expr(*minimum, id)?;
                CheckExpr::binary(BinOp::Ge, CheckExpr::len(subject), minimum)
            }
            ConstraintKind::PredicateHolds { predicate } => self.expr(*predicate, id)?,
        };

        Ok(CheckStmt::Assert {
            constraint: id,
            condition,
            message: failure_message(self.model, constraint),
        })
    }

    /// A place as a variable: the innermost binder covering it, or its root,
    /// followed by field accesses.
    fn place(&self, place: &Place, constraint: ConstraintId) -> Result<CheckExpr, SynthesisError> {
        let binder = self
            .binders
            .iter()
            .rev()
            .filter(|(bound, _)| is_prefix(bound, place))
            .max_by_key(|(bound, _)| bound.path.len());
        let (name, rest) = match binder {
            Some((bound, name)) => (name.clone(), &place.path[bound.path.len()..]),
            None => (place.root.name().to_string(), &place.path[..]),
        };
        let mut fields = Vec::with_capacity(rest.len());
        for step in rest {
            match step {
                PathStep::Field(field) => fields.push(field.clone()),
                PathStep::Element | PathStep::Present => {
                    return Err(SynthesisError::UnboundPath {
                        constraint,
                        place: place.to_string(),
                    })
                }
            }
        }
        Ok(CheckExpr::Var { name, fields })
    }

    fn expr(&self, id: ExprId, constraint: ConstraintId) -> Result<CheckExpr, SynthesisError> {
        Ok(match self.model.exprs.get(id) {
            ValueExpr::Int(v) => CheckExpr::Int(*v),
            ValueExpr::Bool(b) => CheckExpr::Bool(*b),
            ValueExpr::Place(place) => self.place(place, constraint)?,
            ValueExpr::Symbol(name) | ValueExpr::Implicit(name) => CheckExpr::var(name),
            ValueExpr::SelfRef => CheckExpr::var("self"),
            ValueExpr::Len(inner) => CheckExpr::len(self.expr(*inner, constraint)?),
            ValueExpr::Succ(inner) => CheckExpr::binary(
                BinOp::Add,
                self.expr(*inner, constraint)?,
                CheckExpr::Int(1),
            ),
            ValueExpr::Field(base, field) => match self.expr(*base, constraint)? {
                CheckExpr::Var { name, mut fields } => {
                    fields.push(field.clone());
                    CheckExpr::Var { name, fields }
                }
                _ => {
                    return Err(SynthesisError::ComputedField {
                        constraint,
                        field: field.clone(),
                    })
                }
            },
            ValueExpr::Unary(op, inner) => {
                CheckExpr::Unary(*op, Box::new(self.expr(*inner, constraint)?))
            }
            ValueExpr::Binary(op, lhs, rhs) => CheckExpr::binary(
                *op,
                self.expr(*lhs, constraint)?,
                self.expr(*rhs, constraint)?,
            ),
        })
    }
}

/// Whether `length` is literally `len(place)`.
fn measures(model: &ConstraintModel, length: ExprId, place: &Place) -> bool {
    match model.exprs.get(length) {
        ValueExpr::Len(inner) => matches!(model.exprs.get(*inner), ValueExpr::Place(p) if p == place),
        _ => false,
    }
}

fn is_prefix(short: &Place, long: &Place) -> bool {
    short.root == long.root
        && short.path.len() <= long.path.len()
        && long.path[..short.path.len()] == short.path[..]
}

/// Failure message for a constraint: phase, id, kind and a restatement of
/// the expression as declared.
pub fn failure_message(model: &ConstraintModel, constraint: &Constraint) -> String {
    let subject = constraint.subject();
    let declared = |fallback: Option<ExprId>| {
        constraint
            .declared
            .or(fallback)
            .map(|expr| model.render(expr))
            .unwrap_or_default()
    };
    let restatement = match &constraint.kind {
        ConstraintKind::Nonnegative => format!("{subject} must be nonnegative"),
        ConstraintKind::IndexBound { bound } => {
            format!("index must satisfy 0 ≤ {subject} < {}", declared(Some(*bound)))
        }
        ConstraintKind::LengthEquals { length } => {
            let lengths: Vec<String> = constraint
                .subjects
                .iter()
                .map(|s| format!("len({s})"))
                .collect();
            format!("{} must equal {}", lengths.join(" and "), declared(Some(*length)))
        }
        ConstraintKind::LengthAtLeast { minimum } => format!(
            "len({subject}) must be ≥ {} (declared length {})",
            model.render(*minimum),
            declared(None)
        ),
        ConstraintKind::PredicateHolds { predicate } => {
            format!("{subject} must satisfy {}", declared(Some(*predicate)))
        }
        ConstraintKind::Disjoint => format!("{subject} must be absent or present"),
    };
    format!(
        "{} violated [{} {}]: {restatement}",
        contract_kind(&constraint.scope).word(),
        constraint.id,
        constraint.kind.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::profile::{AssertionStyle, NamingStyle};
    use crate::extract::extract;
    use sigc_core::parse_signature;

    fn contracts(source: &str, profile: &EmissionProfile) -> ContractCode {
        let sig = parse_signature(source).unwrap();
        let model = extract(&sig).unwrap();
        synthesize(&sig, &model, profile).unwrap()
    }

    #[test]
    fn take_contract_renders_in_check_order() {
        let code = contracts(
            "take(n: Nat, xs: SizedSequence(T, n + m)) -> SizedSequence(T, n)",
            &EmissionProfile::default(),
        );
        insta::assert_snapshot!(code.render(), @r#"
        contract take(n, xs) -> result
          requires
            [C1] assert n >= 0 else raise ContractViolation("precondition violated [C1 Nonnegative]: n must be nonnegative")
            [C2] assert len(xs) >= n else raise ContractViolation("precondition violated [C2 LengthAtLeast]: len(xs) must be ≥ n (declared length n + m)")
          ensures
            [C3] assert len(result) == n else raise ContractViolation("postcondition violated [C3 LengthEquals]: len(result) must equal n")
        "#);
        assert_eq!(code.hooks, vec![HookPoint::Entry, HookPoint::BeforeReturn]);
    }

    #[test]
    fn index_bound_message_restates_declared_bound() {
        let code = contracts(
            "index(i: BoundedIndex(n), xs: SizedSequence(T, n)) -> T",
            &EmissionProfile::default(),
        );
        match &code.preconditions[0] {
            CheckStmt::Assert {
                condition, message, ..
            } => {
                assert_eq!(condition.render(&code.profile), "0 <= i && i < len(xs)");
                assert_eq!(
                    message,
                    "precondition violated [C1 IndexBound]: index must satisfy 0 ≤ i < n"
                );
            }
            other => panic!("expected assert, got {other:?}"),
        }
    }

    #[test]
    fn merged_length_checks_both_sides() {
        let code = contracts(
            "dot(n: Nat, xs: SizedSequence(Int, n), ys: SizedSequence(Int, n)) -> Int",
            &EmissionProfile::default(),
        );
        match &code.preconditions[1] {
            CheckStmt::Assert {
                condition, message, ..
            } => {
                assert_eq!(
                    condition.render(&code.profile),
                    "len(xs) == n && len(ys) == n"
                );
                assert!(message.ends_with("len(xs) and len(ys) must equal n"));
            }
            other => panic!("expected assert, got {other:?}"),
        }
    }

    #[test]
    fn display_matches_rendering() {
        let code = contracts(
            "g(xs: SizedSequence(Optional(Nat), n)) -> Int",
            &EmissionProfile::default(),
        );
        let displayed = format!("{code}");
        assert_eq!(displayed, code.render());
        assert!(displayed.starts_with("contract g(xs) -> result\n  requires\n"));
        assert!(displayed.contains("for "));
    }

    #[test]
    fn shared_binder_checked_against_other_sequences() {
        let code = contracts(
            "zip(xs: SizedSequence(A, n), ys: SizedSequence(B, n)) -> SizedSequence(A, n)",
            &EmissionProfile::default(),
        );
        assert_eq!(code.preconditions.len(), 1);
        match &code.preconditions[0] {
            CheckStmt::Assert {
                condition, message, ..
            } => {
                assert_eq!(condition.render(&code.profile), "len(ys) == len(xs)");
                assert!(message.ends_with("len(xs) and len(ys) must equal n"));
            }
            other => panic!("expected assert, got {other:?}"),
        }
    }

    #[test]
    fn optional_payload_checks_nest_in_present_branch() {
        let nullable = EmissionProfile {
            optional_representation: OptionalRepresentation::Nullable,
            ..EmissionProfile::default()
        };
        let code = contracts("f(x: Optional(Nat)) -> Int", &nullable);
        insta::assert_snapshot!(code.render(), @r#"
        contract f(x) -> result
          requires
            [C1] match x:
              absent =>
                pass
              present(value0) =>
                [C2] assert value0 >= 0 else raise ContractViolation("precondition violated [C2 Nonnegative]: x? must be nonnegative")
              _ => raise UnreachableCaseError("unreachable case [C1 Disjoint]: x is neither absent nor present")
        "#);

        let tagged = contracts("f(x: Optional(Nat)) -> Int", &EmissionProfile::default());
        assert!(matches!(
            &tagged.preconditions[0],
            CheckStmt::MatchOptional { fallback: None, .. }
        ));
    }

    #[test]
    fn element_constraints_loop_and_record_invariants_attach_to_construction() {
        let code = contracts(
            "record Matrix { rows: Nat, cols: Nat, data: SizedSequence(SizedSequence(Int, cols), rows) }\n\
             get(m: Matrix, r: Fin(m.rows)) -> Int",
            &EmissionProfile::default(),
        );
        let invariant = code.invariant("Matrix").unwrap();
        assert_eq!(invariant.checks.len(), 4);
        match &invariant.checks[3] {
            CheckStmt::ForEach {
                sequence,
                binder,
                body,
                ..
            } => {
                assert_eq!(sequence.render(&code.profile), "self.data");
                assert_eq!(binder, "elem0");
                match &body[0] {
                    CheckStmt::Assert { condition, .. } => assert_eq!(
                        condition.render(&code.profile),
                        "len(elem0) == self.cols"
                    ),
                    other => panic!("expected assert, got {other:?}"),
                }
            }
            other => panic!("expected loop, got {other:?}"),
        }
        assert!(code
            .hooks
            .contains(&HookPoint::Construct("Matrix".to_string())));
        assert_eq!(code.constraint_ids().len(), 9);
    }

    #[test]
    fn profile_controls_names_and_failure_idiom() {
        let profile = EmissionProfile {
            naming_style: NamingStyle::Camel,
            assertion_style: AssertionStyle::ReturnResult,
            private_prefix: "_".to_string(),
            ..EmissionProfile::default()
        };
        let code = contracts(
            "private safe_head(in_list: SizedSequence(T, S(n))) -> T",
            &profile,
        );
        assert_eq!(code.function_name, "_safeHead");
        assert_eq!(code.params[0].emitted, "inList");
        let rendered = code.render();
        assert!(rendered.contains("assert len(inList) >= 1 else return Err(ContractViolation("));
    }

    #[test]
    fn synthesis_is_byte_identical_across_runs() {
        let source = "append(xs: SizedSequence(T, n), ys: SizedSequence(T, m)) -> SizedSequence(T, n + m)";
        let a = contracts(source, &EmissionProfile::default());
        let b = contracts(source, &EmissionProfile::default());
        assert_eq!(a.render(), b.render());
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}
