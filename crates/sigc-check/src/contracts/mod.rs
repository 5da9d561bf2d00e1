//! Synthesized runtime contracts.
//!
//! [`ContractCode`] is a structured tree, not target source text: ordered
//! checks for function entry, checks before return, and invariants per
//! record, each traceable to the constraint it enforces. A separate
//! emission stage turns it into source; [`ContractCode::render`] gives a
//! language-neutral rendering for review and snapshots.

pub mod check;
pub mod profile;
pub mod synth;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use sigc_core::{BinOp, ConstraintId, UnOp};

use crate::eval::value::Value;
use crate::fingerprint::Fingerprint;

use profile::{AssertionStyle, EmissionProfile};

/// The kind of contract that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractKind {
    /// A precondition checked at function entry.
    Precondition,
    /// A postcondition checked before return.
    Postcondition,
    /// A record invariant checked on construction.
    Invariant,
}

impl ContractKind {
    pub fn word(self) -> &'static str {
        match self {
            ContractKind::Precondition => "precondition",
            ContractKind::Postcondition => "postcondition",
            ContractKind::Invariant => "invariant",
        }
    }
}

/// A structured contract violation.
///
/// The expected, user-facing outcome when a synthesized check rejects a
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractViolation {
    pub kind: ContractKind,
    /// The constraint whose check failed.
    pub constraint: ConstraintId,
    /// Failure message, embedding the constraint id and a restatement of
    /// the declared expression.
    pub message: String,
    /// Values the check was evaluated against, by source name.
    pub inputs: IndexMap<String, Value>,
    /// For postconditions, the value returned.
    pub actual_return: Option<Value>,
}

/// A check-level expression over parameters, the result and loop binders.
///
/// Names are source names; the emission profile's naming style is applied
/// when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckExpr {
    Int(i64),
    Bool(bool),
    /// A variable followed by zero or more field accesses.
    Var { name: String, fields: Vec<String> },
    Len(Box<CheckExpr>),
    Unary(UnOp, Box<CheckExpr>),
    Binary(BinOp, Box<CheckExpr>, Box<CheckExpr>),
}

impl CheckExpr {
    pub fn var(name: &str) -> Self {
        CheckExpr::Var {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn len(inner: CheckExpr) -> Self {
        CheckExpr::Len(Box::new(inner))
    }

    pub fn binary(op: BinOp, lhs: CheckExpr, rhs: CheckExpr) -> Self {
        CheckExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn render(&self, profile: &EmissionProfile) -> String {
        let mut out = String::new();
        self.render_into(profile, 0, &mut out);
        out
    }

    fn render_into(&self, profile: &EmissionProfile, min_prec: u8, out: &mut String) {
        match self {
            CheckExpr::Int(v) => out.push_str(&v.to_string()),
            CheckExpr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            CheckExpr::Var { name, fields } => {
                out.push_str(&profile.style(name));
                for field in fields {
                    out.push('.');
                    out.push_str(&profile.style(field));
                }
            }
            CheckExpr::Len(inner) => {
                out.push_str("len(");
                inner.render_into(profile, 0, out);
                out.push(')');
            }
            CheckExpr::Unary(op, inner) => {
                out.push(match op {
                    UnOp::Neg => '-',
                    UnOp::Not => '!',
                });
                inner.render_into(profile, 6, out);
            }
            CheckExpr::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                let wrap = prec < min_prec;
                if wrap {
                    out.push('(');
                }
                let lhs_prec = if op.is_comparison() { prec + 1 } else { prec };
                lhs.render_into(profile, lhs_prec, out);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                rhs.render_into(profile, prec + 1, out);
                if wrap {
                    out.push(')');
                }
            }
        }
    }
}

/// Generated fallback arm for targets without exhaustiveness checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreachableFallback {
    pub message: String,
}

/// One synthesized check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStmt {
    /// Fail with `message` unless `condition` holds.
    Assert {
        constraint: ConstraintId,
        condition: CheckExpr,
        message: String,
    },
    /// Run `body` with `binder` bound to each element of `sequence`.
    ForEach {
        constraint: ConstraintId,
        sequence: CheckExpr,
        binder: String,
        body: Vec<CheckStmt>,
    },
    /// Exhaustive branch over an optional value.
    MatchOptional {
        constraint: ConstraintId,
        subject: CheckExpr,
        /// Bound to the payload in the present branch.
        binder: String,
        on_absent: Vec<CheckStmt>,
        on_present: Vec<CheckStmt>,
        /// Present only for nullable targets.
        fallback: Option<UnreachableFallback>,
    },
}

impl CheckStmt {
    pub fn constraint(&self) -> ConstraintId {
        match self {
            CheckStmt::Assert { constraint, .. }
            | CheckStmt::ForEach { constraint, .. }
            | CheckStmt::MatchOptional { constraint, .. } => *constraint,
        }
    }
}

/// Invariant checks for one named record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvariant {
    pub record: String,
    pub checks: Vec<CheckStmt>,
}

/// Where an emission stage inserts checks into the implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookPoint {
    /// Function entry, before the body: preconditions.
    Entry,
    /// After the body computes its result, before it is returned.
    BeforeReturn,
    /// Wherever a value of the named record is constructed.
    Construct(String),
}

/// A parameter's source name and its name in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamName {
    pub source: String,
    pub emitted: String,
}

/// Runtime contracts for one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCode {
    /// Function name in the target, with naming style and private prefix.
    pub function_name: String,
    pub source_name: String,
    pub params: Vec<ParamName>,
    pub result_name: String,
    /// Checks at entry, most primitive first.
    pub preconditions: Vec<CheckStmt>,
    /// Checks before return. All of them always run.
    pub postconditions: Vec<CheckStmt>,
    pub invariants: Vec<RecordInvariant>,
    pub hooks: Vec<HookPoint>,
    pub profile: EmissionProfile,
    /// Fingerprint of the signature text this was synthesized from.
    pub source_fingerprint: Fingerprint,
}

impl ContractCode {
    /// Every constraint id with a synthesized check, in order of appearance.
    pub fn constraint_ids(&self) -> Vec<ConstraintId> {
        fn visit(stmts: &[CheckStmt], out: &mut Vec<ConstraintId>) {
            for stmt in stmts {
                if !out.contains(&stmt.constraint()) {
                    out.push(stmt.constraint());
                }
                match stmt {
                    CheckStmt::ForEach { body, .. } => visit(body, out),
                    CheckStmt::MatchOptional {
                        on_absent,
                        on_present,
                        ..
                    } => {
                        visit(on_absent, out);
                        visit(on_present, out);
                    }
                    CheckStmt::Assert { .. } => {}
                }
            }
        }
        let mut out = Vec::new();
        visit(&self.preconditions, &mut out);
        visit(&self.postconditions, &mut out);
        for invariant in &self.invariants {
            visit(&invariant.checks, &mut out);
        }
        out
    }

    pub fn invariant(&self, record: &str) -> Option<&RecordInvariant> {
        self.invariants.iter().find(|i| i.record == record)
    }

    /// Language-neutral rendering of the contract.
    pub fn render(&self) -> String {
        self.to_string()
    }

    fn fail(&self, message: &str) -> String {
        match self.profile.assertion_style {
            AssertionStyle::Exception => {
                format!("raise {}({message:?})", self.profile.error_type)
            }
            AssertionStyle::ReturnResult => {
                format!("return Err({}({message:?}))", self.profile.error_type)
            }
        }
    }

    fn render_block(
        &self,
        stmts: &[CheckStmt],
        depth: usize,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let indent = "  ".repeat(depth);
        if stmts.is_empty() {
            return writeln!(f, "{indent}pass");
        }
        for stmt in stmts {
            match stmt {
                CheckStmt::Assert {
                    constraint,
                    condition,
                    message,
                } => writeln!(
                    f,
                    "{indent}[{constraint}] assert {} else {}",
                    condition.render(&self.profile),
                    self.fail(message)
                )?,
                CheckStmt::ForEach {
                    constraint,
                    sequence,
                    binder,
                    body,
                } => {
                    writeln!(
                        f,
                        "{indent}[{constraint}] for {} in {}:",
                        self.profile.style(binder),
                        sequence.render(&self.profile)
                    )?;
                    self.render_block(body, depth + 1, f)?;
                }
                CheckStmt::MatchOptional {
                    constraint,
                    subject,
                    binder,
                    on_absent,
                    on_present,
                    fallback,
                } => {
                    writeln!(
                        f,
                        "{indent}[{constraint}] match {}:",
                        subject.render(&self.profile)
                    )?;
                    writeln!(f, "{indent}  absent =>")?;
                    self.render_block(on_absent, depth + 2, f)?;
                    writeln!(f, "{indent}  present({}) =>", self.profile.style(binder))?;
                    self.render_block(on_present, depth + 2, f)?;
                    if let Some(fallback) = fallback {
                        writeln!(
                            f,
                            "{indent}  _ => raise UnreachableCaseError({:?})",
                            fallback.message
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ContractCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params.iter().map(|p| p.emitted.as_str()).collect();
        writeln!(
            f,
            "contract {}({}) -> {}",
            self.function_name,
            params.join(", "),
            self.profile.style(&self.result_name)
        )?;
        if !self.preconditions.is_empty() {
            writeln!(f, "  requires")?;
            self.render_block(&self.preconditions, 2, f)?;
        }
        if !self.postconditions.is_empty() {
            writeln!(f, "  ensures")?;
            self.render_block(&self.postconditions, 2, f)?;
        }
        for invariant in &self.invariants {
            writeln!(f, "  invariant {}", invariant.record)?;
            self.render_block(&invariant.checks, 2, f)?;
        }
        Ok(())
    }
}
