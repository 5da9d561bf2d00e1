//! Test synthesis: derive a [`TestPlan`] from the constraint model.
//!
//! Per constraint the plan holds a boundary case, a violation case (with
//! every other constraint satisfied when that is possible) and, for length
//! and arithmetic constraints, a property case. One happy-path case and one
//! differential case cover the signature as a whole. A constraint that
//! cannot get a case is listed as a [`CoverageGap`] with the reason.

pub mod property;
pub mod runner;
mod solve;
pub mod template;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sigc_core::{BinOp, ConstraintId, Signature, ValueExpr};

use crate::contracts::check::Args;
use crate::contracts::profile::to_snake;
use crate::contracts::ContractCode;
use crate::eval::error::EvalError;
use crate::fingerprint::{source_fingerprint, Fingerprint};
use crate::model::{Constraint, ConstraintKind, ConstraintModel, Scope};

use solve::{Candidate, Solver};
use template::{GenVar, Templates, ValueTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseKind {
    PreconditionViolation,
    Boundary,
    HappyPath,
    PropertyBased,
    Differential,
}

/// How a case reaches the code under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPoint {
    /// Call the function with the inputs as arguments.
    Function,
    /// Construct a value of the named record from input `self`.
    Constructor(String),
}

/// How precisely a violation case isolates its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Isolation {
    /// Every other constraint holds.
    Exact,
    /// The target cannot fail alone; it is the first reported violation.
    Dominant,
}

/// Generator description for property cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    /// Free variables with their sampling ranges.
    pub variables: Vec<GenVar>,
    /// Value shape per input.
    pub templates: IndexMap<String, ValueTemplate>,
    pub trials: u32,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TestInputs {
    Literal(Args),
    Generator(GeneratorSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpectedOutcome {
    /// The contract accepts the inputs and the listed postconditions hold
    /// on the result.
    Accept { postconditions: Vec<ConstraintId> },
    /// The contract rejects the inputs, reporting `constraint` first.
    Reject {
        constraint: ConstraintId,
        message: String,
    },
    /// For every accepted generated input the listed constraints hold.
    Holds { constraints: Vec<ConstraintId> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// `T1`, `T2`, ... in plan order.
    pub id: String,
    pub name: String,
    pub kind: CaseKind,
    pub target: Option<ConstraintId>,
    pub entry: EntryPoint,
    pub inputs: TestInputs,
    pub expected: ExpectedOutcome,
    pub isolation: Isolation,
    /// JSON output of the reference executable, when one was run.
    pub reference_output: Option<serde_json::Value>,
}

/// A case the plan could not provide, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub constraint: Option<ConstraintId>,
    pub kind: CaseKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    pub function: String,
    pub cases: Vec<TestCase>,
    pub gaps: Vec<CoverageGap>,
    /// Fingerprint of the signature text the plan was derived from.
    pub source_fingerprint: Fingerprint,
}

impl TestPlan {
    pub fn case(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Cases of one kind targeting one constraint.
    pub fn cases_for(&self, constraint: ConstraintId, kind: CaseKind) -> Vec<&TestCase> {
        self.cases
            .iter()
            .filter(|c| c.target == Some(constraint) && c.kind == kind)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPlanConfig {
    /// Trials per property case.
    pub property_trials: u32,
    pub random_seed: u64,
    /// Candidates examined per search before giving up.
    pub max_search_candidates: usize,
}

impl Default for TestPlanConfig {
    fn default() -> Self {
        TestPlanConfig {
            property_trials: 100,
            random_seed: 0,
            max_search_candidates: 20_000,
        }
    }
}

/// Derives the test plan of a signature.
///
/// Candidate inputs are validated by `code`, so `code` must be the contract
/// synthesized from `model`.
pub fn synthesize_tests(
    sig: &Signature,
    model: &ConstraintModel,
    code: &ContractCode,
    config: &TestPlanConfig,
) -> Result<TestPlan, EvalError> {
    let mut builder = PlanBuilder {
        sig,
        config,
        postconditions: model.postconditions().iter().map(|c| c.id).collect(),
        cases: Vec::new(),
        gaps: Vec::new(),
    };

    let function = EntryPoint::Function;
    let params = Templates::for_params(sig, model);
    let mut records: IndexMap<String, (EntryPoint, Templates)> = IndexMap::new();

    for id in &model.order {
        let Some(constraint) = model.get(*id) else {
            continue;
        };
        let (entry, templates) = match &constraint.scope {
            Scope::Record(record) => {
                let (entry, templates) = records.entry(record.clone()).or_insert_with(|| {
                    (
                        EntryPoint::Constructor(record.clone()),
                        Templates::for_record(sig, model, record),
                    )
                });
                (&*entry, &*templates)
            }
            _ => (&function, &params),
        };
        let solver = Solver {
            code,
            entry,
            templates,
            max_candidates: config.max_search_candidates,
        };
        builder.constraint_cases(&solver, model, constraint)?;
    }

    let solver = Solver {
        code,
        entry: &function,
        templates: &params,
        max_candidates: config.max_search_candidates,
    };
    match solver.happy_path()? {
        Some(candidate) => {
            builder.accept_case(CaseKind::HappyPath, None, &function, &candidate, "happy_path");
            builder.accept_case(
                CaseKind::Differential,
                None,
                &function,
                &candidate,
                "differential",
            );
        }
        None => {
            for kind in [CaseKind::HappyPath, CaseKind::Differential] {
                builder.gap(None, kind, "no input within the search budget satisfies every precondition");
            }
        }
    }

    let mut cases = builder.cases;
    for (i, case) in cases.iter_mut().enumerate() {
        case.id = format!("T{}", i + 1);
    }
    debug!(
        function = %sig.name,
        cases = cases.len(),
        gaps = builder.gaps.len(),
        "test plan synthesized"
    );

    Ok(TestPlan {
        function: sig.name.clone(),
        cases,
        gaps: builder.gaps,
        source_fingerprint: source_fingerprint(&sig.source),
    })
}

struct PlanBuilder<'a> {
    sig: &'a Signature,
    config: &'a TestPlanConfig,
    postconditions: Vec<ConstraintId>,
    cases: Vec<TestCase>,
    gaps: Vec<CoverageGap>,
}

impl PlanBuilder<'_> {
    fn name(&self, constraint: Option<&Constraint>, suffix: &str) -> String {
        match constraint {
            Some(c) => format!(
                "{}_{}_{}_{suffix}",
                self.sig.name,
                c.id.to_string().to_lowercase(),
                to_snake(c.kind.label())
            ),
            None => format!("{}_{suffix}", self.sig.name),
        }
    }

    fn gap(&mut self, constraint: Option<ConstraintId>, kind: CaseKind, reason: &str) {
        debug!(?constraint, ?kind, reason, "coverage gap");
        self.gaps.push(CoverageGap {
            constraint,
            kind,
            reason: reason.to_string(),
        });
    }

    fn accept_case(
        &mut self,
        kind: CaseKind,
        constraint: Option<&Constraint>,
        entry: &EntryPoint,
        candidate: &Candidate,
        suffix: &str,
    ) {
        let postconditions = match entry {
            EntryPoint::Function => self.postconditions.clone(),
            EntryPoint::Constructor(_) => Vec::new(),
        };
        self.cases.push(TestCase {
            id: String::new(),
            name: self.name(constraint, suffix),
            kind,
            target: constraint.map(|c| c.id),
            entry: entry.clone(),
            inputs: TestInputs::Literal(candidate.inputs.clone()),
            expected: ExpectedOutcome::Accept { postconditions },
            isolation: Isolation::Exact,
            reference_output: None,
        });
    }

    fn reject_case(
        &mut self,
        constraint: &Constraint,
        entry: &EntryPoint,
        candidate: &Candidate,
        isolation: Isolation,
        suffix: &str,
    ) {
        let message = candidate
            .failures
            .first()
            .map(|f| f.message.clone())
            .unwrap_or_default();
        self.cases.push(TestCase {
            id: String::new(),
            name: self.name(Some(constraint), suffix),
            kind: CaseKind::PreconditionViolation,
            target: Some(constraint.id),
            entry: entry.clone(),
            inputs: TestInputs::Literal(candidate.inputs.clone()),
            expected: ExpectedOutcome::Reject {
                constraint: constraint.id,
                message,
            },
            isolation,
            reference_output: None,
        });
    }

    fn constraint_cases(
        &mut self,
        solver: &Solver<'_>,
        model: &ConstraintModel,
        constraint: &Constraint,
    ) -> Result<(), EvalError> {
        let id = constraint.id;

        let boundary = solver.boundary(constraint)?;
        match &boundary {
            Some(candidate) => {
                self.accept_case(CaseKind::Boundary, Some(constraint), solver.entry, candidate, "boundary")
            }
            None => self.gap(
                Some(id),
                CaseKind::Boundary,
                "no satisfying input within the search budget",
            ),
        }

        if constraint.scope == Scope::Return {
            self.gap(
                Some(id),
                CaseKind::PreconditionViolation,
                "postconditions constrain the result; only a faulty implementation violates them",
            );
        } else if constraint.kind == ConstraintKind::Disjoint {
            self.gap(
                Some(id),
                CaseKind::PreconditionViolation,
                "every optional value is absent or present; no input violates it",
            );
        } else {
            match solver.violation(constraint, boundary.as_ref())? {
                Some((candidate, isolation)) => {
                    self.reject_case(constraint, solver.entry, &candidate, isolation, "violation")
                }
                None => self.gap(
                    Some(id),
                    CaseKind::PreconditionViolation,
                    "no input within the search budget is rejected by this constraint first",
                ),
            }
            if let (ConstraintKind::IndexBound { .. }, Some(boundary)) = (&constraint.kind, &boundary)
            {
                if let Some((candidate, isolation)) = solver.below_zero(constraint, boundary)? {
                    self.reject_case(constraint, solver.entry, &candidate, isolation, "below_zero");
                }
            }
        }

        if is_property_target(model, constraint) {
            let mut holds = vec![id];
            if *solver.entry == EntryPoint::Function {
                for post in &self.postconditions {
                    if !holds.contains(post) {
                        holds.push(*post);
                    }
                }
            }
            self.cases.push(TestCase {
                id: String::new(),
                name: self.name(Some(constraint), "property"),
                kind: CaseKind::PropertyBased,
                target: Some(id),
                entry: solver.entry.clone(),
                inputs: TestInputs::Generator(GeneratorSpec {
                    variables: solver.templates.vars.clone(),
                    templates: solver.templates.roots.clone(),
                    trials: self.config.property_trials,
                    seed: self.config.random_seed.wrapping_add(u64::from(id.0)),
                }),
                expected: ExpectedOutcome::Holds { constraints: holds },
                isolation: Isolation::Exact,
                reference_output: None,
            });
        }
        Ok(())
    }
}

/// Length constraints and constraints over arithmetic expressions get a
/// property case.
fn is_property_target(model: &ConstraintModel, constraint: &Constraint) -> bool {
    match &constraint.kind {
        ConstraintKind::LengthEquals { .. } | ConstraintKind::LengthAtLeast { .. } => true,
        ConstraintKind::IndexBound { bound: expr } | ConstraintKind::PredicateHolds { predicate: expr } => {
            let mut arithmetic = false;
            model.exprs.walk(*expr, &mut |node| {
                if let ValueExpr::Binary(BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem, ..)
                | ValueExpr::Succ(_) = node
                {
                    arithmetic = true;
                }
            });
            arithmetic
        }
        ConstraintKind::Nonnegative | ConstraintKind::Disjoint => false,
    }
}
