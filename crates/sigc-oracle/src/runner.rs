//! Differential runs of a [`TestPlan`] against a reference executable and a
//! generated one.
//!
//! Cases run concurrently, bounded by `max_concurrency`. Each case owns its
//! invocations; a crash, timeout or mismatch is recorded as that case's
//! outcome and the remaining cases still run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use sigc_check::testgen::property::accepted_samples;
use sigc_check::{Args, CaseKind, ContractCode, EntryPoint, ExpectedOutcome, TestInputs, TestPlan};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::exec::{invoke, ExecOutcome, Request, Side};

/// Result of one differential case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaseOutcome {
    Match,
    ValueMismatch {
        expected: serde_json::Value,
        actual: serde_json::Value,
    },
    ReferenceCrashed {
        detail: String,
    },
    GeneratedCrashed {
        detail: String,
    },
    Timeout {
        side: Side,
    },
    /// A rejection case ran to completion on one side.
    NotRejected {
        side: Side,
    },
    /// A valid input was refused by one side.
    UnexpectedRejection {
        side: Side,
    },
    /// The case has no executable form, e.g. a record constructor.
    Skipped {
        reason: String,
    },
}

impl CaseOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, CaseOutcome::Match | CaseOutcome::Skipped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: String,
    pub name: String,
    pub kind: CaseKind,
    /// For property cases, the sample the outcome belongs to.
    pub trial: Option<usize>,
    pub outcome: CaseOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleReport {
    pub function: String,
    pub cases: Vec<CaseReport>,
}

impl OracleReport {
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| c.outcome.is_failure())
    }

    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// A reference and a generated executable to compare.
#[derive(Debug, Clone)]
pub struct Oracle {
    reference: PathBuf,
    generated: PathBuf,
    config: OracleConfig,
}

fn resolve(path: &Path) -> Result<PathBuf, OracleError> {
    std::fs::canonicalize(path).map_err(|source| OracleError::MissingExecutable {
        path: path.to_path_buf(),
        source,
    })
}

impl Oracle {
    pub fn new(
        reference: impl AsRef<Path>,
        generated: impl AsRef<Path>,
        config: OracleConfig,
    ) -> Result<Self, OracleError> {
        Ok(Oracle {
            reference: resolve(reference.as_ref())?,
            generated: resolve(generated.as_ref())?,
            config,
        })
    }

    /// Runs every function-level case of `plan`.
    ///
    /// Property cases are expanded into the samples `code` accepts; the
    /// first failing sample is reported.
    pub async fn run(&self, plan: &TestPlan, code: &ContractCode) -> Result<OracleReport, OracleError> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(plan.cases.len());

        for case in &plan.cases {
            let base = CaseReport {
                case: case.id.clone(),
                name: case.name.clone(),
                kind: case.kind,
                trial: None,
                outcome: CaseOutcome::Match,
            };
            if let EntryPoint::Constructor(record) = &case.entry {
                handles.push(Pending::Ready(CaseReport {
                    outcome: CaseOutcome::Skipped {
                        reason: format!("constructs record {record}; no function to call"),
                    },
                    ..base
                }));
                continue;
            }
            let samples = match &case.inputs {
                TestInputs::Literal(args) => vec![args.clone()],
                TestInputs::Generator(spec) => accepted_samples(spec, code, &case.entry)?,
            };
            if samples.is_empty() {
                handles.push(Pending::Ready(CaseReport {
                    outcome: CaseOutcome::Skipped {
                        reason: "no accepted sample".to_string(),
                    },
                    ..base
                }));
                continue;
            }

            let job = CaseJob {
                function: plan.function.clone(),
                expect_rejection: matches!(case.expected, ExpectedOutcome::Reject { .. }),
                samples,
                reference: self.reference.clone(),
                generated: self.generated.clone(),
                config: self.config.clone(),
            };
            let permits = Arc::clone(&permits);
            handles.push(Pending::Running(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let (trial, outcome) = job.run().await;
                CaseReport {
                    trial: (job.samples.len() > 1).then_some(trial),
                    outcome,
                    ..base
                }
            })));
        }

        let mut cases = Vec::with_capacity(handles.len());
        for handle in handles {
            let report = match handle {
                Pending::Ready(report) => report,
                Pending::Running(task) => task.await?,
            };
            if report.outcome.is_failure() {
                warn!(case = %report.case, name = %report.name, outcome = ?report.outcome, "differential case failed");
            }
            cases.push(report);
        }

        let report = OracleReport {
            function: plan.function.clone(),
            cases,
        };
        info!(
            "Oracle: {} cases, {} failed",
            report.cases.len(),
            report.failures().count()
        );
        Ok(report)
    }
}

enum Pending {
    Ready(CaseReport),
    Running(tokio::task::JoinHandle<CaseReport>),
}

struct CaseJob {
    function: String,
    expect_rejection: bool,
    samples: Vec<Args>,
    reference: PathBuf,
    generated: PathBuf,
    config: OracleConfig,
}

impl CaseJob {
    /// Runs samples in order until one fails. Returns the index of the
    /// reported sample and its outcome.
    async fn run(&self) -> (usize, CaseOutcome) {
        let mut last = 0;
        for (trial, args) in self.samples.iter().enumerate() {
            let request = Request::new(&self.function, args);
            let (reference, generated) = tokio::join!(
                invoke(&self.reference, &request, Side::Reference, &self.config),
                invoke(&self.generated, &request, Side::Generated, &self.config),
            );
            let outcome = if self.expect_rejection {
                compare_rejection(reference, generated)
            } else {
                compare_values(reference, generated)
            };
            if outcome.is_failure() {
                return (trial, outcome);
            }
            last = trial;
        }
        (last, CaseOutcome::Match)
    }
}

fn compare_failures(reference: &ExecOutcome, generated: &ExecOutcome) -> Option<CaseOutcome> {
    Some(match (reference, generated) {
        (ExecOutcome::TimedOut, _) => CaseOutcome::Timeout {
            side: Side::Reference,
        },
        (_, ExecOutcome::TimedOut) => CaseOutcome::Timeout {
            side: Side::Generated,
        },
        (ExecOutcome::Crashed { detail }, _) => CaseOutcome::ReferenceCrashed {
            detail: detail.clone(),
        },
        (_, ExecOutcome::Crashed { detail }) => CaseOutcome::GeneratedCrashed {
            detail: detail.clone(),
        },
        _ => return None,
    })
}

/// Valid inputs: both sides must return the same value.
fn compare_values(reference: ExecOutcome, generated: ExecOutcome) -> CaseOutcome {
    if let Some(failure) = compare_failures(&reference, &generated) {
        return failure;
    }
    match (reference, generated) {
        (ExecOutcome::Returned(expected), ExecOutcome::Returned(actual)) => {
            if expected == actual {
                CaseOutcome::Match
            } else {
                CaseOutcome::ValueMismatch { expected, actual }
            }
        }
        (ExecOutcome::Returned(_), _) => CaseOutcome::UnexpectedRejection {
            side: Side::Generated,
        },
        _ => CaseOutcome::UnexpectedRejection {
            side: Side::Reference,
        },
    }
}

/// Invalid inputs: the reference must reject or fail to type-check, the
/// generated code must reject. Values are not compared.
fn compare_rejection(reference: ExecOutcome, generated: ExecOutcome) -> CaseOutcome {
    if let Some(failure) = compare_failures(&reference, &generated) {
        return failure;
    }
    match (reference, generated) {
        (ExecOutcome::Returned(_), _) => CaseOutcome::NotRejected {
            side: Side::Reference,
        },
        (_, ExecOutcome::Rejected { .. }) => CaseOutcome::Match,
        _ => CaseOutcome::NotRejected {
            side: Side::Generated,
        },
    }
}

/// Fills `reference_output` on every literal, accepting, function-level
/// case from the reference executable. Returns how many were recorded.
pub async fn record_reference_outputs(
    reference: impl AsRef<Path>,
    plan: &mut TestPlan,
    config: &OracleConfig,
) -> Result<usize, OracleError> {
    let reference = resolve(reference.as_ref())?;
    let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut handles = Vec::new();

    for (index, case) in plan.cases.iter().enumerate() {
        let TestInputs::Literal(args) = &case.inputs else {
            continue;
        };
        if case.entry != EntryPoint::Function
            || matches!(case.expected, ExpectedOutcome::Reject { .. })
        {
            continue;
        }
        let request = Request::new(&plan.function, args);
        let reference = reference.clone();
        let config = config.clone();
        let permits = Arc::clone(&permits);
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let outcome = invoke(&reference, &request, Side::Reference, &config).await;
            (index, outcome)
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        let (index, outcome) = handle.await?;
        let case = &mut plan.cases[index];
        match outcome {
            ExecOutcome::Returned(value) => {
                case.reference_output = Some(value);
                recorded += 1;
            }
            other => {
                debug!(case = %case.id, outcome = ?other, "no reference output recorded")
            }
        }
    }
    Ok(recorded)
}
