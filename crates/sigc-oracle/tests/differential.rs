//! Differential runs against small shell-script executables.
//!
//! Every script reads the JSON request from stdin and pulls `n` out of it
//! with sed, so only integer-argument signatures are exercised here.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use sigc_check::{compile_one, CaseKind, CompiledSignature, EmissionProfile, TestPlanConfig};
use sigc_oracle::{record_reference_outputs, CaseOutcome, Oracle, OracleConfig, OracleError, Side};

const DOUBLE: &str = "double(n: Nat) -> Int";

const READ_N: &str = r#"#!/bin/sh
input=$(cat)
n=$(printf '%s' "$input" | sed 's/.*"n":\(-*[0-9]*\).*/\1/')
"#;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// All scripts are written once, before any test spawns a process, so no
/// script is still open for writing when another test forks.
fn scripts() -> &'static tempfile::TempDir {
    static SCRIPTS: OnceLock<tempfile::TempDir> = OnceLock::new();
    SCRIPTS.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let bodies = [
            // Refuses ill-typed inputs with the type-error code.
            ("reference", "if [ \"$n\" -lt 0 ]; then exit 3; fi\necho $((n * 2))\n"),
            (
                "generated",
                "if [ \"$n\" -lt 0 ]; then echo 'precondition violated [C1 Nonnegative]' >&2; exit 2; fi\necho $((n * 2))\n",
            ),
            ("off_by_one", "if [ \"$n\" -lt 0 ]; then exit 2; fi\necho $((n * 2 + 1))\n"),
            ("unchecked", "echo $((n * 2))\n"),
            ("crashing", "echo 'index out of range' >&2\nexit 101\n"),
            ("sleeping", "sleep 5\necho 0\n"),
            // Fails if another invocation left a file in its working directory.
            (
                "stateful",
                "if [ -e marker ]; then exit 9; fi\ntouch marker\nif [ \"$n\" -lt 0 ]; then exit 2; fi\necho $((n * 2))\n",
            ),
        ];
        for (name, body) in bodies {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("{READ_N}{body}")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    })
}

fn script(name: &str) -> PathBuf {
    scripts().path().join(name)
}

fn compiled() -> CompiledSignature {
    compile_one(
        "double",
        DOUBLE,
        &EmissionProfile::default(),
        &TestPlanConfig::default(),
    )
    .unwrap()
}

async fn outcomes(generated: &str, config: OracleConfig) -> Vec<(CaseKind, CaseOutcome)> {
    let compiled = compiled();
    let oracle = Oracle::new(script("reference"), script(generated), config).unwrap();
    let report = oracle.run(&compiled.plan, &compiled.contract).await.unwrap();
    assert_eq!(report.function, "double");
    assert_eq!(report.cases.len(), compiled.plan.cases.len());
    report
        .cases
        .into_iter()
        .map(|case| (case.kind, case.outcome))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn matching_implementations_pass_every_case() {
    let outcomes = outcomes("generated", OracleConfig::default()).await;
    assert!(outcomes
        .iter()
        .any(|(kind, _)| *kind == CaseKind::PreconditionViolation));
    for (kind, outcome) in &outcomes {
        assert_eq!(*outcome, CaseOutcome::Match, "{kind:?}");
    }
}

#[tokio::test]
async fn wrong_values_are_mismatches() {
    let outcomes = outcomes("off_by_one", OracleConfig::default()).await;
    let happy = outcomes
        .iter()
        .find(|(kind, _)| *kind == CaseKind::HappyPath)
        .map(|(_, outcome)| outcome)
        .unwrap();
    assert!(matches!(happy, CaseOutcome::ValueMismatch { expected, actual }
        if actual.as_i64() == expected.as_i64().map(|v| v + 1)));
    let rejection = outcomes
        .iter()
        .find(|(kind, _)| *kind == CaseKind::PreconditionViolation)
        .map(|(_, outcome)| outcome)
        .unwrap();
    assert_eq!(*rejection, CaseOutcome::Match);
}

#[tokio::test]
async fn missing_rejection_is_reported() {
    let outcomes = outcomes("unchecked", OracleConfig::default()).await;
    let rejection = outcomes
        .iter()
        .find(|(kind, _)| *kind == CaseKind::PreconditionViolation)
        .map(|(_, outcome)| outcome)
        .unwrap();
    assert_eq!(
        *rejection,
        CaseOutcome::NotRejected {
            side: Side::Generated
        }
    );
}

#[tokio::test]
async fn crashes_do_not_abort_the_plan() {
    let outcomes = outcomes("crashing", OracleConfig::default()).await;
    assert!(outcomes.len() > 1);
    for (_, outcome) in &outcomes {
        assert!(
            matches!(outcome, CaseOutcome::GeneratedCrashed { detail } if detail.contains("101")),
            "{outcome:?}"
        );
    }
}

#[tokio::test]
async fn slow_cases_time_out() {
    let config = OracleConfig::default().with_timeout(Duration::from_millis(300));
    let outcomes = outcomes("sleeping", config).await;
    for (_, outcome) in &outcomes {
        assert_eq!(
            *outcome,
            CaseOutcome::Timeout {
                side: Side::Generated
            }
        );
    }
}

#[tokio::test]
async fn each_invocation_gets_a_fresh_working_directory() {
    let config = OracleConfig {
        max_concurrency: 1,
        ..OracleConfig::default()
    };
    let outcomes = outcomes("stateful", config).await;
    assert!(outcomes
        .iter()
        .all(|(_, outcome)| *outcome == CaseOutcome::Match));
}

#[tokio::test]
async fn reference_outputs_are_recorded() {
    let mut plan = compiled().plan;
    let recorded = record_reference_outputs(script("reference"), &mut plan, &OracleConfig::default())
        .await
        .unwrap();
    assert!(recorded > 0);
    for case in &plan.cases {
        match case.kind {
            CaseKind::PreconditionViolation => assert!(case.reference_output.is_none()),
            CaseKind::Boundary | CaseKind::HappyPath | CaseKind::Differential => {
                assert!(case.reference_output.is_some(), "{}", case.name)
            }
            CaseKind::PropertyBased => {}
        }
    }
}

#[tokio::test]
async fn missing_executable_is_an_error() {
    let err = Oracle::new(
        script("reference"),
        scripts().path().join("does-not-exist"),
        OracleConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, OracleError::MissingExecutable { .. }));
}
