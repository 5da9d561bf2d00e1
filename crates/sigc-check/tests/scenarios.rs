//! End-to-end scenarios: signature text through extraction, contract
//! synthesis and test synthesis, with in-process implementations standing
//! in for generated code.

use sigc_check::testgen::property::run_property;
use sigc_check::testgen::runner::run_plan;
use sigc_check::{
    compile_one, content_fingerprint, extract, is_stale, synthesize, Args, CaseKind,
    CompiledSignature, ConstraintKind, ContractKind, ContractedFn, EmissionProfile, Invocation,
    TestInputs, TestPlanConfig, Value,
};
use sigc_core::{parse_signature, ConstraintId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn compile(source: &str) -> CompiledSignature {
    compile_one(
        "test",
        source,
        &EmissionProfile::default(),
        &TestPlanConfig::default(),
    )
    .unwrap()
}

fn args(pairs: &[(&str, Value)]) -> Args {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn seq_len(value: &Value) -> usize {
    match value {
        Value::Seq(items) => items.len(),
        other => panic!("expected a sequence, got {other:?}"),
    }
}

fn take(args: &Args) -> Value {
    match (&args["n"], &args["xs"]) {
        (Value::Int(n), Value::Seq(xs)) => Value::Seq(xs[..*n as usize].to_vec()),
        _ => Value::Absent,
    }
}

fn index(args: &Args) -> Value {
    match (&args["i"], &args["xs"]) {
        (Value::Int(i), Value::Seq(xs)) => xs[*i as usize].clone(),
        _ => Value::Absent,
    }
}

const TAKE: &str = "take(n: NonNegativeInt, xs: SizedSequence(T, n+m)) -> SizedSequence(T, n)";
const INDEX: &str = "index(i: BoundedIndex(n), xs: SizedSequence(T, n)) -> T";

// ---------------------------------------------------------------------------
// take
// ---------------------------------------------------------------------------

#[test]
fn take_model_has_nonnegative_and_length_at_least() {
    let compiled = compile(TAKE);
    let preconditions: Vec<&ConstraintKind> = compiled
        .model
        .preconditions()
        .into_iter()
        .map(|c| &c.kind)
        .collect();
    assert_eq!(preconditions.len(), 2);
    assert_eq!(*preconditions[0], ConstraintKind::Nonnegative);
    assert!(matches!(preconditions[1], ConstraintKind::LengthAtLeast { .. }));
    assert_eq!(compiled.model.preconditions()[0].subject().to_string(), "n");
    assert_eq!(compiled.model.preconditions()[1].subject().to_string(), "xs");
}

#[test]
fn take_scenario_outcomes() {
    let compiled = compile(TAKE);
    let f = ContractedFn::new(compiled.contract, take);

    match f
        .call(&args(&[("n", Value::Int(0)), ("xs", Value::Seq(vec![]))]))
        .unwrap()
    {
        Invocation::Returned { value, violations } => {
            assert_eq!(seq_len(&value), 0);
            assert!(violations.is_empty());
        }
        other => panic!("n=0 should be accepted, got {other:?}"),
    }

    match f
        .call(&args(&[
            ("n", Value::Int(3)),
            ("xs", Value::seq_of_ints([1, 2, 3, 4, 5])),
        ]))
        .unwrap()
    {
        Invocation::Returned { value, violations } => {
            assert_eq!(value, Value::seq_of_ints([1, 2, 3]));
            assert!(violations.is_empty());
        }
        other => panic!("n=3 should be accepted, got {other:?}"),
    }

    let rejected = f
        .call(&args(&[
            ("n", Value::Int(6)),
            ("xs", Value::seq_of_ints([1, 2, 3, 4, 5])),
        ]))
        .unwrap();
    assert!(rejected.is_rejected());
    let violation = rejected.first_violation().unwrap();
    assert_eq!(violation.kind, ContractKind::Precondition);
    assert!(violation.message.contains("LengthAtLeast"), "{}", violation.message);
}

#[test]
fn take_nonnegative_fires_before_length() {
    let compiled = compile(TAKE);
    let f = ContractedFn::new(compiled.contract, take);
    let rejected = f
        .call(&args(&[("n", Value::Int(-2)), ("xs", Value::Seq(vec![]))]))
        .unwrap();
    let violation = rejected.first_violation().unwrap();
    assert_eq!(violation.constraint, ConstraintId(1));
    assert!(violation.message.contains("n must be nonnegative"));
}

#[test]
fn take_plan_passes_against_correct_implementation() {
    let compiled = compile(TAKE);
    let results = run_plan(&compiled.plan, &compiled.contract, take).unwrap();
    assert!(results.iter().all(|r| r.passed()), "{results:?}");
}

// ---------------------------------------------------------------------------
// index
// ---------------------------------------------------------------------------

#[test]
fn index_scenario_with_five_elements() {
    let compiled = compile(INDEX);
    let f = ContractedFn::new(compiled.contract, index);
    let xs = Value::seq_of_ints([10, 20, 30, 40, 50]);
    let call = |i: i64| {
        f.call(&args(&[("i", Value::Int(i)), ("xs", xs.clone())]))
            .unwrap()
    };

    match call(4) {
        Invocation::Returned { value, violations } => {
            assert_eq!(value, Value::Int(50));
            assert!(violations.is_empty());
        }
        other => panic!("i=4 should be accepted, got {other:?}"),
    }
    assert!(call(5).is_rejected());
    let below = call(-1);
    assert!(below.is_rejected());
    assert!(below
        .first_violation()
        .unwrap()
        .message
        .contains("0 ≤ i < n"));
}

#[test]
fn index_bound_cases_are_off_by_one_exact() {
    let compiled = compile(INDEX);
    let bound = compiled
        .model
        .constraints
        .iter()
        .find(|c| matches!(c.kind, ConstraintKind::IndexBound { .. }))
        .unwrap();

    let boundary = compiled.plan.cases_for(bound.id, CaseKind::Boundary)[0];
    let TestInputs::Literal(inputs) = &boundary.inputs else {
        panic!("boundary inputs should be literal");
    };
    let n = seq_len(&inputs["xs"]) as i64;
    assert_eq!(inputs["i"], Value::Int(n - 1));

    let f = ContractedFn::new(compiled.contract.clone(), index);
    assert!(!f.call(inputs).unwrap().is_rejected());
    let mut at_bound = inputs.clone();
    at_bound.insert("i".into(), Value::Int(n));
    assert!(f.call(&at_bound).unwrap().is_rejected());
}

// ---------------------------------------------------------------------------
// Nonnegative across signatures
// ---------------------------------------------------------------------------

#[test]
fn negative_literal_is_rejected_wherever_nonnegative_appears() {
    for source in [
        TAKE,
        "repeat(x: Int, k: Nat) -> SizedSequence(Int, k)",
        "private pad(width: Nat, fill: Text) -> Text",
        "record Range { lo: Nat, hi: Refinement(Int, self >= lo) }\nwiden(r: Range, by: Nat) -> Range",
    ] {
        let compiled = compile(source);
        let nonnegative: Vec<_> = compiled
            .model
            .preconditions()
            .into_iter()
            .filter(|c| c.kind == ConstraintKind::Nonnegative && c.subject().path.is_empty())
            .collect();
        assert!(!nonnegative.is_empty(), "{source}");
        for constraint in nonnegative {
            let case = compiled
                .plan
                .cases_for(constraint.id, CaseKind::PreconditionViolation)[0];
            let TestInputs::Literal(inputs) = &case.inputs else {
                panic!("violation inputs should be literal");
            };
            let name = constraint.subject().to_string();
            assert!(matches!(inputs[&name], Value::Int(v) if v < 0), "{source}: {name}");
            let rejected = sigc_check::check_preconditions(&compiled.contract, inputs).unwrap();
            assert_eq!(rejected[0].constraint, constraint.id, "{source}");
        }
    }
}

// ---------------------------------------------------------------------------
// Determinism, idempotence and staleness
// ---------------------------------------------------------------------------

#[test]
fn extraction_round_trip_is_structurally_identical() {
    let sig = parse_signature(INDEX).unwrap();
    let first = extract(&sig).unwrap();
    let second = extract(&sig).unwrap();
    assert_eq!(first.constraints, second.constraints);
    assert_eq!(first.order, second.order);
    assert_eq!(
        content_fingerprint(&first).unwrap(),
        content_fingerprint(&second).unwrap()
    );
}

#[test]
fn contract_synthesis_is_idempotent() {
    let sig = parse_signature(TAKE).unwrap();
    let model = extract(&sig).unwrap();
    for profile in [
        EmissionProfile::default(),
        serde_json::from_str::<EmissionProfile>(
            r#"{"naming_style": "camel", "assertion_style": "return-result", "optional_representation": "nullable"}"#,
        )
        .unwrap(),
    ] {
        let a = synthesize(&sig, &model, &profile).unwrap();
        let b = synthesize(&sig, &model, &profile).unwrap();
        assert_eq!(a.render(), b.render());
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }
}

#[test]
fn edited_signature_makes_artifacts_stale() {
    let compiled = compile(TAKE);
    assert!(!is_stale(&compiled.contract.source_fingerprint, TAKE));
    assert!(is_stale(
        &compiled.plan.source_fingerprint,
        "take(n: NonNegativeInt, xs: SizedSequence(T, n)) -> SizedSequence(T, n)"
    ));
}

#[test]
fn property_cases_hold_for_correct_take() {
    let compiled = compile(TAKE);
    for case in compiled
        .plan
        .cases
        .iter()
        .filter(|c| c.kind == CaseKind::PropertyBased)
    {
        let TestInputs::Generator(spec) = &case.inputs else {
            panic!("property inputs should be a generator");
        };
        let report = run_property(spec, &case.entry, &compiled.contract, take).unwrap();
        assert!(report.accepted > 0, "{}", case.name);
        assert!(report.failures.is_empty(), "{:?}", report.failures);
    }
}
