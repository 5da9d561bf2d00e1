use proptest::prelude::*;
use sigc_check::{
    check_postconditions, check_preconditions, compile_batch, extract, synthesize, Args,
    BatchEntry, ContractCode, ContractedFn, EmissionProfile, Invocation, TestPlanConfig, Value,
};
use sigc_core::parse_signature;

const CONCAT: &str = "concat(n: Nat, m: Nat, xs: SizedSequence(Int, n), ys: SizedSequence(Int, m)) -> SizedSequence(Int, n + m)";

fn concat(args: &Args) -> Value {
    match (&args["xs"], &args["ys"]) {
        (Value::Seq(xs), Value::Seq(ys)) => Value::Seq(xs.iter().chain(ys).cloned().collect()),
        _ => Value::Absent,
    }
}

fn contract() -> ContractCode {
    let sig = parse_signature(CONCAT).unwrap();
    let model = extract(&sig).unwrap();
    synthesize(&sig, &model, &EmissionProfile::default()).unwrap()
}

fn inputs(n: usize, m: usize) -> Args {
    let mut args = Args::new();
    args.insert("n".into(), Value::Int(n as i64));
    args.insert("m".into(), Value::Int(m as i64));
    args.insert("xs".into(), Value::seq_of_ints((0..n as i64).map(|i| i * 3)));
    args.insert("ys".into(), Value::seq_of_ints((0..m as i64).map(|i| -i)));
    args
}

proptest! {
    #[test]
    fn length_equals_sum_is_exact(n in 0usize..40, m in 0usize..40) {
        let f = ContractedFn::new(contract(), concat);
        match f.call(&inputs(n, m)).unwrap() {
            Invocation::Returned { value: Value::Seq(items), violations } => {
                prop_assert!(violations.is_empty());
                prop_assert_eq!(items.len(), n + m);
            }
            other => prop_assert!(false, "unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn wrong_result_length_is_caught(n in 0usize..20, m in 1usize..20) {
        let code = contract();
        let args = inputs(n, m);
        prop_assert!(check_preconditions(&code, &args).unwrap().is_empty());
        let short = Value::seq_of_ints(0..(n + m - 1) as i64);
        let violations = check_postconditions(&code, &args, &short).unwrap();
        prop_assert_eq!(violations.len(), 1);
    }

    #[test]
    fn mismatched_declared_length_is_rejected(n in 0usize..20, m in 0usize..20, extra in 1usize..4) {
        let code = contract();
        let mut args = inputs(n, m);
        args.insert("xs".into(), Value::seq_of_ints(0..(n + extra) as i64));
        let violations = check_preconditions(&code, &args).unwrap();
        prop_assert!(!violations.is_empty());
        prop_assert!(violations[0].message.contains("LengthEquals"));
    }

}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn batch_isolates_failures(broken in proptest::collection::vec(any::<bool>(), 1..6)) {
        let sources: Vec<(String, String)> = broken
            .iter()
            .enumerate()
            .map(|(i, bad)| {
                let text = if *bad { "f(x: Nat -> Int" } else { "f(x: Nat) -> Int" };
                (format!("s{i}"), text.to_string())
            })
            .collect();
        let batch = compile_batch(&sources, &EmissionProfile::default(), &TestPlanConfig::default());
        prop_assert_eq!(batch.len(), broken.len());
        for (entry, bad) in batch.iter().zip(&broken) {
            prop_assert_eq!(entry.failure().is_some(), *bad);
            prop_assert!(matches!(entry, BatchEntry::Failed(_)) == *bad);
        }
    }
}
