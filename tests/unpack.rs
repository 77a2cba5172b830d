use lotus::{Arguments, ErrorKind, ParamSpec, Signature, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn repeat_signature() -> Signature {
    Signature::parse("repeat", &["s", "n?"]).with_default("n", 1)
}

fn binding_error(signature: &Signature, args: Arguments) -> String {
    match signature.bind(&args) {
        Ok(bound) => panic!("expected binding error, bound {:?}", bound.values()),
        Err(err) => {
            assert_eq!(err.kind(), ErrorKind::ArgumentBinding);
            err.message().to_string()
        }
    }
}

#[test]
fn positional_arguments_fill_in_order() {
    let signature = repeat_signature();
    let bound = signature
        .bind(&Arguments::from_positional(vec![Value::from("ab"), Value::from(3)]))
        .expect("arguments should bind");
    assert_eq!(bound.values(), &[Value::from("ab"), Value::from(3)]);
}

#[test]
fn missing_optional_takes_default() {
    let signature = repeat_signature();
    let (s, n): (String, i64) = signature
        .unpack(&Arguments::from_positional(vec![Value::from("ab")]))
        .expect("arguments should bind");
    assert_eq!((s.as_str(), n), ("ab", 1));
}

#[test]
fn parse_marks_optional_with_none_default() {
    let signature = Signature::parse("f", &["a", "b?"]);
    assert!(signature.params()[0].is_required());
    assert_eq!(signature.params()[1].default(), Some(&Value::none()));
    let (a, b): (i64, Option<i64>) = signature
        .unpack(&Arguments::from_positional(vec![Value::from(1)]))
        .expect("arguments should bind");
    assert_eq!((a, b), (1, None));
}

#[test]
fn keywords_bind_by_name() {
    let signature = repeat_signature();
    let args = Arguments::default().with_named("n", 3).with_named("s", "x");
    let bound = signature.bind(&args).expect("arguments should bind");
    assert_eq!(bound.by_name("s"), Some(&Value::from("x")));
    assert_eq!(bound.by_name("n"), Some(&Value::from(3)));
    assert_eq!(bound.by_name("missing"), None);
}

#[test]
fn too_many_positional_arguments() {
    let message = binding_error(
        &repeat_signature(),
        Arguments::from_positional(vec![Value::from("a"), Value::from(1), Value::from(2)]),
    );
    assert_eq!(message, "repeat: got 3 arguments, want at most 2");
}

#[test]
fn unknown_keyword_argument() {
    let message = binding_error(
        &repeat_signature(),
        Arguments::from_positional(vec![Value::from("a")]).with_named("count", 2),
    );
    assert_eq!(message, "repeat: unexpected keyword argument \"count\"");
}

#[test]
fn keyword_duplicates_positional() {
    let message = binding_error(
        &repeat_signature(),
        Arguments::from_positional(vec![Value::from("a")]).with_named("s", "b"),
    );
    assert_eq!(message, "repeat: got multiple values for parameter \"s\"");
}

#[test]
fn missing_required_argument() {
    let message = binding_error(&repeat_signature(), Arguments::default());
    assert_eq!(message, "repeat: missing required argument s");
}

#[test]
fn projection_reports_parameter_and_kinds() {
    let args = Arguments::from_positional(vec![Value::from("a"), Value::from("x")]);
    let err = repeat_signature()
        .unpack::<(String, i64)>(&args)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArgumentBinding);
    assert_eq!(err.message(), "repeat: for parameter n: got string, want int");
}

#[test]
fn list_projection_reports_element_index() {
    let signature = Signature::new("total").required("numbers");
    let numbers = Value::list(vec![Value::from(1), Value::from("two")]);
    let err = signature
        .unpack::<(Vec<i64>,)>(&Arguments::from_positional(vec![numbers]))
        .unwrap_err();
    assert_eq!(
        err.message(),
        "total: for parameter numbers: got string at index 1, want int"
    );
}

#[test]
fn value_projects_for_named_parameter() {
    let err = Value::from(true).project::<String>("label").unwrap_err();
    assert_eq!(err.message(), "for parameter label: got bool, want string");
    assert_eq!(Value::from(2).project::<f64>("ratio").ok(), Some(2.0));
}

#[test]
fn from_params_builds_mixed_signature() {
    let signature = Signature::from_params(
        "span",
        vec![
            ParamSpec::required("start"),
            ParamSpec::optional("end", 10),
        ],
    );
    assert_eq!(signature.position("end"), Some(1));
    let (start, end): (i64, i64) = signature
        .unpack(&Arguments::default().with_named("start", 4))
        .expect("arguments should bind");
    assert_eq!((start, end), (4, 10));
}

#[test]
fn expect_none_rejects_arguments() {
    assert!(Arguments::default().expect_none("stop").is_ok());
    let err = Arguments::from_positional(vec![Value::from(1)])
        .expect_none("stop")
        .unwrap_err();
    assert_eq!(err.message(), "stop: got 1 arguments, want 0");
}

#[test]
fn changing_a_default_affects_only_unbound_parameter() {
    let signature =
        |default: i64| Signature::parse("f", &["a", "b?", "c?"]).with_default("c", default);
    let args = Arguments::from_positional(vec![Value::from(1)]).with_named("b", 2);
    let low = signature(10);
    let high = signature(20);
    let low_bound = low.bind(&args).expect("arguments should bind");
    let high_bound = high.bind(&args).expect("arguments should bind");
    assert_eq!(&low_bound.values()[..2], &high_bound.values()[..2]);
    assert_eq!(low_bound.by_name("c"), Some(&Value::from(10)));
    assert_eq!(high_bound.by_name("c"), Some(&Value::from(20)));

    let explicit = args.clone().with_named("c", 3);
    assert_eq!(
        low.bind(&explicit).expect("arguments should bind").values(),
        high.bind(&explicit).expect("arguments should bind").values()
    );
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "with_default names undeclared parameter count")]
fn default_for_undeclared_parameter_is_a_host_bug() {
    let _ = repeat_signature().with_default("count", 2);
}

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

proptest! {
    #[test]
    fn keyword_order_does_not_change_binding(
        split in 0usize..=4,
        order in Just(vec![0usize, 1, 2, 3]).prop_shuffle(),
    ) {
        let signature = Signature::parse("f", &NAMES);
        let values: Vec<Value> = (1..=4).map(Value::int).collect();
        let positional = values[..split].to_vec();
        let named = order
            .iter()
            .filter(|&&idx| idx >= split)
            .map(|&idx| (NAMES[idx].to_string(), values[idx].clone()))
            .collect();

        let bound = signature.bind(&Arguments::new(positional, named)).unwrap();
        prop_assert_eq!(bound.values(), values.as_slice());
    }

    #[test]
    fn keyword_repeating_a_positional_always_fails(
        split in 1usize..=4,
        duplicate in 0usize..4,
        others in proptest::sample::subsequence(vec![0usize, 1, 2, 3], 0..=4),
        slot in 0usize..=4,
    ) {
        let signature = Signature::parse("f", &NAMES);
        let duplicate = duplicate % split;
        let positional: Vec<Value> = (0..split).map(|idx| Value::int(idx as i64)).collect();
        let mut named: Vec<(String, Value)> = others
            .iter()
            .filter(|&&idx| idx >= split)
            .map(|&idx| (NAMES[idx].to_string(), Value::int(idx as i64)))
            .collect();
        let slot = slot.min(named.len());
        named.insert(slot, (NAMES[duplicate].to_string(), Value::from("again")));

        let message = binding_error(&signature, Arguments::new(positional, named));
        prop_assert_eq!(
            message,
            format!("f: got multiple values for parameter \"{}\"", NAMES[duplicate])
        );
    }
}
