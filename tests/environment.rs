use lotus::{Environment, LotusError, PrintHandler, Registry, Session, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn build_keeps_declaration_order() {
    let env = Environment::build([("zeta", Value::from(1)), ("alpha", Value::from(2))])
        .expect("names are distinct");
    assert_eq!(env.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    assert_eq!(env.len(), 2);
    assert_eq!(env.get("alpha"), Some(&Value::from(2)));
    assert!(!env.contains("beta"));
}

#[test]
fn build_rejects_duplicate_names() {
    let err = Environment::build([("x", Value::from(1)), ("x", Value::from(2))]).unwrap_err();
    assert!(matches!(err, LotusError::DuplicateName(ref name) if name == "x"));
    assert_eq!(err.to_string(), "duplicate predeclared name `x`");
}

#[test]
fn registry_rejects_duplicate_names() {
    let mut registry = Registry::new();
    registry.register("limit", 10).expect("first registration");
    let err = registry.register("limit", 20).unwrap_err();
    assert!(matches!(err, LotusError::DuplicateName(ref name) if name == "limit"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn registered_builtin_is_callable_from_scripts() {
    let mut registry = Registry::new();
    registry
        .register_builtin("answer", |_ctx, args| {
            args.expect_none("answer")?;
            Ok(Value::from(42))
        })
        .expect("answer is registered once");
    let env = registry.build();
    assert!(env.contains("answer"));

    let mut session = Session::new("env.star", PrintHandler::Silent);
    let globals = session
        .run(&env, "x = answer()\nname = str(answer)\n")
        .expect("program should succeed");
    assert_eq!(globals.get("x"), Some(&Value::from(42)));
    assert_eq!(
        globals.get("name"),
        Some(&Value::from("<built-in function answer>"))
    );
}

#[test]
fn universe_names_are_visible_but_not_predeclared() {
    let env = Environment::empty();
    assert!(env.is_empty());
    let mut session = Session::new("env.star", PrintHandler::Silent);
    let globals = session
        .run(&env, "n = len([1, 2])\n")
        .expect("program should succeed");
    assert_eq!(globals.keys(), vec!["n"]);
}

#[test]
fn predeclared_names_override_universe() {
    let env = Environment::build([("len", Value::from("shadowed"))]).expect("single name");
    let mut session = Session::new("env.star", PrintHandler::Silent);
    let globals = session
        .run(&env, "x = len\n")
        .expect("program should succeed");
    assert_eq!(globals.get("x"), Some(&Value::from("shadowed")));
}

fn bindings_with_duplicate() -> impl Strategy<Value = (Vec<String>, String)> {
    prop::collection::hash_set("[a-z]{1,6}", 1..8)
        .prop_flat_map(|names| {
            let names: Vec<String> = names.into_iter().collect();
            let count = names.len();
            (Just(names), 0..count)
        })
        .prop_flat_map(|(names, pick)| {
            let duplicate = names[pick].clone();
            let mut all = names;
            all.push(duplicate.clone());
            (Just(all).prop_shuffle(), Just(duplicate))
        })
}

proptest! {
    #[test]
    fn duplicate_is_detected_in_any_order((names, duplicate) in bindings_with_duplicate()) {
        let err = Environment::build(names.iter().map(|name| (name.clone(), Value::from(1))))
            .unwrap_err();
        match err {
            LotusError::DuplicateName(name) => prop_assert_eq!(name, duplicate),
            other => prop_assert!(false, "unexpected error {other:?}"),
        }
    }
}
