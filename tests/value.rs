use std::cmp::Ordering;

use indexmap::IndexMap;
use lotus::{value::format_float, Kind, Mismatch, Value};
use pretty_assertions::assert_eq;

#[test]
fn kinds_and_type_names() {
    let cases = [
        (Value::none(), Kind::None, "NoneType"),
        (Value::from(true), Kind::Boolean, "bool"),
        (Value::from(1), Kind::Integer, "int"),
        (Value::from(1.5), Kind::Float, "float"),
        (Value::from("s"), Kind::String, "string"),
        (Value::list(vec![]), Kind::Sequence, "list"),
        (Value::dict(vec![]).expect("empty dict"), Kind::Mapping, "dict"),
    ];
    for (value, kind, name) in cases {
        assert_eq!(value.kind(), kind);
        assert_eq!(value.type_name(), name);
    }
}

#[test]
fn strings_display_bare_and_repr_quoted() {
    let value = Value::from("say \"hi\"\n");
    assert_eq!(value.display_string(), "say \"hi\"\n");
    assert_eq!(value.repr(), r#""say \"hi\"\n""#);
    let list = Value::list(vec![Value::from("a"), Value::from(1), Value::none()]);
    assert_eq!(list.display_string(), r#"["a", 1, None]"#);
}

#[test]
fn floats_never_read_as_integers() {
    assert_eq!(format_float(1.0), "1.0");
    assert_eq!(format_float(0.5), "0.5");
    assert_eq!(format_float(-2.0), "-2.0");
    assert_eq!(format_float(1e20), "1e+20");
    assert_eq!(format_float(f64::INFINITY), "+inf");
    assert_eq!(Value::from(3.0).display_string(), "3.0");
}

#[test]
fn truthiness_follows_emptiness() {
    assert!(!Value::none().is_truthy());
    assert!(!Value::from(0).is_truthy());
    assert!(!Value::from("").is_truthy());
    assert!(!Value::list(vec![]).is_truthy());
    assert!(Value::from(0.1).is_truthy());
    assert!(Value::list(vec![Value::none()]).is_truthy());
}

#[test]
fn lists_are_not_hashable() {
    let err = Value::dict(vec![(Value::list(vec![]), Value::none())]).unwrap_err();
    assert_eq!(err.message(), "unhashable type: list");
}

#[test]
fn equal_int_and_float_are_the_same_key() {
    let dict = Value::dict(vec![(Value::from(1), Value::from("one"))]).expect("hashable key");
    let map = dict.as_dict().expect("dict value");
    assert_eq!(map.get(&Value::from(1.0)), Some(&Value::from("one")));
    assert_eq!(Value::from(1), Value::from(1.0));
}

#[test]
fn int_and_float_equal_only_when_exact() {
    let big = Value::from(9_007_199_254_740_993_i64);
    let near = Value::from(9_007_199_254_740_992.0);
    assert_ne!(big, near);
    assert_eq!(big.compare(&near), Some(Ordering::Greater));
    assert_eq!(near.compare(&big), Some(Ordering::Less));
    assert_eq!(Value::from(-2).compare(&Value::from(-2.5)), Some(Ordering::Greater));
    assert_eq!(Value::from(1).compare(&Value::from(f64::NAN)), None);

    let min_key =
        Value::dict(vec![(Value::from(i64::MIN), Value::from("min"))]).expect("hashable key");
    let map = min_key.as_dict().expect("dict value");
    assert_eq!(map.get(&Value::from(-9_223_372_036_854_775_808.0)), Some(&Value::from("min")));
    assert_eq!(map.get(&Value::from(9_223_372_036_854_775_808.0)), None);
}

#[test]
fn projection_reports_mismatch() {
    assert_eq!(Value::from(3).to::<f64>(), Ok(3.0));
    assert_eq!(
        Value::from("x").to::<i64>(),
        Err(Mismatch {
            got: "string".into(),
            want: "int".into(),
        })
    );
    assert_eq!(Value::none().to::<Option<String>>(), Ok(None));
    assert!(Value::from(-1).to::<usize>().is_err());
}

#[test]
fn dict_projects_into_index_map() {
    let dict = Value::dict(vec![
        (Value::from("b"), Value::from(2)),
        (Value::from("a"), Value::from(1)),
    ])
    .expect("hashable keys");
    let map: IndexMap<String, i64> = dict.to().expect("string keys and int values");
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);

    let bad = Value::dict(vec![(Value::from(1), Value::from(1))]).expect("hashable key");
    let err = bad.to::<IndexMap<String, i64>>().unwrap_err();
    assert_eq!(err.to_string(), "got int key, want string key");
}
