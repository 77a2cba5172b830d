//! The universe: builtins every program sees without a predeclared binding,
//! plus the methods of strings, dicts and lists.
//!
//! They are ordinary [`Builtin`]s and bind their arguments through
//! [`Signature`] exactly like host functions do.

use std::{cmp::Ordering, sync::OnceLock};

use indexmap::IndexMap;

use crate::{
    diagnostics::{EvalError, EvalResult},
    operators,
    runtime::ExecutionContext,
    unpack::{Arguments, Signature},
    value::{Builtin, Value, ValueKind},
};

type BuiltinFn = fn(&mut dyn ExecutionContext, &Arguments) -> EvalResult<Value>;
type MethodFn = fn(&mut dyn ExecutionContext, &Value, &Arguments) -> EvalResult<Value>;

const MAX_RANGE_LEN: usize = 1 << 24;

/// Builtins resolved after predeclared names, shared by every session.
pub fn universe() -> &'static IndexMap<String, Value> {
    static UNIVERSE: OnceLock<IndexMap<String, Value>> = OnceLock::new();
    UNIVERSE.get_or_init(|| {
        let builtins: [(&str, BuiltinFn); 24] = [
            ("abs", builtin_abs),
            ("all", builtin_all),
            ("any", builtin_any),
            ("bool", builtin_bool),
            ("dict", builtin_dict),
            ("enumerate", builtin_enumerate),
            ("fail", builtin_fail),
            ("float", builtin_float),
            ("getattr", builtin_getattr),
            ("hasattr", builtin_hasattr),
            ("int", builtin_int),
            ("len", builtin_len),
            ("list", builtin_list),
            ("max", builtin_max),
            ("min", builtin_min),
            ("print", builtin_print),
            ("range", builtin_range),
            ("repr", builtin_repr),
            ("reversed", builtin_reversed),
            ("sorted", builtin_sorted),
            ("str", builtin_str),
            ("tuple", builtin_tuple),
            ("type", builtin_type),
            ("zip", builtin_zip),
        ];
        builtins
            .into_iter()
            .map(|(name, fun)| (name.to_string(), Value::builtin(Builtin::new(name, fun))))
            .collect()
    })
}

/// Looks up `value.name`, returning the method bound to `value`.
pub fn attribute(value: &Value, name: &str) -> Option<Value> {
    let method: MethodFn = match (&*value.0, name) {
        (ValueKind::String(_), "upper") => string_upper,
        (ValueKind::String(_), "lower") => string_lower,
        (ValueKind::String(_), "strip") => string_strip,
        (ValueKind::String(_), "split") => string_split,
        (ValueKind::String(_), "join") => string_join,
        (ValueKind::String(_), "replace") => string_replace,
        (ValueKind::String(_), "startswith") => string_startswith,
        (ValueKind::String(_), "endswith") => string_endswith,
        (ValueKind::String(_), "find") => string_find,
        (ValueKind::String(_), "format") => string_format,
        (ValueKind::Dict(_), "keys") => dict_keys,
        (ValueKind::Dict(_), "values") => dict_values,
        (ValueKind::Dict(_), "items") => dict_items,
        (ValueKind::Dict(_), "get") => dict_get,
        (ValueKind::List(_), "index") => list_index,
        (ValueKind::List(_), "count") => list_count,
        _ => return None,
    };
    let receiver = value.clone();
    Some(Value::builtin(Builtin::method(
        value.type_name(),
        name.to_string(),
        move |ctx, args| method(ctx, &receiver, args),
    )))
}

/// Iterates `value`, prefixing any failure with the builtin's name.
fn sequence(function: &str, value: &Value) -> EvalResult<Vec<Value>> {
    operators::iterate(value).map_err(|err| {
        let message = format!("{function}: {}", err.message());
        err.with_message(message)
    })
}

/// Collects variadic positionals and a string `sep` keyword, as `print` and `fail` take them.
fn joined_message(function: &str, args: &Arguments) -> EvalResult<String> {
    let mut sep = " ".to_string();
    for (name, value) in &args.named {
        if name != "sep" {
            return Err(EvalError::argument(format!(
                "{function}: unexpected keyword argument \"{name}\""
            )));
        }
        sep = value.project::<String>("sep").map_err(|err| {
            let message = format!("{function}: {}", err.message());
            err.with_message(message)
        })?;
    }
    Ok(args
        .positional
        .iter()
        .map(Value::display_string)
        .collect::<Vec<_>>()
        .join(&sep))
}

fn builtin_print(ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let line = joined_message("print", args)?;
    ctx.print(&line);
    Ok(Value::none())
}

fn builtin_fail(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let message = joined_message("fail", args)?;
    Err(EvalError::eval(format!("fail: {message}")))
}

fn builtin_len(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("len", &["x"]).unpack(args)?;
    value.len().map(Value::from).ok_or_else(|| {
        EvalError::eval(format!("len: value of type {} has no len", value.type_name()))
    })
}

fn builtin_range(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (first, stop, step): (i64, Option<i64>, i64) = Signature::new("range")
        .required("start_or_stop")
        .optional("stop", Value::none())
        .optional("step", 1)
        .unpack(args)?;
    let (start, stop) = match stop {
        Some(stop) => (first, stop),
        None => (0, first),
    };
    if step == 0 {
        return Err(EvalError::eval("range: step argument must not be zero"));
    }
    let mut items = Vec::new();
    let mut at = start;
    while (step > 0 && at < stop) || (step < 0 && at > stop) {
        if items.len() >= MAX_RANGE_LEN {
            return Err(EvalError::eval("range: result has too many elements"));
        }
        items.push(Value::int(at));
        at = match at.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::list(items))
}

fn builtin_str(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("str", &["x"]).unpack(args)?;
    Ok(Value::string(value.display_string()))
}

fn builtin_repr(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("repr", &["x"]).unpack(args)?;
    Ok(Value::string(value.repr()))
}

fn builtin_type(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("type", &["x"]).unpack(args)?;
    Ok(Value::string(value.type_name()))
}

fn builtin_bool(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::new("bool").optional("x", false).unpack(args)?;
    Ok(Value::bool(value.is_truthy()))
}

fn builtin_int(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::new("int").optional("x", 0).unpack(args)?;
    match &*value.0 {
        ValueKind::Int(_) => Ok(value.clone()),
        ValueKind::Bool(b) => Ok(Value::int(i64::from(*b))),
        ValueKind::Float(f) => {
            let truncated = f.trunc();
            if truncated.is_finite()
                && truncated >= i64::MIN as f64
                && truncated < i64::MAX as f64
            {
                Ok(Value::int(truncated as i64))
            } else {
                Err(EvalError::eval(format!(
                    "int: cannot convert float {} to integer",
                    value.repr()
                )))
            }
        }
        ValueKind::String(text) => parse_int(text.trim()).map(Value::int).ok_or_else(|| {
            EvalError::eval(format!("int: invalid literal {}", value.repr()))
        }),
        _ => Err(EvalError::argument(format!(
            "int: for parameter x: got {}, want int, float, bool or string",
            value.type_name()
        ))),
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    if negative {
        magnitude.checked_neg()
    } else {
        Some(magnitude)
    }
}

fn builtin_float(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::new("float").optional("x", 0.0).unpack(args)?;
    match &*value.0 {
        ValueKind::Float(_) => Ok(value.clone()),
        ValueKind::Int(n) => Ok(Value::float(*n as f64)),
        ValueKind::Bool(b) => Ok(Value::float(if *b { 1.0 } else { 0.0 })),
        ValueKind::String(text) => text.trim().parse::<f64>().map(Value::float).map_err(|_| {
            EvalError::eval(format!("float: invalid literal {}", value.repr()))
        }),
        _ => Err(EvalError::argument(format!(
            "float: for parameter x: got {}, want int, float, bool or string",
            value.type_name()
        ))),
    }
}

fn builtin_list(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::new("list")
        .optional("x", Value::list(Vec::new()))
        .unpack(args)?;
    Ok(Value::list(sequence("list", &value)?))
}

fn builtin_tuple(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::new("tuple")
        .optional("x", Value::list(Vec::new()))
        .unpack(args)?;
    Ok(Value::list(sequence("tuple", &value)?))
}

fn builtin_dict(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    if args.positional.len() > 1 {
        return Err(EvalError::argument(format!(
            "dict: got {} arguments, want at most 1",
            args.positional.len()
        )));
    }
    let mut map = IndexMap::new();
    if let Some(source) = args.positional.first() {
        match &*source.0 {
            ValueKind::Dict(entries) => {
                map.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            ValueKind::List(pairs) => {
                for (idx, pair) in pairs.iter().enumerate() {
                    let Some([key, value]) = pair.as_list() else {
                        return Err(EvalError::eval(format!(
                            "dict: element #{idx} is not a pair"
                        )));
                    };
                    key.check_hashable()?;
                    map.insert(key.clone(), value.clone());
                }
            }
            _ => {
                return Err(EvalError::argument(format!(
                    "dict: for parameter pairs: got {}, want dict or list",
                    source.type_name()
                )))
            }
        }
    }
    for (name, value) in &args.named {
        map.insert(Value::string(name.as_str()), value.clone());
    }
    Ok(Value::new(ValueKind::Dict(map)))
}

fn builtin_sorted(ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (iterable, key, reverse): (Value, Value, bool) = Signature::new("sorted")
        .required("iterable")
        .optional("key", Value::none())
        .optional("reverse", false)
        .unpack(args)?;
    let items = sequence("sorted", &iterable)?;
    let keys = if key.is_none() {
        items.clone()
    } else {
        items
            .iter()
            .map(|item| ctx.call(&key, Arguments::from_positional(vec![item.clone()])))
            .collect::<EvalResult<Vec<_>>>()?
    };

    let mut compare = |a: usize, b: usize| {
        let (left, right) = if reverse { (&keys[b], &keys[a]) } else { (&keys[a], &keys[b]) };
        left.compare(right).ok_or_else(|| {
            EvalError::eval(format!(
                "sorted: unsupported comparison: {} vs {}",
                left.type_name(),
                right.type_name()
            ))
        })
    };
    let order = merge_sort((0..items.len()).collect(), &mut compare)?;
    Ok(Value::list(order.into_iter().map(|idx| items[idx].clone()).collect()))
}

/// Stable merge sort of indices that stops at the first pair `compare` rejects.
fn merge_sort<F>(mut order: Vec<usize>, compare: &mut F) -> EvalResult<Vec<usize>>
where
    F: FnMut(usize, usize) -> EvalResult<Ordering>,
{
    if order.len() <= 1 {
        return Ok(order);
    }
    let right = order.split_off(order.len() / 2);
    let left = merge_sort(order, compare)?;
    let right = merge_sort(right, compare)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        // Equal keys keep their input order.
        if compare(right[j], left[i])? == Ordering::Less {
            merged.push(right[j]);
            j += 1;
        } else {
            merged.push(left[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

fn builtin_reversed(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("reversed", &["sequence"]).unpack(args)?;
    let mut items = sequence("reversed", &value)?;
    items.reverse();
    Ok(Value::list(items))
}

fn builtin_enumerate(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value, start): (Value, i64) = Signature::new("enumerate")
        .required("iterable")
        .optional("start", 0)
        .unpack(args)?;
    let items = sequence("enumerate", &value)?;
    let mut pairs = Vec::with_capacity(items.len());
    let mut idx = start;
    for item in items {
        pairs.push(Value::list(vec![Value::int(idx), item]));
        idx = idx.checked_add(1).ok_or_else(operators::integer_overflow)?;
    }
    Ok(Value::list(pairs))
}

fn builtin_zip(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    if let Some((name, _)) = args.named.first() {
        return Err(EvalError::argument(format!(
            "zip: unexpected keyword argument \"{name}\""
        )));
    }
    let columns = args
        .positional
        .iter()
        .map(|value| sequence("zip", value))
        .collect::<EvalResult<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..rows)
            .map(|row| Value::list(columns.iter().map(|column| column[row].clone()).collect()))
            .collect(),
    ))
}

fn builtin_min(ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    extreme("min", ctx, args, Ordering::Less)
}

fn builtin_max(ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    extreme("max", ctx, args, Ordering::Greater)
}

/// `min`/`max`: the first item whose key orders `wanted` against every other.
fn extreme(
    function: &str,
    ctx: &mut dyn ExecutionContext,
    args: &Arguments,
    wanted: Ordering,
) -> EvalResult<Value> {
    let mut key = Value::none();
    for (name, value) in &args.named {
        if name != "key" {
            return Err(EvalError::argument(format!(
                "{function}: unexpected keyword argument \"{name}\""
            )));
        }
        key = value.clone();
    }
    let candidates = match args.positional.as_slice() {
        [] => {
            return Err(EvalError::argument(format!(
                "{function}: got 0 arguments, want at least 1"
            )))
        }
        [single] => sequence(function, single)?,
        many => many.to_vec(),
    };

    let mut best: Option<(Value, Value)> = None;
    for item in candidates {
        let item_key = if key.is_none() {
            item.clone()
        } else {
            ctx.call(&key, Arguments::from_positional(vec![item.clone()]))?
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => {
                let ordering = item_key.compare(best_key).ok_or_else(|| {
                    EvalError::eval(format!(
                        "{function}: unsupported comparison: {} vs {}",
                        item_key.type_name(),
                        best_key.type_name()
                    ))
                })?;
                ordering == wanted
            }
        };
        if replace {
            best = Some((item_key, item));
        }
    }
    best.map(|(_, item)| item).ok_or_else(|| {
        EvalError::eval(format!("{function}: argument is an empty sequence"))
    })
}

fn builtin_abs(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("abs", &["x"]).unpack(args)?;
    match &*value.0 {
        ValueKind::Int(n) => n
            .checked_abs()
            .map(Value::int)
            .ok_or_else(operators::integer_overflow),
        ValueKind::Float(f) => Ok(Value::float(f.abs())),
        _ => Err(EvalError::argument(format!(
            "abs: for parameter x: got {}, want int or float",
            value.type_name()
        ))),
    }
}

fn builtin_any(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("any", &["iterable"]).unpack(args)?;
    Ok(Value::bool(sequence("any", &value)?.iter().any(Value::is_truthy)))
}

fn builtin_all(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value,): (Value,) = Signature::parse("all", &["iterable"]).unpack(args)?;
    Ok(Value::bool(sequence("all", &value)?.iter().all(Value::is_truthy)))
}

fn builtin_hasattr(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let (value, name): (Value, String) = Signature::parse("hasattr", &["x", "name"]).unpack(args)?;
    Ok(Value::bool(attribute(&value, &name).is_some()))
}

fn builtin_getattr(_ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
    let signature = Signature::parse("getattr", &["x", "name", "default?"]);
    let (value, name, default): (Value, String, Value) = signature.unpack(args)?;
    let has_default =
        args.positional.len() > 2 || args.named.iter().any(|(param, _)| param == "default");
    match attribute(&value, &name) {
        Some(attr) => Ok(attr),
        None if has_default => Ok(default),
        None => Err(EvalError::eval(format!(
            "getattr: {} has no .{name} field or method",
            value.type_name()
        ))),
    }
}

fn receiver_str<'v>(receiver: &'v Value, method: &str) -> EvalResult<&'v str> {
    receiver.as_str().ok_or_else(|| {
        EvalError::eval(format!(
            "{method}: receiver is {}, want string",
            receiver.type_name()
        ))
    })
}

fn string_upper(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    args.expect_none("upper")?;
    Ok(Value::string(receiver_str(receiver, "upper")?.to_uppercase()))
}

fn string_lower(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    args.expect_none("lower")?;
    Ok(Value::string(receiver_str(receiver, "lower")?.to_lowercase()))
}

fn string_strip(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (chars,): (Option<String>,) = Signature::parse("strip", &["chars?"]).unpack(args)?;
    let text = receiver_str(receiver, "strip")?;
    let stripped = match chars {
        Some(chars) => text.trim_matches(|c: char| chars.contains(c)),
        None => text.trim(),
    };
    Ok(Value::string(stripped))
}

fn string_split(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (sep, maxsplit): (Option<String>, i64) = Signature::new("split")
        .optional("sep", Value::none())
        .optional("maxsplit", -1)
        .unpack(args)?;
    let text = receiver_str(receiver, "split")?;
    let parts: Vec<Value> = match (sep, usize::try_from(maxsplit)) {
        (None, _) => text.split_whitespace().map(Value::from).collect(),
        (Some(sep), _) if sep.is_empty() => {
            return Err(EvalError::eval("split: empty separator"));
        }
        (Some(sep), Ok(max)) => text.splitn(max + 1, sep.as_str()).map(Value::from).collect(),
        (Some(sep), Err(_)) => text.split(sep.as_str()).map(Value::from).collect(),
    };
    Ok(Value::list(parts))
}

fn string_join(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (iterable,): (Value,) = Signature::parse("join", &["iterable"]).unpack(args)?;
    let sep = receiver_str(receiver, "join")?;
    let items = sequence("join", &iterable)?;
    let mut parts = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let part = item.as_str().ok_or_else(|| {
            EvalError::eval(format!(
                "join: in list, want string, got {} at index {idx}",
                item.type_name()
            ))
        })?;
        parts.push(part);
    }
    Ok(Value::string(parts.join(sep)))
}

fn string_replace(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (old, new, count): (String, String, i64) = Signature::new("replace")
        .required("old")
        .required("new")
        .optional("count", -1)
        .unpack(args)?;
    let text = receiver_str(receiver, "replace")?;
    let replaced = match usize::try_from(count) {
        Ok(count) => text.replacen(old.as_str(), &new, count),
        Err(_) => text.replace(old.as_str(), &new),
    };
    Ok(Value::string(replaced))
}

fn string_startswith(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (prefix,): (String,) = Signature::parse("startswith", &["prefix"]).unpack(args)?;
    Ok(Value::bool(receiver_str(receiver, "startswith")?.starts_with(&prefix)))
}

fn string_endswith(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (suffix,): (String,) = Signature::parse("endswith", &["suffix"]).unpack(args)?;
    Ok(Value::bool(receiver_str(receiver, "endswith")?.ends_with(&suffix)))
}

fn string_find(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (sub,): (String,) = Signature::parse("find", &["sub"]).unpack(args)?;
    let text = receiver_str(receiver, "find")?;
    let position = match text.find(&sub) {
        Some(byte) => text[..byte].chars().count() as i64,
        None => -1,
    };
    Ok(Value::int(position))
}

/// `"{} and {name}".format(...)`: auto-numbered, indexed and named fields; `{{` and `}}` escape.
fn string_format(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let text = receiver_str(receiver, "format")?;
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut next_auto = 0;
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(EvalError::eval(
                                "format: unmatched '{' in format string",
                            ))
                        }
                    }
                }
                let value = if field.is_empty() {
                    next_auto += 1;
                    args.positional.get(next_auto - 1)
                } else if let Ok(idx) = field.parse::<usize>() {
                    args.positional.get(idx)
                } else {
                    args.named
                        .iter()
                        .find(|(name, _)| *name == field)
                        .map(|(_, value)| value)
                };
                let value = value.ok_or_else(|| {
                    EvalError::eval(format!("format: no argument for field {{{field}}}"))
                })?;
                out.push_str(&value.display_string());
            }
            '}' => return Err(EvalError::eval("format: single '}' in format string")),
            other => out.push(other),
        }
    }
    Ok(Value::string(out))
}

fn receiver_dict<'v>(receiver: &'v Value, method: &str) -> EvalResult<&'v IndexMap<Value, Value>> {
    receiver.as_dict().ok_or_else(|| {
        EvalError::eval(format!(
            "{method}: receiver is {}, want dict",
            receiver.type_name()
        ))
    })
}

fn dict_keys(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    args.expect_none("keys")?;
    Ok(Value::list(receiver_dict(receiver, "keys")?.keys().cloned().collect()))
}

fn dict_values(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    args.expect_none("values")?;
    Ok(Value::list(receiver_dict(receiver, "values")?.values().cloned().collect()))
}

fn dict_items(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    args.expect_none("items")?;
    Ok(Value::list(
        receiver_dict(receiver, "items")?
            .iter()
            .map(|(key, value)| Value::list(vec![key.clone(), value.clone()]))
            .collect(),
    ))
}

fn dict_get(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (key, default): (Value, Value) =
        Signature::parse("get", &["key", "default?"]).unpack(args)?;
    key.check_hashable()?;
    Ok(receiver_dict(receiver, "get")?
        .get(&key)
        .cloned()
        .unwrap_or(default))
}

fn receiver_list<'v>(receiver: &'v Value, method: &str) -> EvalResult<&'v [Value]> {
    receiver.as_list().ok_or_else(|| {
        EvalError::eval(format!(
            "{method}: receiver is {}, want list",
            receiver.type_name()
        ))
    })
}

fn list_index(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (needle,): (Value,) = Signature::parse("index", &["x"]).unpack(args)?;
    receiver_list(receiver, "index")?
        .iter()
        .position(|item| *item == needle)
        .map(Value::from)
        .ok_or_else(|| EvalError::eval(format!("index: value {} not in list", needle.repr())))
}

fn list_count(
    _ctx: &mut dyn ExecutionContext,
    receiver: &Value,
    args: &Arguments,
) -> EvalResult<Value> {
    let (needle,): (Value,) = Signature::parse("count", &["x"]).unpack(args)?;
    let count = receiver_list(receiver, "count")?
        .iter()
        .filter(|item| **item == needle)
        .count();
    Ok(Value::from(count))
}
