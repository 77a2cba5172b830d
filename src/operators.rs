//! Operator semantics for script values.
//!
//! Every function here is pure: it takes operand values and returns a new
//! value or a frame-less [`EvalError`]. The evaluator attaches the call stack
//! and operator location afterwards.

use std::cmp::Ordering;

use crate::{
    ast::{BinaryOp, UnaryOp},
    diagnostics::{EvalError, EvalResult},
    value::{Value, ValueKind},
};

pub fn integer_overflow() -> EvalError {
    EvalError::eval("integer overflow")
}

/// Evaluates `left op right`.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Equal => Ok(Value::bool(left == right)),
        BinaryOp::NotEqual => Ok(Value::bool(left != right)),
        BinaryOp::In => contains(right, left).map(Value::bool),
        BinaryOp::NotIn => contains(right, left).map(|found| Value::bool(!found)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            compare(op, left, right).map(Value::bool)
        }
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::FloorDiv
        | BinaryOp::Mod => arithmetic(op, left, right),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<bool> {
    let ordering = match left.compare(right) {
        Some(ordering) => ordering,
        // NaN compares false against every number.
        None if is_number(left) && is_number(right) => return Ok(false),
        None => {
            return Err(EvalError::eval(format!(
                "unsupported comparison: {} {op} {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };
    Ok(match op {
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessEqual => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn is_number(value: &Value) -> bool {
    matches!(&*value.0, ValueKind::Int(_) | ValueKind::Float(_))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match (&*left.0, &*right.0) {
        (ValueKind::Int(a), ValueKind::Int(b)) => int_arithmetic(op, *a, *b),
        (ValueKind::Int(a), ValueKind::Float(b)) => float_arithmetic(op, *a as f64, *b),
        (ValueKind::Float(a), ValueKind::Int(b)) => float_arithmetic(op, *a, *b as f64),
        (ValueKind::Float(a), ValueKind::Float(b)) => float_arithmetic(op, *a, *b),
        (ValueKind::String(a), ValueKind::String(b)) if op == BinaryOp::Add => {
            Ok(Value::string(format!("{a}{b}")))
        }
        (ValueKind::List(a), ValueKind::List(b)) if op == BinaryOp::Add => {
            Ok(Value::list(a.iter().chain(b).cloned().collect()))
        }
        (ValueKind::String(s), ValueKind::Int(n)) | (ValueKind::Int(n), ValueKind::String(s))
            if op == BinaryOp::Mul =>
        {
            let count = repeat_count(s.len(), *n)?;
            Ok(Value::string(s.repeat(count)))
        }
        (ValueKind::List(items), ValueKind::Int(n)) | (ValueKind::Int(n), ValueKind::List(items))
            if op == BinaryOp::Mul =>
        {
            let count = repeat_count(items.len(), *n)?;
            let mut repeated = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                repeated.extend(items.iter().cloned());
            }
            Ok(Value::list(repeated))
        }
        _ => Err(EvalError::eval(format!(
            "unknown binary op: {} {op} {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Upper bound on the length of a string or list built by `*`.
const MAX_REPEAT_LEN: usize = 1 << 24;

fn repeat_count(len: usize, times: i64) -> EvalResult<usize> {
    let times = usize::try_from(times).unwrap_or(0);
    if len == 0 {
        return Ok(0);
    }
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(EvalError::eval(format!(
            "excessive repeat ({len} * {times} elements)"
        ))),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> EvalResult<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvalError::eval("floating-point division by zero"));
            }
            return Ok(Value::float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(EvalError::eval("integer division by zero"));
            }
            floor_div(a, b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalError::eval("integer modulo by zero"));
            }
            floor_mod(a, b)
        }
        _ => None,
    };
    result.map(Value::int).ok_or_else(integer_overflow)
}

/// Division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let quotient = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

/// Remainder with the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    if b == -1 {
        return Some(0);
    }
    let remainder = a.checked_rem(b)?;
    if remainder != 0 && ((remainder < 0) != (b < 0)) {
        remainder.checked_add(b)
    } else {
        Some(remainder)
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> EvalResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::eval("floating-point division by zero"));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalError::eval("floating-point division by zero"));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(EvalError::eval("floating-point modulo by zero"));
            }
            let remainder = a % b;
            if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                remainder + b
            } else {
                remainder
            }
        }
        _ => return Err(EvalError::eval(format!("unknown binary op: float {op} float"))),
    };
    Ok(Value::float(result))
}

pub fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, &*operand.0) {
        (UnaryOp::Not, _) => Ok(Value::bool(!operand.is_truthy())),
        (UnaryOp::Negate, ValueKind::Int(n)) => {
            n.checked_neg().map(Value::int).ok_or_else(integer_overflow)
        }
        (UnaryOp::Negate, ValueKind::Float(f)) => Ok(Value::float(-f)),
        (UnaryOp::Plus, ValueKind::Int(_) | ValueKind::Float(_)) => Ok(operand.clone()),
        _ => Err(EvalError::eval(format!(
            "unknown unary op: {op}{}",
            operand.type_name()
        ))),
    }
}

/// Resolves a possibly negative index against `len`.
fn resolve_index(index: i64, len: usize) -> EvalResult<usize> {
    let signed_len = i64::try_from(len).map_err(|_| integer_overflow())?;
    let resolved = if index < 0 { index + signed_len } else { index };
    if (0..signed_len).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(EvalError::eval(format!(
            "index {index} out of range [0:{len}]"
        )))
    }
}

fn int_index(container: &Value, index: &Value) -> EvalResult<i64> {
    index.as_int().ok_or_else(|| {
        EvalError::eval(format!(
            "{} index must be int, got {}",
            container.type_name(),
            index.type_name()
        ))
    })
}

/// Evaluates `container[index]`.
pub fn index(container: &Value, index: &Value) -> EvalResult<Value> {
    match &*container.0 {
        ValueKind::List(items) => {
            let idx = resolve_index(int_index(container, index)?, items.len())?;
            Ok(items[idx].clone())
        }
        ValueKind::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            let idx = resolve_index(int_index(container, index)?, chars.len())?;
            Ok(Value::string(chars[idx].to_string()))
        }
        ValueKind::Dict(map) => {
            index.check_hashable()?;
            map.get(index)
                .cloned()
                .ok_or_else(|| EvalError::eval(format!("key {} not in dict", index.repr())))
        }
        _ => Err(EvalError::eval(format!(
            "{} value is not indexable",
            container.type_name()
        ))),
    }
}

/// Returns a copy of `container` with `container[index] = value` applied.
pub fn set_index(container: &Value, index: &Value, value: Value) -> EvalResult<Value> {
    match &*container.0 {
        ValueKind::List(items) => {
            let idx = resolve_index(int_index(container, index)?, items.len())?;
            let mut updated = items.clone();
            updated[idx] = value;
            Ok(Value::list(updated))
        }
        ValueKind::Dict(map) => {
            index.check_hashable()?;
            let mut updated = map.clone();
            updated.insert(index.clone(), value);
            Ok(Value::new(ValueKind::Dict(updated)))
        }
        _ => Err(EvalError::eval(format!(
            "{} value does not support item assignment",
            container.type_name()
        ))),
    }
}

fn slice_bound(value: Option<&Value>, what: &str) -> EvalResult<Option<i64>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_none() => Ok(None),
        Some(v) => v.as_int().map(Some).ok_or_else(|| {
            EvalError::eval(format!("slice {what} must be int, got {}", v.type_name()))
        }),
    }
}

/// Positions selected by `[start:end:step]` over a sequence of `len` items.
fn slice_positions(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut positions = Vec::new();
    if step > 0 {
        let mut at = start.map_or(0, |s| clamp(s, 0, len));
        let stop = end.map_or(len, |e| clamp(e, 0, len));
        while at < stop {
            positions.push(at as usize);
            match at.checked_add(step) {
                Some(next) => at = next,
                None => break,
            }
        }
    } else {
        let mut at = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let stop = end.map_or(-1, |e| clamp(e, -1, len - 1));
        while at > stop {
            positions.push(at as usize);
            match at.checked_add(step) {
                Some(next) => at = next,
                None => break,
            }
        }
    }
    positions
}

/// Evaluates `container[start:end:step]`.
pub fn slice(
    container: &Value,
    start: Option<&Value>,
    end: Option<&Value>,
    step: Option<&Value>,
) -> EvalResult<Value> {
    let start = slice_bound(start, "start")?;
    let end = slice_bound(end, "end")?;
    let step = slice_bound(step, "step")?.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::eval("slice step cannot be zero"));
    }
    match &*container.0 {
        ValueKind::List(items) => Ok(Value::list(
            slice_positions(items.len(), start, end, step)
                .into_iter()
                .map(|idx| items[idx].clone())
                .collect(),
        )),
        ValueKind::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            Ok(Value::string(
                slice_positions(chars.len(), start, end, step)
                    .into_iter()
                    .map(|idx| chars[idx])
                    .collect::<String>(),
            ))
        }
        _ => Err(EvalError::eval(format!(
            "{} value cannot be sliced",
            container.type_name()
        ))),
    }
}

/// The items a `for` loop or comprehension visits. Dicts yield their keys.
pub fn iterate(value: &Value) -> EvalResult<Vec<Value>> {
    match &*value.0 {
        ValueKind::List(items) => Ok(items.clone()),
        ValueKind::Dict(map) => Ok(map.keys().cloned().collect()),
        _ => Err(EvalError::eval(format!(
            "{} value is not iterable",
            value.type_name()
        ))),
    }
}

/// Membership test for `item in container`.
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match &*container.0 {
        ValueKind::List(items) => Ok(items.contains(item)),
        ValueKind::Dict(map) => {
            item.check_hashable()?;
            Ok(map.contains_key(item))
        }
        ValueKind::String(text) => match item.as_str() {
            Some(needle) => Ok(text.contains(needle)),
            None => Err(EvalError::eval(format!(
                "'in <string>' requires string as left operand, not {}",
                item.type_name()
            ))),
        },
        _ => Err(EvalError::eval(format!(
            "unknown binary op: {} in {}",
            item.type_name(),
            container.type_name()
        ))),
    }
}
