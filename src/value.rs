use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use indexmap::IndexMap;

use crate::{
    ast::FunctionDef,
    diagnostics::{EvalError, EvalResult},
    runtime::ExecutionContext,
    stack::ensure_sufficient_stack,
    unpack::{Arguments, Signature},
};

/// A script value. Cheap to clone, immutable, and safe to share across threads.
#[derive(Clone)]
pub struct Value(pub Arc<ValueKind>);

#[derive(Clone)]
pub enum ValueKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Dict(IndexMap<Value, Value>),
    Callable(Callable),
}

/// The closed set of kinds that may cross the host/script boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Integer,
    Float,
    String,
    Boolean,
    Sequence,
    Mapping,
    Callable,
    None,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Integer => "Integer",
            Kind::Float => "Float",
            Kind::String => "String",
            Kind::Boolean => "Boolean",
            Kind::Sequence => "Sequence",
            Kind::Mapping => "Mapping",
            Kind::Callable => "Callable",
            Kind::None => "None",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Arc::new(kind))
    }

    pub fn none() -> Self {
        Self::new(ValueKind::None)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ValueKind::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Self::new(ValueKind::List(values))
    }

    /// Builds a mapping, rejecting unhashable keys.
    pub fn dict(entries: impl IntoIterator<Item = (Value, Value)>) -> EvalResult<Self> {
        let mut map = IndexMap::new();
        for (key, value) in entries {
            key.check_hashable()?;
            map.insert(key, value);
        }
        Ok(Self::new(ValueKind::Dict(map)))
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Self::new(ValueKind::Callable(Callable::Builtin(builtin)))
    }

    pub fn function(function: UserFunction) -> Self {
        Self::new(ValueKind::Callable(Callable::Function(function)))
    }

    pub fn kind(&self) -> Kind {
        match &*self.0 {
            ValueKind::None => Kind::None,
            ValueKind::Bool(_) => Kind::Boolean,
            ValueKind::Int(_) => Kind::Integer,
            ValueKind::Float(_) => Kind::Float,
            ValueKind::String(_) => Kind::String,
            ValueKind::List(_) => Kind::Sequence,
            ValueKind::Dict(_) => Kind::Mapping,
            ValueKind::Callable(_) => Kind::Callable,
        }
    }

    /// Language-level type name, as reported by `type()` and in error messages.
    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::None => "NoneType",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::String(_) => "string",
            ValueKind::List(_) => "list",
            ValueKind::Dict(_) => "dict",
            ValueKind::Callable(Callable::Function(_)) => "function",
            ValueKind::Callable(Callable::Builtin(_)) => "builtin_function_or_method",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match &*self.0 {
            ValueKind::None => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Int(n) => *n != 0,
            ValueKind::Float(f) => *f != 0.0,
            ValueKind::String(s) => !s.is_empty(),
            ValueKind::List(values) => !values.is_empty(),
            ValueKind::Dict(map) => !map.is_empty(),
            ValueKind::Callable(_) => true,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(&*self.0, ValueKind::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match &*self.0 {
            ValueKind::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match &*self.0 {
            ValueKind::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<Value, Value>> {
        match &*self.0 {
            ValueKind::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match &*self.0 {
            ValueKind::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match &*self.0 {
            ValueKind::String(s) => Some(s.chars().count()),
            ValueKind::List(values) => Some(values.len()),
            ValueKind::Dict(map) => Some(map.len()),
            _ => None,
        }
    }

    pub fn is_hashable(&self) -> bool {
        !matches!(&*self.0, ValueKind::List(_) | ValueKind::Dict(_))
    }

    pub fn check_hashable(&self) -> EvalResult<()> {
        if self.is_hashable() {
            Ok(())
        } else {
            Err(EvalError::eval(format!(
                "unhashable type: {}",
                self.type_name()
            )))
        }
    }

    /// Language-level string conversion (`str()`).
    pub fn display_string(&self) -> String {
        self.to_string()
    }

    /// Language-level quoted form (`repr()`).
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out);
        out
    }

    /// Orders two values of comparable kinds; `None` when the kinds do not compare.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (&*self.0, &*other.0) {
            (ValueKind::Int(a), ValueKind::Int(b)) => Some(a.cmp(b)),
            (ValueKind::Int(a), ValueKind::Float(b)) => int_float_cmp(*a, *b),
            (ValueKind::Float(a), ValueKind::Int(b)) => {
                int_float_cmp(*b, *a).map(Ordering::reverse)
            }
            (ValueKind::Float(a), ValueKind::Float(b)) => a.partial_cmp(b),
            (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
            (ValueKind::Bool(a), ValueKind::Bool(b)) => Some(a.cmp(b)),
            (ValueKind::List(a), ValueKind::List(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    match left.compare(right)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    fn write_repr(&self, out: &mut String) {
        match &*self.0 {
            ValueKind::String(s) => quote_into(s, out),
            ValueKind::List(values) => {
                out.push('[');
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    ensure_sufficient_stack(|| value.write_repr(out));
                }
                out.push(']');
            }
            ValueKind::Dict(map) => {
                out.push('{');
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out);
                    out.push_str(": ");
                    ensure_sufficient_stack(|| value.write_repr(out));
                }
                out.push('}');
            }
            ValueKind::None => out.push_str("None"),
            ValueKind::Bool(true) => out.push_str("True"),
            ValueKind::Bool(false) => out.push_str("False"),
            ValueKind::Int(n) => out.push_str(&n.to_string()),
            ValueKind::Float(n) => out.push_str(&format_float(*n)),
            ValueKind::Callable(Callable::Function(fun)) => {
                out.push_str(&format!("<function {}>", fun.name()));
            }
            ValueKind::Callable(Callable::Builtin(builtin)) => match builtin.method_of {
                Some(owner) => out.push_str(&format!(
                    "<built-in method {} of {owner} value>",
                    builtin.name()
                )),
                None => out.push_str(&format!("<built-in function {}>", builtin.name())),
            },
        }
    }
}

fn quote_into(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
}

/// Formats a float so it never reads as an integer: `1.0`, `0.5`, `1e+20`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+inf".into() } else { "-inf".into() };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let rendered = format!("{value:e}");
        return match rendered.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => rendered,
        };
    }
    let rendered = value.to_string();
    if rendered.contains('.') {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => f.write_str(s),
            _ => f.write_str(&self.repr()),
        }
    }
}

/// `-2^63` and `2^63` as floats; every float in between truncates to an exact `i64`.
const I64_LOWER: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// Exact ordering of an int against a float, with no rounding of the int.
fn int_float_cmp(int: i64, float: f64) -> Option<Ordering> {
    if float.is_nan() {
        return None;
    }
    if float >= I64_UPPER {
        return Some(Ordering::Less);
    }
    if float < I64_LOWER {
        return Some(Ordering::Greater);
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&float),
        unequal => Some(unequal),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::None, ValueKind::None) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Float(b)) | (ValueKind::Float(b), ValueKind::Int(a)) => {
                int_float_cmp(*a, *b) == Some(Ordering::Equal)
            }
            (ValueKind::Float(a), ValueKind::Float(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => a == b,
            (ValueKind::Dict(a), ValueKind::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|rhs| value == rhs))
            }
            (ValueKind::Callable(a), ValueKind::Callable(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &*self.0 {
            ValueKind::None => 0u8.hash(state),
            ValueKind::Bool(b) => b.hash(state),
            ValueKind::Int(n) => n.hash(state),
            // Integral floats hash like the equal int so `1` and `1.0` share a key.
            ValueKind::Float(f) if f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(f) => {
                (*f as i64).hash(state)
            }
            ValueKind::Float(f) => f.to_bits().hash(state),
            ValueKind::String(s) => s.hash(state),
            ValueKind::List(values) => values.hash(state),
            ValueKind::Dict(map) => map.len().hash(state),
            ValueKind::Callable(callable) => callable.hash(state),
        }
    }
}

/// The one callable value kind: either a script function or a host builtin.
#[derive(Clone)]
pub enum Callable {
    Function(UserFunction),
    Builtin(Builtin),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Function(fun) => fun.name(),
            Callable::Builtin(builtin) => builtin.name(),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Function(a), Callable::Function(b)) => Arc::ptr_eq(&a.def, &b.def),
            (Callable::Builtin(a), Callable::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for Callable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Callable::Function(fun) => (Arc::as_ptr(&fun.def) as usize).hash(state),
            Callable::Builtin(builtin) => builtin.hash(state),
        }
    }
}

/// A function defined by the script with `def` or `lambda`.
#[derive(Clone)]
pub struct UserFunction {
    pub def: Arc<FunctionDef>,
    pub signature: Signature,
    /// Enclosing function locals visible to a nested `def` or `lambda`.
    pub captured: Arc<IndexMap<String, Value>>,
}

impl UserFunction {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

pub type NativeFn =
    dyn Fn(&mut dyn ExecutionContext, &Arguments) -> EvalResult<Value> + Send + Sync;

/// A host function callable from script.
///
/// Identity is the name plus the callback pointer.
#[derive(Clone)]
pub struct Builtin {
    name: Arc<str>,
    callback: Arc<NativeFn>,
    method_of: Option<&'static str>,
}

impl Builtin {
    pub fn new<F>(name: impl Into<Arc<str>>, callback: F) -> Self
    where
        F: Fn(&mut dyn ExecutionContext, &Arguments) -> EvalResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
            method_of: None,
        }
    }

    /// A builtin bound to a receiver of the given type, e.g. `"a,b".split`.
    pub fn method<F>(owner: &'static str, name: impl Into<Arc<str>>, callback: F) -> Self
    where
        F: Fn(&mut dyn ExecutionContext, &Arguments) -> EvalResult<Value> + Send + Sync + 'static,
    {
        Self {
            method_of: Some(owner),
            ..Self::new(name, callback)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method_of(&self) -> Option<&'static str> {
        self.method_of
    }

    pub fn call(&self, ctx: &mut dyn ExecutionContext, args: &Arguments) -> EvalResult<Value> {
        (self.callback)(ctx, args)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl Hash for Builtin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        (Arc::as_ptr(&self.callback) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

impl From<Builtin> for Value {
    fn from(builtin: Builtin) -> Self {
        Value::builtin(builtin)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::none()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::int(i64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::list(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Value::none, Into::into)
    }
}

impl<T: Into<Value>> From<IndexMap<String, T>> for Value {
    fn from(entries: IndexMap<String, T>) -> Self {
        Value::new(ValueKind::Dict(
            entries
                .into_iter()
                .map(|(key, value)| (Value::string(key), value.into()))
                .collect(),
        ))
    }
}

/// Why a value could not be projected into a host type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub got: String,
    pub want: String,
}

impl Mismatch {
    fn new(value: &Value, want: impl Into<String>) -> Self {
        Self {
            got: value.type_name().to_string(),
            want: want.into(),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "got {}, want {}", self.got, self.want)
    }
}

/// Projection of a script value into a host type with a declared expected kind.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, Mismatch>;
}

impl Value {
    pub fn to<T: FromValue>(&self) -> Result<T, Mismatch> {
        T::from_value(self)
    }

    /// Projects the value for the named parameter, reporting expected and actual kinds.
    pub fn project<T: FromValue>(&self, param: &str) -> EvalResult<T> {
        T::from_value(self)
            .map_err(|mismatch| EvalError::argument(format!("for parameter {param}: {mismatch}")))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        match &*value.0 {
            ValueKind::Bool(b) => Ok(*b),
            _ => Err(Mismatch::new(value, "bool")),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        match &*value.0 {
            ValueKind::Int(n) => Ok(*n),
            _ => Err(Mismatch::new(value, "int")),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| Mismatch {
            got: format!("int {wide}"),
            want: "int in 32-bit range".into(),
        })
    }
}

impl FromValue for usize {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        let wide = i64::from_value(value)?;
        usize::try_from(wide).map_err(|_| Mismatch {
            got: format!("int {wide}"),
            want: "non-negative int".into(),
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        match &*value.0 {
            ValueKind::Float(f) => Ok(*f),
            ValueKind::Int(n) => Ok(*n as f64),
            _ => Err(Mismatch::new(value, "float")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        match &*value.0 {
            ValueKind::String(s) => Ok(s.clone()),
            _ => Err(Mismatch::new(value, "string")),
        }
    }
}

impl FromValue for Callable {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        match &*value.0 {
            ValueKind::Callable(callable) => Ok(callable.clone()),
            _ => Err(Mismatch::new(value, "callable")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        if value.is_none() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        let items = value
            .as_list()
            .ok_or_else(|| Mismatch::new(value, "list"))?;
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                T::from_value(item).map_err(|inner| Mismatch {
                    got: format!("{} at index {idx}", inner.got),
                    want: inner.want,
                })
            })
            .collect()
    }
}

impl<T: FromValue> FromValue for IndexMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, Mismatch> {
        let map = value
            .as_dict()
            .ok_or_else(|| Mismatch::new(value, "dict"))?;
        map.iter()
            .map(|(key, item)| {
                let key = String::from_value(key).map_err(|inner| Mismatch {
                    got: format!("{} key", inner.got),
                    want: "string key".into(),
                })?;
                let item = T::from_value(item).map_err(|inner| Mismatch {
                    got: format!("{} at key {key:?}", inner.got),
                    want: inner.want,
                })?;
                Ok((key, item))
            })
            .collect()
    }
}
