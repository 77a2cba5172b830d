//! Binding of a dynamic call (positional and keyword values) to a statically
//! declared parameter list.
//!
//! A [`Signature`] is an ordered list of parameter descriptors. Binding is a
//! pure function from [`Arguments`] to [`BoundArgs`]; projection into host
//! types happens afterwards through [`FromValue`]. Nothing here touches shared
//! state, so a builtin may bind arguments while an outer call is still binding.

use std::sync::Arc;

use crate::{
    diagnostics::{EvalError, EvalResult},
    value::{FromValue, Value},
};

/// The values a call site supplies: positional arguments in order, then keyword arguments.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new(positional: Vec<Value>, named: Vec<(String, Value)>) -> Self {
        Self { positional, named }
    }

    pub fn from_positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Fails unless the call supplied no arguments at all.
    pub fn expect_none(&self, function: &str) -> EvalResult<()> {
        if let Some((name, _)) = self.named.first() {
            return Err(EvalError::argument(format!(
                "{function}: unexpected keyword argument \"{name}\""
            )));
        }
        if !self.positional.is_empty() {
            return Err(EvalError::argument(format!(
                "{function}: got {} arguments, want 0",
                self.positional.len()
            )));
        }
        Ok(())
    }
}

/// One declared parameter. A parameter without a default is required.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: Arc<str>,
    default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<Arc<str>>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// The declared parameter list of a callable.
#[derive(Debug, Clone)]
pub struct Signature {
    name: Arc<str>,
    params: Vec<ParamSpec>,
}

impl Signature {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Declares parameters with the compact `"name"` / `"name?"` notation.
    ///
    /// A trailing `?` marks the parameter optional with a `None` default;
    /// use [`Signature::with_default`] to give it another one.
    pub fn parse(name: impl Into<Arc<str>>, decls: &[&str]) -> Self {
        let params = decls
            .iter()
            .map(|decl| match decl.strip_suffix('?') {
                Some(bare) => ParamSpec::optional(bare, Value::none()),
                None => ParamSpec::required(*decl),
            })
            .collect();
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn from_params(name: impl Into<Arc<str>>, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    #[must_use]
    pub fn required(mut self, name: impl Into<Arc<str>>) -> Self {
        self.params.push(ParamSpec::required(name));
        self
    }

    #[must_use]
    pub fn optional(mut self, name: impl Into<Arc<str>>, default: impl Into<Value>) -> Self {
        self.params.push(ParamSpec::optional(name, default));
        self
    }

    /// Replaces the default of an already declared parameter, making it optional.
    ///
    /// Naming an undeclared parameter is a host bug: debug builds panic,
    /// release builds leave the signature unchanged.
    #[must_use]
    pub fn with_default(mut self, name: &str, default: impl Into<Value>) -> Self {
        match self.params.iter_mut().find(|p| &*p.name == name) {
            Some(param) => param.default = Some(default.into()),
            None => debug_assert!(
                false,
                "{}: with_default names undeclared parameter {name}",
                self.name
            ),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| &*p.name == name)
    }

    /// Binds a call's arguments to the declared parameters.
    pub fn bind(&self, args: &Arguments) -> EvalResult<BoundArgs<'_>> {
        let declared = self.params.len();
        if args.positional.len() > declared {
            return Err(self.error(format!(
                "got {} arguments, want at most {declared}",
                args.positional.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; declared];
        for (slot, value) in slots.iter_mut().zip(&args.positional) {
            *slot = Some(value.clone());
        }

        for (name, value) in &args.named {
            let idx = self
                .position(name)
                .ok_or_else(|| self.error(format!("unexpected keyword argument \"{name}\"")))?;
            if slots[idx].is_some() {
                return Err(self.error(format!("got multiple values for parameter \"{name}\"")));
            }
            slots[idx] = Some(value.clone());
        }

        let values = self
            .params
            .iter()
            .zip(slots)
            .map(|(param, slot)| match (slot, &param.default) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => {
                    Err(self.error(format!("missing required argument {}", param.name)))
                }
            })
            .collect::<EvalResult<Vec<_>>>()?;

        Ok(BoundArgs {
            signature: self,
            values,
        })
    }

    /// Binds and projects every parameter into the host types of `T`.
    pub fn unpack<T: UnpackArgs>(&self, args: &Arguments) -> EvalResult<T> {
        T::unpack(&self.bind(args)?)
    }

    fn error(&self, detail: String) -> EvalError {
        EvalError::argument(format!("{}: {detail}", self.name))
    }
}

/// Arguments bound to a signature, one value per declared parameter.
#[derive(Debug, Clone)]
pub struct BoundArgs<'s> {
    signature: &'s Signature,
    values: Vec<Value>,
}

impl BoundArgs<'_> {
    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn by_name(&self, name: &str) -> Option<&Value> {
        self.signature.position(name).and_then(|idx| self.value(idx))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Projects the parameter at `idx`, naming the call and parameter on mismatch.
    pub fn get<T: FromValue>(&self, idx: usize) -> EvalResult<T> {
        let (param, value) = self
            .signature
            .params
            .get(idx)
            .zip(self.values.get(idx))
            .ok_or_else(|| {
                EvalError::eval(format!(
                    "{}: no parameter at position {idx}",
                    self.signature.name
                ))
            })?;
        T::from_value(value).map_err(|mismatch| {
            self.signature
                .error(format!("for parameter {}: {mismatch}", param.name))
        })
    }
}

/// Host-side destination of a whole bound call, implemented for tuples of [`FromValue`].
pub trait UnpackArgs: Sized {
    fn unpack(bound: &BoundArgs<'_>) -> EvalResult<Self>;
}

impl UnpackArgs for () {
    fn unpack(_bound: &BoundArgs<'_>) -> EvalResult<Self> {
        Ok(())
    }
}

macro_rules! impl_unpack_tuple {
    ($($idx:tt => $ty:ident),+) => {
        impl<$($ty: FromValue),+> UnpackArgs for ($($ty,)+) {
            fn unpack(bound: &BoundArgs<'_>) -> EvalResult<Self> {
                Ok(($(bound.get::<$ty>($idx)?,)+))
            }
        }
    };
}

impl_unpack_tuple!(0 => A);
impl_unpack_tuple!(0 => A, 1 => B);
impl_unpack_tuple!(0 => A, 1 => B, 2 => C);
impl_unpack_tuple!(0 => A, 1 => B, 2 => C, 3 => D);
impl_unpack_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_unpack_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);
impl_unpack_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G);
impl_unpack_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G, 7 => H);
