use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    diagnostics::{EvalResult, LotusError, Result},
    runtime::ExecutionContext,
    unpack::Arguments,
    value::{Builtin, Value},
};

/// The read-only names a program can see before it runs.
///
/// Built once, then shared by reference (or cheap clone) across any number of
/// sessions, including sessions on other threads.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: Arc<IndexMap<String, Value>>,
}

impl Environment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds an environment from ordered bindings, rejecting repeated names.
    pub fn build<I, K, V>(bindings: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut registry = Registry::new();
        for (name, value) in bindings {
            registry.register(name, value)?;
        }
        Ok(registry.build())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Names in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Collects predeclared bindings; consumed by [`Registry::build`].
#[derive(Debug, Default)]
pub struct Registry {
    bindings: IndexMap<String, Value>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        if self.bindings.contains_key(&name) {
            return Err(LotusError::DuplicateName(name));
        }
        tracing::trace!(name = %name, "registered predeclared binding");
        self.bindings.insert(name, value.into());
        Ok(())
    }

    /// Registers a host function under `name`; the builtin reports errors under the same name.
    pub fn register_builtin<F>(&mut self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(&mut dyn ExecutionContext, &Arguments) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.register(name, Builtin::new(name, callback))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn build(self) -> Environment {
        Environment {
            bindings: Arc::new(self.bindings),
        }
    }
}

/// Top-level bindings produced by a completed run, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Globals {
    bindings: IndexMap<String, Value>,
}

impl Globals {
    pub(crate) fn from_bindings(mut bindings: IndexMap<String, Value>) -> Self {
        bindings.sort_keys();
        Self { bindings }
    }

    /// Binding names in lexicographic order.
    pub fn keys(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.bindings
    }
}
