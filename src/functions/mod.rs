use crate::errors::Result;
use crate::value::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;

pub mod builtins;
pub mod reflect;

/// Upper arity bound for functions taking any number of arguments.
pub const VARIADIC: usize = usize::MAX;

/// Trait for pluggable functions used by the evaluator.
///
/// Arity is checked by the evaluator before `call`; argument types are
/// the implementation's job.
pub trait Function: Send + Sync {
    fn name(&self) -> &str;
    fn arity(&self) -> RangeInclusive<usize>;
    /// `input` is the current value at the call site.
    fn call(&self, input: &Value, args: &[Value]) -> Result<Value>;
}

/// Arguments handed to a [`Macro`], evaluated only on demand.
pub struct LazyArgs<'e> {
    count: usize,
    eval: &'e mut dyn FnMut(usize) -> Result<Value>,
}

impl<'e> LazyArgs<'e> {
    pub fn new(count: usize, eval: &'e mut dyn FnMut(usize) -> Result<Value>) -> Self {
        Self { count, eval }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn eval(&mut self, index: usize) -> Result<Value> {
        (self.eval)(index)
    }
}

/// A built-in that controls evaluation of its own arguments.
pub trait Macro: Send + Sync {
    fn name(&self) -> &str;
    fn arity(&self) -> RangeInclusive<usize>;
    fn call(&self, args: &mut LazyArgs<'_>) -> Result<Value>;
}

/// Function backed by a closure.
pub struct FnFunction<F> {
    name: String,
    arity: RangeInclusive<usize>,
    f: F,
}

impl<F> FnFunction<F>
where
    F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync,
{
    pub fn new(name: impl Into<String>, arity: RangeInclusive<usize>, f: F) -> Self {
        Self { name: name.into(), arity, f }
    }
}

impl<F> Function for FnFunction<F>
where
    F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> RangeInclusive<usize> {
        self.arity.clone()
    }

    fn call(&self, input: &Value, args: &[Value]) -> Result<Value> {
        (self.f)(input, args)
    }
}

/// Thread-safe function registry. Cloning shares the tables until one of
/// the clones is modified.
#[derive(Clone, Default)]
pub struct Registry {
    functions: Arc<HashMap<String, Arc<dyn Function>>>,
    macros: Arc<HashMap<String, Arc<dyn Macro>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::install(&mut registry);
        registry
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        self.register_arc(Arc::new(f));
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register_arc(&mut self, f: Arc<dyn Function>) {
        let name = f.name().to_string();
        let macros = Arc::make_mut(&mut self.macros);
        let shadowed_macro = macros.remove(&name).is_some();
        let replaced = Arc::make_mut(&mut self.functions).insert(name.clone(), f).is_some();
        if replaced || shadowed_macro {
            debug!(function = %name, "function registration overrides an existing entry");
        }
    }

    pub fn register_fn<F>(&mut self, name: &str, arity: RangeInclusive<usize>, f: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(FnFunction::new(name, arity, f));
    }

    pub fn register_macro<M: Macro + 'static>(&mut self, m: M) {
        let name = m.name().to_string();
        Arc::make_mut(&mut self.functions).remove(&name);
        Arc::make_mut(&mut self.macros).insert(name, Arc::new(m));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    pub fn get_macro(&self, name: &str) -> Option<Arc<dyn Macro>> {
        self.macros.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.macros.contains_key(name)
    }

    /// Merge `other` into `self`; entries of `other` win.
    pub fn extend(&mut self, other: &Registry) {
        for f in other.functions.values() {
            self.register_arc(f.clone());
        }
        for (name, m) in other.macros.iter() {
            Arc::make_mut(&mut self.functions).remove(name);
            Arc::make_mut(&mut self.macros).insert(name.clone(), m.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len() + self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn closures_are_registered_by_name() {
        let mut r = Registry::new();
        r.register_fn("twice", 1..=1, |_, args| {
            Ok(Value::from(args[0].as_i64().unwrap_or(0) * 2))
        });
        let f = r.get("twice").unwrap();
        assert_eq!(f.arity(), 1..=1);
        assert_eq!(f.call(&Value::null(), &[Value::from(21)]).unwrap(), Value::from(42));
    }

    #[test]
    fn extension_overrides_builtin() {
        let mut r = Registry::with_builtins();
        r.register_fn("size", 1..=1, |_, _| Ok(Value::from("custom")));
        let out = r.get("size").unwrap().call(&Value::null(), &[Value::null()]).unwrap();
        assert_eq!(out, Value::from("custom"));
    }

    #[test]
    fn function_replaces_macro_of_same_name() {
        let mut r = Registry::with_builtins();
        assert!(r.get_macro("fallback").is_some());
        r.register_fn("fallback", 0..=VARIADIC, |_, _| Ok(Value::null()));
        assert!(r.get_macro("fallback").is_none());
        assert!(r.get("fallback").is_some());
    }

    #[test]
    fn clones_do_not_share_mutations() {
        let base = Registry::with_builtins();
        let mut copy = base.clone();
        copy.register_fn("extra", 0..=0, |_, _| Ok(Value::null()));
        assert!(copy.contains("extra"));
        assert!(!base.contains("extra"));
    }
}
