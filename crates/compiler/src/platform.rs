//! Platform function interface
//!
//! A platform function is the host's side of the contract: a declared
//! name, input types, output type, and a sync or async implementation.
//! The engine guarantees left-to-right argument evaluation, rewraps
//! thrown faults as `EastError`, and never passes partially-evaluated
//! values. The binding map is per-compilation; there is no global state.

use east_core::{AsyncCallable, EastError, SyncCallable, Type, TypeError, Value, ValueFuture};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

#[derive(Clone)]
pub enum PlatformImpl {
    Sync(SyncCallable),
    Async(AsyncCallable),
}

#[derive(Clone)]
pub struct PlatformFunction {
    pub name: String,
    pub inputs: Vec<Type>,
    pub output: Type,
    pub implementation: PlatformImpl,
}

impl PlatformFunction {
    pub fn sync(
        name: impl Into<String>,
        inputs: Vec<Type>,
        output: Type,
        implementation: impl Fn(Vec<Value>) -> Result<Value, EastError> + 'static,
    ) -> Self {
        PlatformFunction {
            name: name.into(),
            inputs,
            output,
            implementation: PlatformImpl::Sync(Rc::new(implementation)),
        }
    }

    pub fn asynchronous(
        name: impl Into<String>,
        inputs: Vec<Type>,
        output: Type,
        implementation: impl Fn(Vec<Value>) -> ValueFuture + 'static,
    ) -> Self {
        PlatformFunction {
            name: name.into(),
            inputs,
            output,
            implementation: PlatformImpl::Async(Rc::new(implementation)),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.implementation, PlatformImpl::Async(_))
    }
}

/// The per-compilation set of platform bindings, keyed by name.
#[derive(Clone, Default)]
pub struct Platforms {
    map: HashMap<String, PlatformFunction>,
}

impl Platforms {
    pub fn new(functions: Vec<PlatformFunction>) -> Result<Self, TypeError> {
        let mut map = HashMap::with_capacity(functions.len());
        for function in functions {
            if map.contains_key(&function.name) {
                return Err(TypeError::new(format!(
                    "platform function {} declared twice",
                    function.name
                )));
            }
            map.insert(function.name.clone(), function);
        }
        Ok(Platforms { map })
    }

    pub fn get(&self, name: &str) -> Option<&PlatformFunction> {
        self.map.get(name)
    }

    /// Name of some async binding, when any exists.
    pub fn first_async(&self) -> Option<&str> {
        let mut names: Vec<&str> = self
            .map
            .values()
            .filter(|f| f.is_async())
            .map(|f| f.name.as_str())
            .collect();
        names.sort_unstable();
        names.first().copied()
    }

    /// True when `name` is bound and async.
    pub fn is_async(&self, name: &str) -> bool {
        self.get(name).is_some_and(PlatformFunction::is_async)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.map.keys().cloned().collect()
    }
}
