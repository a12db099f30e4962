//! East compiler: analysis and closure compilation
//!
//! The embedding surface consumed by external collaborators:
//!
//! - [`analyze`] resolves platform references, verifies types, and
//!   annotates each node with an `is_async` flag
//! - [`compile_sync`] / [`compile_async`] lower an analyzed function
//!   literal to an executable closure value with the host's platform
//!   bindings attached; the two paths are disjoint and gated
//! - [`decode_beast2_linked`] reloads a serialized function and
//!   re-compiles it against a fresh platform list
//! - [`invoke_sync`] / [`invoke_async`] call a compiled function value
//!
//! There is no CLI, no environment variable, and no global state; the
//! platform binding map is per-compilation.

pub mod analyzer;
pub mod compile;
pub mod compile_async;
pub mod decode;
pub mod platform;

pub use analyzer::{AExpr, AFunction, AKind, BindingId, analyze};
pub use compile::{CompileError, Control, Scope, compile_sync};
pub use compile_async::compile_async;
pub use decode::{LinkError, decode_beast2_anonymous_linked, decode_beast2_linked};
pub use platform::{PlatformFunction, PlatformImpl, Platforms};

use east_core::{Callable, EastError, Value, ValueFuture};

/// Call a compiled sync function value.
pub fn invoke_sync(function: &Value, args: Vec<Value>) -> Result<Value, EastError> {
    match function {
        Value::Function(data) => match &data.callable {
            Callable::Sync(run) => run(args),
            Callable::Async(_) => Err(EastError::new(
                "async function invoked in a synchronous context",
            )),
            Callable::Unlinked => Err(EastError::new(
                "function was decoded without platforms and cannot be invoked",
            )),
        },
        _ => Err(EastError::new("value is not a function")),
    }
}

/// Call a compiled async function value, yielding a single-threaded
/// deferred.
pub fn invoke_async(function: &Value, args: Vec<Value>) -> ValueFuture {
    match function {
        Value::Function(data) => match &data.callable {
            Callable::Async(run) => run(args),
            Callable::Sync(run) => Box::pin(std::future::ready(run(args))),
            Callable::Unlinked => Box::pin(std::future::ready(Err(EastError::new(
                "function was decoded without platforms and cannot be invoked",
            )))),
        },
        _ => Box::pin(std::future::ready(Err(EastError::new(
            "value is not a function",
        )))),
    }
}
