//! Operand destructuring helpers for builtin implementations
//!
//! The analyzer guarantees operand arity and types before a builtin ever
//! runs, so a shape mismatch here is an engine bug; it still surfaces as
//! an `EastError` rather than a panic.

use east_core::value::{ArrayData, DictData, RefData, SetData};
use east_core::{Callable, EastError, FunctionData, Value};
use std::rc::Rc;

pub fn take<const N: usize>(args: Vec<Value>) -> Result<[Value; N], EastError> {
    args.try_into()
        .map_err(|_| EastError::new("builtin operand arity mismatch"))
}

fn unexpected(what: &str, value: &Value) -> EastError {
    EastError::new(format!("builtin expected {what}, got {value:?}"))
}

pub fn boolean(value: &Value) -> Result<bool, EastError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        other => Err(unexpected("a boolean", other)),
    }
}

pub fn integer(value: &Value) -> Result<i64, EastError> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(unexpected("an integer", other)),
    }
}

pub fn float(value: &Value) -> Result<f64, EastError> {
    match value {
        Value::Float(x) => Ok(*x),
        other => Err(unexpected("a float", other)),
    }
}

pub fn string(value: &Value) -> Result<Rc<str>, EastError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(unexpected("a string", other)),
    }
}

pub fn datetime(value: &Value) -> Result<i64, EastError> {
    match value {
        Value::DateTime(ms) => Ok(*ms),
        other => Err(unexpected("a datetime", other)),
    }
}

pub fn blob(value: &Value) -> Result<Rc<[u8]>, EastError> {
    match value {
        Value::Blob(bytes) => Ok(bytes.clone()),
        other => Err(unexpected("a blob", other)),
    }
}

pub fn array(value: &Value) -> Result<Rc<ArrayData>, EastError> {
    match value {
        Value::Array(data) => Ok(data.clone()),
        other => Err(unexpected("an array", other)),
    }
}

pub fn set(value: &Value) -> Result<Rc<SetData>, EastError> {
    match value {
        Value::Set(data) => Ok(data.clone()),
        other => Err(unexpected("a set", other)),
    }
}

pub fn dict(value: &Value) -> Result<Rc<DictData>, EastError> {
    match value {
        Value::Dict(data) => Ok(data.clone()),
        other => Err(unexpected("a dict", other)),
    }
}

pub fn reference(value: &Value) -> Result<Rc<RefData>, EastError> {
    match value {
        Value::Ref(data) => Ok(data.clone()),
        other => Err(unexpected("a ref", other)),
    }
}

pub fn structure(value: &Value) -> Result<Rc<[Value]>, EastError> {
    match value {
        Value::Struct(fields) => Ok(fields.clone()),
        other => Err(unexpected("a struct", other)),
    }
}

pub fn function(value: &Value) -> Result<Rc<FunctionData>, EastError> {
    match value {
        Value::Function(data) => Ok(data.clone()),
        other => Err(unexpected("a function", other)),
    }
}

/// Invoke a sync function value. Builtins only ever take sync callables;
/// async functions cannot flow here because their types are distinct.
pub fn call_sync(f: &FunctionData, args: Vec<Value>) -> Result<Value, EastError> {
    match &f.callable {
        Callable::Sync(run) => run(args),
        Callable::Async(_) => Err(EastError::new(
            "async function invoked in a synchronous context",
        )),
        Callable::Unlinked => Err(EastError::new(
            "function was decoded without platforms and cannot be invoked",
        )),
    }
}
