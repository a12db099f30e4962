//! Boolean builtins
//!
//! All four are non-short-circuit; short-circuiting is expressed with
//! `If` at the IR level.

use crate::operands::{boolean, take};
use crate::registry::{BuiltinDef, TPat, def};
use east_core::{EastError, Type, Value};

fn run_not(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    Ok(Value::Boolean(!boolean(&a)?))
}

fn run_and(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, b] = take::<2>(args)?;
    Ok(Value::Boolean(boolean(&a)? && boolean(&b)?))
}

fn run_or(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, b] = take::<2>(args)?;
    Ok(Value::Boolean(boolean(&a)? || boolean(&b)?))
}

fn run_xor(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, b] = take::<2>(args)?;
    Ok(Value::Boolean(boolean(&a)? ^ boolean(&b)?))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    defs.push(def(
        "BooleanNot",
        vec![],
        vec![TPat::Boolean],
        TPat::Boolean,
        run_not,
    ));
    defs.push(def(
        "BooleanAnd",
        vec![],
        vec![TPat::Boolean, TPat::Boolean],
        TPat::Boolean,
        run_and,
    ));
    defs.push(def(
        "BooleanOr",
        vec![],
        vec![TPat::Boolean, TPat::Boolean],
        TPat::Boolean,
        run_or,
    ));
    defs.push(def(
        "BooleanXor",
        vec![],
        vec![TPat::Boolean, TPat::Boolean],
        TPat::Boolean,
        run_xor,
    ));
}
