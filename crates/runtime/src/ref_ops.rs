//! Ref builtins

use crate::operands::{call_sync, function, reference, take};
use crate::registry::{BuiltinDef, ParamKind, TPat, def};
use east_core::{EastError, Type, Value};

fn run_get(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [r] = take::<1>(args)?;
    let cell = reference(&r)?;
    let value = cell.value.borrow().clone();
    Ok(value)
}

fn run_update(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [r, value] = take::<2>(args)?;
    let cell = reference(&r)?;
    *cell.value.borrow_mut() = value;
    Ok(Value::Null)
}

/// `ref := combiner(current, other)`.
fn run_merge(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [r, other, combiner] = take::<3>(args)?;
    let cell = reference(&r)?;
    let combiner = function(&combiner)?;
    let current = cell.value.borrow().clone();
    let merged = call_sync(&combiner, vec![current, other])?;
    *cell.value.borrow_mut() = merged;
    Ok(Value::Null)
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    defs.push(def(
        "RefGet",
        vec![ParamKind::Data],
        vec![TPat::Ref(Box::new(TPat::Param(0)))],
        TPat::Param(0),
        run_get,
    ));
    defs.push(def(
        "RefUpdate",
        vec![ParamKind::Data],
        vec![TPat::Ref(Box::new(TPat::Param(0))), TPat::Param(0)],
        TPat::Null,
        run_update,
    ));
    defs.push(def(
        "RefMerge",
        vec![ParamKind::Data],
        vec![
            TPat::Ref(Box::new(TPat::Param(0))),
            TPat::Param(0),
            TPat::Func(
                vec![TPat::Param(0), TPat::Param(0)],
                Box::new(TPat::Param(0)),
            ),
        ],
        TPat::Null,
        run_merge,
    ));
}
