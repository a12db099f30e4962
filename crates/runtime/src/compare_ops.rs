//! Equality and ordering builtins
//!
//! `Is` is identity: containers compare equal only when aliased. The
//! remaining comparisons use the canonical structural order, under which
//! `nan` equals itself and sorts above `+inf`, and `-0.0` equals `+0.0`.

use crate::operands::take;
use crate::registry::{BuiltinDef, ParamKind, TPat, def};
use east_core::value::{cmp_values, is_identical};
use east_core::{EastError, Type, Value};
use std::cmp::Ordering;

fn binary(run: crate::registry::Run) -> (Vec<TPat>, TPat, crate::registry::Run) {
    (vec![TPat::Param(0), TPat::Param(0)], TPat::Boolean, run)
}

fn ordered(args: Vec<Value>) -> Result<Ordering, EastError> {
    let [a, b] = take::<2>(args)?;
    Ok(cmp_values(&a, &b))
}

fn run_is(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, b] = take::<2>(args)?;
    Ok(Value::Boolean(is_identical(&a, &b)))
}

fn run_equal(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Boolean(ordered(args)? == Ordering::Equal))
}

fn run_not_equal(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Boolean(ordered(args)? != Ordering::Equal))
}

fn run_less(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Boolean(ordered(args)? == Ordering::Less))
}

fn run_less_equal(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Boolean(ordered(args)? != Ordering::Greater))
}

fn run_greater(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Boolean(ordered(args)? == Ordering::Greater))
}

fn run_greater_equal(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Boolean(ordered(args)? != Ordering::Less))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    let entries: [(&'static str, ParamKind, crate::registry::Run); 7] = [
        ("Is", ParamKind::Any, run_is),
        ("Equal", ParamKind::Data, run_equal),
        ("NotEqual", ParamKind::Data, run_not_equal),
        ("Less", ParamKind::Data, run_less),
        ("LessEqual", ParamKind::Data, run_less_equal),
        ("Greater", ParamKind::Data, run_greater),
        ("GreaterEqual", ParamKind::Data, run_greater_equal),
    ];
    for (name, kind, run) in entries {
        let (inputs, output, run) = binary(run);
        defs.push(def(name, vec![kind], inputs, output, run));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_on_aliases() {
        let a = Value::array(vec![Value::Integer(1)]);
        let same = run_is(&[], vec![a.clone(), a.clone()]).unwrap();
        assert!(matches!(same, Value::Boolean(true)));
        let other = Value::array(vec![Value::Integer(1)]);
        let diff = run_is(&[], vec![a, other]).unwrap();
        assert!(matches!(diff, Value::Boolean(false)));
    }

    #[test]
    fn test_order_on_strings() {
        let less = run_less(&[], vec![Value::string("a"), Value::string("b")]).unwrap();
        assert!(matches!(less, Value::Boolean(true)));
    }
}
