//! Float builtins
//!
//! IEEE-754 binary64 semantics throughout; no operation faults. The
//! codec, not the kernel, is responsible for NaN canonicalization.

use crate::operands::{float, take};
use crate::registry::{BuiltinDef, TPat, def};
use east_core::{EastError, Type, Value};

fn unary(args: Vec<Value>) -> Result<f64, EastError> {
    let [a] = take::<1>(args)?;
    float(&a)
}

fn binary(args: Vec<Value>) -> Result<(f64, f64), EastError> {
    let [a, b] = take::<2>(args)?;
    Ok((float(&a)?, float(&b)?))
}

fn run_add(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Float(a + b))
}

fn run_subtract(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Float(a - b))
}

fn run_multiply(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Float(a * b))
}

fn run_divide(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Float(a / b))
}

fn run_pow(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Float(a.powf(b)))
}

fn run_abs(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)?.abs()))
}

fn run_sqrt(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)?.sqrt()))
}

fn run_exp(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)?.exp()))
}

fn run_log(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)?.ln()))
}

fn run_sin(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)?.sin()))
}

fn run_cos(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)?.cos()))
}

fn run_tan(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)?.tan()))
}

/// Truncate toward zero; NaN maps to `0` and out-of-range values clamp.
fn run_to_integer(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let x = unary(args)?;
    Ok(Value::Integer(if x.is_nan() { 0 } else { x.trunc() as i64 }))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    let binary_defs: [(&'static str, crate::registry::Run); 5] = [
        ("FloatAdd", run_add),
        ("FloatSubtract", run_subtract),
        ("FloatMultiply", run_multiply),
        ("FloatDivide", run_divide),
        ("FloatPow", run_pow),
    ];
    for (name, run) in binary_defs {
        defs.push(def(
            name,
            vec![],
            vec![TPat::Float, TPat::Float],
            TPat::Float,
            run,
        ));
    }
    let unary_defs: [(&'static str, crate::registry::Run); 7] = [
        ("FloatAbs", run_abs),
        ("FloatSqrt", run_sqrt),
        ("FloatExp", run_exp),
        ("FloatLog", run_log),
        ("FloatSin", run_sin),
        ("FloatCos", run_cos),
        ("FloatTan", run_tan),
    ];
    for (name, run) in unary_defs {
        defs.push(def(name, vec![], vec![TPat::Float], TPat::Float, run));
    }
    defs.push(def(
        "FloatToInteger",
        vec![],
        vec![TPat::Float],
        TPat::Integer,
        run_to_integer,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_integer_truncates_and_clamps() {
        assert!(matches!(
            run_to_integer(&[], vec![Value::Float(-2.9)]).unwrap(),
            Value::Integer(-2)
        ));
        assert!(matches!(
            run_to_integer(&[], vec![Value::Float(f64::NAN)]).unwrap(),
            Value::Integer(0)
        ));
        assert!(matches!(
            run_to_integer(&[], vec![Value::Float(f64::INFINITY)]).unwrap(),
            Value::Integer(i64::MAX)
        ));
    }
}
