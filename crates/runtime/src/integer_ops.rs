//! Integer builtins
//!
//! Arithmetic wraps on overflow. Division and remainder by zero yield
//! `0` (an explicit result, not a fault), and a negative exponent in
//! `IntegerPow` yields `0`. These totals keep integer arithmetic free of
//! runtime faults.

use crate::operands::{integer, take};
use crate::registry::{BuiltinDef, TPat, def};
use east_core::{EastError, Type, Value};

fn unary(args: Vec<Value>) -> Result<i64, EastError> {
    let [a] = take::<1>(args)?;
    integer(&a)
}

fn binary(args: Vec<Value>) -> Result<(i64, i64), EastError> {
    let [a, b] = take::<2>(args)?;
    Ok((integer(&a)?, integer(&b)?))
}

fn run_add(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Integer(a.wrapping_add(b)))
}

fn run_subtract(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Integer(a.wrapping_sub(b)))
}

fn run_multiply(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Integer(a.wrapping_mul(b)))
}

fn run_divide(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Integer(if b == 0 { 0 } else { a.wrapping_div(b) }))
}

fn run_remainder(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (a, b) = binary(args)?;
    Ok(Value::Integer(if b == 0 { 0 } else { a.wrapping_rem(b) }))
}

fn run_abs(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Integer(unary(args)?.wrapping_abs()))
}

fn run_sign(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Integer(unary(args)?.signum()))
}

/// Floor logarithm of `n` in base `b`; `0` whenever `n <= 0` or `b <= 1`.
fn run_log(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (n, b) = binary(args)?;
    if n <= 0 || b <= 1 {
        return Ok(Value::Integer(0));
    }
    let mut power = n;
    let mut log = 0i64;
    while power >= b {
        power /= b;
        log += 1;
    }
    Ok(Value::Integer(log))
}

fn run_pow(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let (base, exp) = binary(args)?;
    if exp < 0 {
        return Ok(Value::Integer(0));
    }
    let mut result = 1i64;
    let mut base = base;
    let mut exp = exp as u64;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    Ok(Value::Integer(result))
}

fn run_to_float(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    Ok(Value::Float(unary(args)? as f64))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    let binary_defs: [(&'static str, crate::registry::Run); 7] = [
        ("IntegerAdd", run_add),
        ("IntegerSubtract", run_subtract),
        ("IntegerMultiply", run_multiply),
        ("IntegerDivide", run_divide),
        ("IntegerRemainder", run_remainder),
        ("IntegerLog", run_log),
        ("IntegerPow", run_pow),
    ];
    for (name, run) in binary_defs {
        defs.push(def(
            name,
            vec![],
            vec![TPat::Integer, TPat::Integer],
            TPat::Integer,
            run,
        ));
    }
    defs.push(def(
        "IntegerAbs",
        vec![],
        vec![TPat::Integer],
        TPat::Integer,
        run_abs,
    ));
    defs.push(def(
        "IntegerSign",
        vec![],
        vec![TPat::Integer],
        TPat::Integer,
        run_sign,
    ));
    defs.push(def(
        "IntegerToFloat",
        vec![],
        vec![TPat::Integer],
        TPat::Float,
        run_to_float,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_by_zero_yields_zero() {
        assert!(matches!(
            run_divide(&[], vec![Value::Integer(7), Value::Integer(0)]).unwrap(),
            Value::Integer(0)
        ));
        assert!(matches!(
            run_remainder(&[], vec![Value::Integer(7), Value::Integer(0)]).unwrap(),
            Value::Integer(0)
        ));
    }

    #[test]
    fn test_negative_exponent_yields_zero() {
        assert!(matches!(
            run_pow(&[], vec![Value::Integer(2), Value::Integer(-1)]).unwrap(),
            Value::Integer(0)
        ));
        assert!(matches!(
            run_pow(&[], vec![Value::Integer(2), Value::Integer(10)]).unwrap(),
            Value::Integer(1024)
        ));
    }

    #[test]
    fn test_log_floors() {
        assert!(matches!(
            run_log(&[], vec![Value::Integer(999), Value::Integer(10)]).unwrap(),
            Value::Integer(2)
        ));
        assert!(matches!(
            run_log(&[], vec![Value::Integer(-5), Value::Integer(10)]).unwrap(),
            Value::Integer(0)
        ));
    }
}
