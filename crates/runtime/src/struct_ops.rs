//! Struct builtins
//!
//! The IR has a struct constructor but no accessor node, so field
//! projection is the kernel's job. `GetField` takes the struct type and
//! the projected field's type as type parameters; the field name arrives
//! as a string operand and is checked against the struct type when the
//! operation runs.

use crate::operands::{string, structure, take};
use crate::registry::{BuiltinDef, ParamKind, TPat, def};
use east_core::{EastError, Type, Value, type_equal};

fn run_get_field(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [value, name] = take::<2>(args)?;
    let fields = structure(&value)?;
    let name = string(&name)?;
    let Type::Struct(field_types) = &type_args[0] else {
        return Err(EastError::new(format!(
            "GetField expects a struct type, got {}",
            type_args[0]
        )));
    };
    let Some(index) = field_types.iter().position(|(n, _)| *n == *name) else {
        return Err(EastError::new(format!(
            "struct {} has no field {name}",
            type_args[0]
        )));
    };
    if !type_equal(&field_types[index].1, &type_args[1]) {
        return Err(EastError::new(format!(
            "struct field {name} has type {}, not {}",
            field_types[index].1, type_args[1]
        )));
    }
    fields
        .get(index)
        .cloned()
        .ok_or_else(|| EastError::new("struct value shorter than its type"))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    defs.push(def(
        "GetField",
        vec![ParamKind::Data, ParamKind::Data],
        vec![TPat::Param(0), TPat::String],
        TPat::Param(1),
        run_get_field,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_field_by_name() {
        let ty = Type::Struct(vec![
            ("a".to_string(), Type::Integer),
            ("b".to_string(), Type::String),
        ]);
        let value = Value::structure(vec![Value::Integer(1), Value::string("x")]);
        let got = run_get_field(
            &[ty.clone(), Type::String],
            vec![value.clone(), Value::string("b")],
        )
        .unwrap();
        match got {
            Value::String(s) => assert_eq!(s.as_ref(), "x"),
            _ => panic!("expected string"),
        }
        let err = run_get_field(&[ty, Type::Integer], vec![value, Value::string("b")]).unwrap_err();
        assert!(err.message.contains("has type String"));
    }
}
