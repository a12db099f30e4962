//! Blob builtins
//!
//! Byte access, text decoding, and the bridge to the BEAST2 codec.
//! Codec failures raised from inside a program surface as catchable
//! runtime faults; the host-level codec API keeps its own error type.

use crate::operands::{blob, integer, take};
use crate::registry::{BuiltinDef, ParamKind, TPat, def};
use east_core::{EastError, Type, Value};
use east_codec::{decode_beast2_for, encode_beast2};

fn run_size(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [b] = take::<1>(args)?;
    Ok(Value::Integer(blob(&b)?.len() as i64))
}

fn run_get_uint8(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [b, index] = take::<2>(args)?;
    let bytes = blob(&b)?;
    let index = integer(&index)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| bytes.get(i).copied())
        .map(|byte| Value::Integer(i64::from(byte)))
        .ok_or_else(|| {
            EastError::new(format!(
                "Blob index {index} out of bounds (size {})",
                bytes.len()
            ))
        })
}

fn run_decode_utf8(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [b] = take::<1>(args)?;
    let bytes = blob(&b)?;
    std::str::from_utf8(&bytes)
        .map(Value::string)
        .map_err(|e| EastError::new(format!("invalid UTF-8: {e}")))
}

fn run_decode_utf16(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [b] = take::<1>(args)?;
    let bytes = blob(&b)?;
    if bytes.len() % 2 != 0 {
        return Err(EastError::new("UTF-16 blob has odd length"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map(Value::string)
        .map_err(|e| EastError::new(format!("invalid UTF-16: {e}")))
}

fn run_encode_beast2(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [value] = take::<1>(args)?;
    encode_beast2(&type_args[0], &value)
        .map(Value::blob)
        .map_err(|e| EastError::new(e.to_string()))
}

fn run_decode_beast2(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [b] = take::<1>(args)?;
    decode_beast2_for(&type_args[0], &blob(&b)?).map_err(|e| EastError::new(e.to_string()))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    defs.push(def("BlobSize", vec![], vec![TPat::Blob], TPat::Integer, run_size));
    defs.push(def(
        "BlobGetUint8",
        vec![],
        vec![TPat::Blob, TPat::Integer],
        TPat::Integer,
        run_get_uint8,
    ));
    defs.push(def(
        "BlobDecodeUtf8",
        vec![],
        vec![TPat::Blob],
        TPat::String,
        run_decode_utf8,
    ));
    defs.push(def(
        "BlobDecodeUtf16",
        vec![],
        vec![TPat::Blob],
        TPat::String,
        run_decode_utf16,
    ));
    defs.push(def(
        "EncodeBeast2",
        vec![ParamKind::Data],
        vec![TPat::Param(0)],
        TPat::Blob,
        run_encode_beast2,
    ));
    defs.push(def(
        "DecodeBeast2",
        vec![ParamKind::Data],
        vec![TPat::Blob],
        TPat::Param(0),
        run_decode_beast2,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beast2_bridge_round_trip() {
        let ty = Type::Array(Box::new(Type::Integer));
        let value = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        let encoded = run_encode_beast2(std::slice::from_ref(&ty), vec![value.clone()]).unwrap();
        let decoded = run_decode_beast2(&[ty], vec![encoded]).unwrap();
        assert!(east_core::values_equal(&value, &decoded));
    }

    #[test]
    fn test_get_uint8_bounds() {
        let b = Value::blob(vec![9]);
        assert!(matches!(
            run_get_uint8(&[], vec![b.clone(), Value::Integer(0)]).unwrap(),
            Value::Integer(9)
        ));
        let err = run_get_uint8(&[], vec![b, Value::Integer(1)]).unwrap_err();
        assert!(err.message.contains("out of bounds"));
    }
}
