//! BEAST2: the self-describing binary form of East values
//!
//! A stream is `magic(8) | type_schema | value`. The magic is
//! `0x89 "East" CR LF 0x01`: an invalid-UTF-8 lead byte, the ASCII tag,
//! a CRLF corruption tripwire, and the version byte.
//!
//! Decoding enforces full consumption and validates the schema through
//! the checked type constructors. Mutable containers round-trip with
//! their alias graph intact (see [`value_codec`]); free functions embed
//! their IR and come back with an unlinked callable that `east-compiler`
//! can re-analyze and re-compile against a fresh platform list.

pub mod error;
pub mod ir_codec;
pub mod reader;
pub mod schema;
pub mod value_codec;
pub mod varint;

pub use error::CodecError;
pub use value_codec::CANONICAL_NAN_BITS;

use east_core::{Type, Value, is_value_of, type_equal};
use reader::Reader;
use tracing::debug;
use value_codec::{ValueDecoder, ValueEncoder};

/// `0x89 'E' 'a' 's' 't' 0x0D 0x0A 0x01`.
pub const MAGIC: [u8; 8] = [0x89, b'E', b'a', b's', b't', 0x0D, 0x0A, 0x01];

/// Encode `value` as a self-describing BEAST2 stream for `ty`.
///
/// Equal types produce byte-identical encodings of the same value; any
/// NaN is written as the canonical quiet NaN.
pub fn encode_beast2(ty: &Type, value: &Value) -> Result<Vec<u8>, CodecError> {
    if !is_value_of(value, ty) {
        return Err(CodecError::TypeMismatch(format!(
            "value is not of type {ty}"
        )));
    }
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    schema::encode_schema(&mut buf, ty);
    ValueEncoder::new(&mut buf).encode(ty, value)?;
    debug!(bytes = buf.len(), ty = %ty, "beast2 encode");
    Ok(buf)
}

/// Decode a self-describing stream into its embedded type and value.
pub fn decode_beast2(bytes: &[u8]) -> Result<(Type, Value), CodecError> {
    let mut reader = header(bytes)?;
    let ty = schema::decode_schema(&mut reader)?;
    let value = ValueDecoder::new(&mut reader).decode(&ty)?;
    if reader.remaining() != 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }
    debug!(ty = %ty, "beast2 decode");
    Ok((ty, value))
}

/// Decode a stream whose embedded schema must be type-equal to
/// `expected`.
pub fn decode_beast2_for(expected: &Type, bytes: &[u8]) -> Result<Value, CodecError> {
    let mut reader = header(bytes)?;
    let ty = schema::decode_schema(&mut reader)?;
    if !type_equal(&ty, expected) {
        return Err(CodecError::TypeMismatch(format!(
            "expected {expected}, stream carries {ty}"
        )));
    }
    let value = ValueDecoder::new(&mut reader).decode(&ty)?;
    if reader.remaining() != 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }
    Ok(value)
}

fn header(bytes: &[u8]) -> Result<Reader<'_>, CodecError> {
    let mut reader = Reader::new(bytes);
    let magic = reader.read_exact(8).map_err(|_| CodecError::BadMagic)?;
    if magic[..7] != MAGIC[..7] {
        return Err(CodecError::BadMagic);
    }
    if magic[7] != MAGIC[7] {
        return Err(CodecError::BadVersion(magic[7]));
    }
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use east_core::value::{cmp_values, is_identical};
    use std::cmp::Ordering;

    fn round_trip(ty: &Type, value: &Value) -> Value {
        let bytes = encode_beast2(ty, value).unwrap();
        let (decoded_ty, decoded) = decode_beast2(&bytes).unwrap();
        assert!(type_equal(ty, &decoded_ty));
        assert_eq!(cmp_values(value, &decoded), Ordering::Equal);
        let again = decode_beast2_for(ty, &bytes).unwrap();
        assert_eq!(cmp_values(value, &again), Ordering::Equal);
        decoded
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(&Type::Null, &Value::Null);
        round_trip(&Type::Boolean, &Value::Boolean(true));
        round_trip(&Type::Integer, &Value::Integer(i64::MIN));
        round_trip(&Type::Float, &Value::Float(-0.0));
        round_trip(&Type::String, &Value::string("héllo"));
        round_trip(&Type::DateTime, &Value::DateTime(-86_400_000));
        round_trip(&Type::Blob, &Value::blob(vec![1, 2, 3]));
    }

    #[test]
    fn test_nan_canonicalized_on_write() {
        let weird = f64::from_bits(0x7FF8_0000_0000_0001);
        let bytes = encode_beast2(&Type::Float, &Value::Float(weird)).unwrap();
        let (_, decoded) = decode_beast2(&bytes).unwrap();
        match decoded {
            Value::Float(x) => assert_eq!(x.to_bits(), CANONICAL_NAN_BITS),
            _ => panic!("expected float"),
        }
    }

    #[test]
    fn test_non_canonical_nan_rejected_on_read() {
        let bytes = encode_beast2(&Type::Float, &Value::Float(1.0)).unwrap();
        let mut corrupted = bytes.clone();
        let len = corrupted.len();
        corrupted[len - 8..].copy_from_slice(&0x7FF8_0000_0000_0001u64.to_le_bytes());
        assert!(matches!(
            decode_beast2(&corrupted),
            Err(CodecError::NonCanonicalNan(_))
        ));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let bytes = encode_beast2(&Type::Null, &Value::Null).unwrap();
        let mut wrong = bytes.clone();
        wrong[0] = 0x88;
        assert!(matches!(decode_beast2(&wrong), Err(CodecError::BadMagic)));
        let mut version = bytes.clone();
        version[7] = 2;
        assert!(matches!(
            decode_beast2(&version),
            Err(CodecError::BadVersion(2))
        ));
        assert!(matches!(decode_beast2(&bytes[..4]), Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_beast2(&Type::Integer, &Value::Integer(1)).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_beast2(&bytes),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_alias_graph_survives() {
        // s = (field1=a, field2=a) with a single shared array.
        let shared = Value::array(vec![Value::Integer(1)]);
        let ty = Type::Struct(vec![
            (
                "field1".to_string(),
                Type::Array(Box::new(Type::Integer)),
            ),
            (
                "field2".to_string(),
                Type::Array(Box::new(Type::Integer)),
            ),
        ]);
        let value = Value::structure(vec![shared.clone(), shared.clone()]);
        let decoded = round_trip(&ty, &value);
        let Value::Struct(fields) = decoded else {
            panic!("expected struct");
        };
        assert!(is_identical(&fields[0], &fields[1]));
        // Mutating through one alias is visible through the other.
        if let Value::Array(data) = &fields[0] {
            data.items.borrow_mut().push(Value::Integer(2));
        }
        if let Value::Array(data) = &fields[1] {
            assert_eq!(data.items.borrow().len(), 2);
        }
    }

    #[test]
    fn test_cyclic_value_survives() {
        let ty = Type::recursive(Type::Array(Box::new(Type::RecursiveRef(1)))).unwrap();
        let arr = Value::array(vec![]);
        if let Value::Array(data) = &arr {
            data.items.borrow_mut().push(arr.clone());
        }
        let bytes = encode_beast2(&ty, &arr).unwrap();
        let (_, decoded) = decode_beast2(&bytes).unwrap();
        let Value::Array(data) = &decoded else {
            panic!("expected array");
        };
        let items = data.items.borrow();
        assert!(is_identical(&items[0], &decoded));
    }

    #[test]
    fn test_equal_types_encode_byte_exactly() {
        let t1 = Type::variant(vec![
            ("b".to_string(), Type::Integer),
            ("a".to_string(), Type::Null),
        ])
        .unwrap();
        let t2 = Type::variant(vec![
            ("a".to_string(), Type::Null),
            ("b".to_string(), Type::Integer),
        ])
        .unwrap();
        assert!(type_equal(&t1, &t2));
        let value = Value::variant("b", Value::Integer(9));
        assert_eq!(
            encode_beast2(&t1, &value).unwrap(),
            encode_beast2(&t2, &value).unwrap()
        );
    }

    #[test]
    fn test_variant_tag_out_of_range() {
        let ty = Type::variant(vec![("only".to_string(), Type::Null)]).unwrap();
        let value = Value::variant("only", Value::Null);
        let mut bytes = encode_beast2(&ty, &value).unwrap();
        let len = bytes.len();
        bytes[len - 1] = 7;
        assert!(matches!(
            decode_beast2(&bytes),
            Err(CodecError::VariantTagOutOfRange(7))
        ));
    }
}
