//! Type schema encoding
//!
//! The schema is a variant-per-kind node, recursively, using the same
//! primitive encodings as values: varint tags, length-prefixed strings.
//! Decoding routes through the checked `Type` constructors so a malformed
//! schema (duplicate struct fields, mutable set keys, dangling recursive
//! back-references) is rejected at the boundary.

use crate::error::CodecError;
use crate::reader::Reader;
use crate::varint::write_uvarint;
use east_core::Type;
use std::collections::BTreeSet;

const TAG_NEVER: u64 = 0;
const TAG_NULL: u64 = 1;
const TAG_BOOLEAN: u64 = 2;
const TAG_INTEGER: u64 = 3;
const TAG_FLOAT: u64 = 4;
const TAG_STRING: u64 = 5;
const TAG_DATETIME: u64 = 6;
const TAG_BLOB: u64 = 7;
const TAG_ARRAY: u64 = 8;
const TAG_SET: u64 = 9;
const TAG_DICT: u64 = 10;
const TAG_REF: u64 = 11;
const TAG_STRUCT: u64 = 12;
const TAG_VARIANT: u64 = 13;
const TAG_RECURSIVE: u64 = 14;
const TAG_RECURSIVE_REF: u64 = 15;
const TAG_FUNCTION: u64 = 16;
const TAG_ASYNC_FUNCTION: u64 = 17;

pub fn write_string(buf: &mut Vec<u8>, text: &str) {
    write_uvarint(buf, text.len() as u64);
    buf.extend_from_slice(text.as_bytes());
}

pub fn encode_schema(buf: &mut Vec<u8>, ty: &Type) {
    match ty {
        Type::Never => write_uvarint(buf, TAG_NEVER),
        Type::Null => write_uvarint(buf, TAG_NULL),
        Type::Boolean => write_uvarint(buf, TAG_BOOLEAN),
        Type::Integer => write_uvarint(buf, TAG_INTEGER),
        Type::Float => write_uvarint(buf, TAG_FLOAT),
        Type::String => write_uvarint(buf, TAG_STRING),
        Type::DateTime => write_uvarint(buf, TAG_DATETIME),
        Type::Blob => write_uvarint(buf, TAG_BLOB),
        Type::Array(elem) => {
            write_uvarint(buf, TAG_ARRAY);
            encode_schema(buf, elem);
        }
        Type::Set(key) => {
            write_uvarint(buf, TAG_SET);
            encode_schema(buf, key);
        }
        Type::Dict(key, value) => {
            write_uvarint(buf, TAG_DICT);
            encode_schema(buf, key);
            encode_schema(buf, value);
        }
        Type::Ref(inner) => {
            write_uvarint(buf, TAG_REF);
            encode_schema(buf, inner);
        }
        Type::Struct(fields) => {
            write_uvarint(buf, TAG_STRUCT);
            write_uvarint(buf, fields.len() as u64);
            for (name, field) in fields {
                write_string(buf, name);
                encode_schema(buf, field);
            }
        }
        Type::Variant(cases) => {
            write_uvarint(buf, TAG_VARIANT);
            write_uvarint(buf, cases.len() as u64);
            for (name, case) in cases {
                write_string(buf, name);
                encode_schema(buf, case);
            }
        }
        Type::Recursive(inner) => {
            write_uvarint(buf, TAG_RECURSIVE);
            encode_schema(buf, inner);
        }
        Type::RecursiveRef(depth) => {
            write_uvarint(buf, TAG_RECURSIVE_REF);
            write_uvarint(buf, u64::from(*depth));
        }
        Type::Function {
            inputs,
            output,
            platforms,
        } => {
            write_uvarint(buf, TAG_FUNCTION);
            encode_function(buf, inputs, output, platforms);
        }
        Type::AsyncFunction {
            inputs,
            output,
            platforms,
        } => {
            write_uvarint(buf, TAG_ASYNC_FUNCTION);
            encode_function(buf, inputs, output, platforms);
        }
    }
}

fn encode_function(
    buf: &mut Vec<u8>,
    inputs: &[Type],
    output: &Type,
    platforms: &BTreeSet<String>,
) {
    write_uvarint(buf, inputs.len() as u64);
    for input in inputs {
        encode_schema(buf, input);
    }
    encode_schema(buf, output);
    write_uvarint(buf, platforms.len() as u64);
    for name in platforms {
        write_string(buf, name);
    }
}

pub fn decode_schema(reader: &mut Reader<'_>) -> Result<Type, CodecError> {
    decode_at(reader, 0)
}

fn checked(result: Result<Type, east_core::TypeError>) -> Result<Type, CodecError> {
    result.map_err(|e| CodecError::Malformed(e.to_string()))
}

fn decode_at(reader: &mut Reader<'_>, depth: u32) -> Result<Type, CodecError> {
    let tag = reader.read_uvarint()?;
    match tag {
        TAG_NEVER => Ok(Type::Never),
        TAG_NULL => Ok(Type::Null),
        TAG_BOOLEAN => Ok(Type::Boolean),
        TAG_INTEGER => Ok(Type::Integer),
        TAG_FLOAT => Ok(Type::Float),
        TAG_STRING => Ok(Type::String),
        TAG_DATETIME => Ok(Type::DateTime),
        TAG_BLOB => Ok(Type::Blob),
        TAG_ARRAY => checked(Type::array(decode_at(reader, depth)?)),
        TAG_SET => checked(Type::set(decode_at(reader, depth)?)),
        TAG_DICT => {
            let key = decode_at(reader, depth)?;
            let value = decode_at(reader, depth)?;
            checked(Type::dict(key, value))
        }
        TAG_REF => checked(Type::reference(decode_at(reader, depth)?)),
        TAG_STRUCT => checked(Type::structure(decode_fields(reader, depth)?)),
        TAG_VARIANT => {
            let cases = decode_fields(reader, depth)?;
            // The writer emits cases in canonical sorted order; insist on
            // it so equal types encode byte-exactly.
            if !cases.windows(2).all(|pair| pair[0].0 < pair[1].0) {
                return Err(CodecError::Malformed(
                    "variant cases are not in canonical order".into(),
                ));
            }
            checked(Type::variant(cases))
        }
        TAG_RECURSIVE => {
            let inner = decode_at(reader, depth + 1)?;
            // The inner body was validated against `depth + 1`; rewrap
            // without re-walking.
            Ok(Type::Recursive(std::rc::Rc::new(inner)))
        }
        TAG_RECURSIVE_REF => {
            let d = reader.read_uvarint()?;
            if d == 0 || d > u64::from(depth) {
                return Err(CodecError::Malformed(format!(
                    "recursive back-reference {d} has no enclosing Recursive"
                )));
            }
            Ok(Type::RecursiveRef(d as u32))
        }
        TAG_FUNCTION => {
            let (inputs, output, platforms) = decode_function(reader, depth)?;
            Ok(Type::function(inputs, output, platforms))
        }
        TAG_ASYNC_FUNCTION => {
            let (inputs, output, platforms) = decode_function(reader, depth)?;
            Ok(Type::async_function(inputs, output, platforms))
        }
        other => Err(CodecError::Malformed(format!("unknown type tag {other}"))),
    }
}

fn decode_fields(
    reader: &mut Reader<'_>,
    depth: u32,
) -> Result<Vec<(String, Type)>, CodecError> {
    let count = reader.read_uvarint()?;
    if count > reader.remaining() as u64 {
        return Err(CodecError::ShortRead);
    }
    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader.read_string()?;
        let ty = decode_at(reader, depth)?;
        fields.push((name, ty));
    }
    Ok(fields)
}

#[allow(clippy::type_complexity)]
fn decode_function(
    reader: &mut Reader<'_>,
    depth: u32,
) -> Result<(Vec<Type>, Type, BTreeSet<String>), CodecError> {
    let input_count = reader.read_uvarint()?;
    if input_count > reader.remaining() as u64 {
        return Err(CodecError::ShortRead);
    }
    let mut inputs = Vec::with_capacity(input_count as usize);
    for _ in 0..input_count {
        inputs.push(decode_at(reader, depth)?);
    }
    let output = decode_at(reader, depth)?;
    let platform_count = reader.read_uvarint()?;
    if platform_count > reader.remaining() as u64 {
        return Err(CodecError::ShortRead);
    }
    let mut platforms = BTreeSet::new();
    for _ in 0..platform_count {
        platforms.insert(reader.read_string()?);
    }
    Ok((inputs, output, platforms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use east_core::type_equal;

    fn round_trip(ty: &Type) {
        let mut buf = Vec::new();
        encode_schema(&mut buf, ty);
        let mut reader = Reader::new(&buf);
        let back = decode_schema(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert!(type_equal(ty, &back), "{ty}");
    }

    #[test]
    fn test_schema_round_trips() {
        round_trip(&Type::Never);
        round_trip(&Type::Dict(Box::new(Type::String), Box::new(Type::Float)));
        round_trip(&Type::Struct(vec![
            ("a".to_string(), Type::Integer),
            ("b".to_string(), Type::Array(Box::new(Type::Blob))),
        ]));
        round_trip(
            &Type::recursive(Type::Variant(vec![
                ("leaf".to_string(), Type::Null),
                (
                    "node".to_string(),
                    Type::Array(Box::new(Type::RecursiveRef(1))),
                ),
            ]))
            .unwrap(),
        );
        round_trip(&Type::function(
            vec![Type::Integer],
            Type::Integer,
            ["double".to_string()].into_iter().collect(),
        ));
    }

    #[test]
    fn test_dangling_backref_rejected() {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, 15);
        write_uvarint(&mut buf, 1);
        assert!(decode_schema(&mut Reader::new(&buf)).is_err());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, 99);
        assert!(decode_schema(&mut Reader::new(&buf)).is_err());
    }
}
