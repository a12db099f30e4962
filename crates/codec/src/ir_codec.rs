//! IR embedding for serialized functions
//!
//! Each node is a varint kind tag, an optional source location, and a
//! kind-specific payload. Embedded types use the schema encoding; literal
//! values use the standard value encoding with a fresh backreference
//! scope per literal.

use crate::error::CodecError;
use crate::reader::Reader;
use crate::schema::{decode_schema, encode_schema, write_string};
use crate::value_codec::{ValueDecoder, ValueEncoder};
use crate::varint::write_uvarint;
use east_core::{Expr, ExprKind, Location, MatchArm, Type};
use std::rc::Rc;

const TAG_VALUE: u64 = 0;
const TAG_BLOCK: u64 = 1;
const TAG_LET: u64 = 2;
const TAG_ASSIGN: u64 = 3;
const TAG_IF: u64 = 4;
const TAG_WHILE: u64 = 5;
const TAG_FOR: u64 = 6;
const TAG_RETURN: u64 = 7;
const TAG_BREAK: u64 = 8;
const TAG_CONTINUE: u64 = 9;
const TAG_ERROR: u64 = 10;
const TAG_TRY: u64 = 11;
const TAG_MATCH: u64 = 12;
const TAG_CALL: u64 = 13;
const TAG_PLATFORM: u64 = 14;
const TAG_BUILTIN: u64 = 15;
const TAG_FUNCTION: u64 = 16;
const TAG_ASYNC_FUNCTION: u64 = 17;
const TAG_NEW_ARRAY: u64 = 18;
const TAG_NEW_SET: u64 = 19;
const TAG_NEW_DICT: u64 = 20;
const TAG_NEW_REF: u64 = 21;
const TAG_STRUCT: u64 = 22;
const TAG_VARIANT: u64 = 23;
const TAG_WRAP_RECURSIVE: u64 = 24;
const TAG_UNWRAP_RECURSIVE: u64 = 25;
const TAG_REFERENCE: u64 = 26;

fn write_opt_string(buf: &mut Vec<u8>, text: Option<&str>) {
    match text {
        Some(text) => {
            buf.push(1);
            write_string(buf, text);
        }
        None => buf.push(0),
    }
}

fn write_location(buf: &mut Vec<u8>, location: Option<&Location>) {
    match location {
        Some(location) => {
            buf.push(1);
            write_opt_string(buf, location.file.as_deref());
            write_uvarint(buf, u64::from(location.line));
            write_uvarint(buf, u64::from(location.column));
        }
        None => buf.push(0),
    }
}

fn write_exprs(buf: &mut Vec<u8>, exprs: &[Rc<Expr>]) {
    write_uvarint(buf, exprs.len() as u64);
    for expr in exprs {
        encode_expr(buf, expr);
    }
}

pub fn encode_expr(buf: &mut Vec<u8>, expr: &Expr) {
    match &expr.kind {
        ExprKind::Value { ty, value } => {
            write_uvarint(buf, TAG_VALUE);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, ty);
            // Literal encode cannot fail: `Expr::value` validated the
            // value against the declared type at construction.
            let _ = ValueEncoder::new(buf).encode(ty, value);
        }
        ExprKind::Block { statements, result } => {
            write_uvarint(buf, TAG_BLOCK);
            write_location(buf, expr.location.as_ref());
            write_exprs(buf, statements);
            encode_expr(buf, result);
        }
        ExprKind::Let { name, value } => {
            write_uvarint(buf, TAG_LET);
            write_location(buf, expr.location.as_ref());
            write_string(buf, name);
            encode_expr(buf, value);
        }
        ExprKind::Assign { name, value } => {
            write_uvarint(buf, TAG_ASSIGN);
            write_location(buf, expr.location.as_ref());
            write_string(buf, name);
            encode_expr(buf, value);
        }
        ExprKind::If {
            branches,
            otherwise,
        } => {
            write_uvarint(buf, TAG_IF);
            write_location(buf, expr.location.as_ref());
            write_uvarint(buf, branches.len() as u64);
            for (predicate, body) in branches {
                encode_expr(buf, predicate);
                encode_expr(buf, body);
            }
            match otherwise {
                Some(body) => {
                    buf.push(1);
                    encode_expr(buf, body);
                }
                None => buf.push(0),
            }
        }
        ExprKind::While {
            label,
            predicate,
            body,
        } => {
            write_uvarint(buf, TAG_WHILE);
            write_location(buf, expr.location.as_ref());
            write_opt_string(buf, label.as_deref());
            encode_expr(buf, predicate);
            encode_expr(buf, body);
        }
        ExprKind::For {
            label,
            collection,
            item,
            key,
            body,
        } => {
            write_uvarint(buf, TAG_FOR);
            write_location(buf, expr.location.as_ref());
            write_opt_string(buf, label.as_deref());
            write_string(buf, item);
            write_opt_string(buf, key.as_deref());
            encode_expr(buf, collection);
            encode_expr(buf, body);
        }
        ExprKind::Return { value } => {
            write_uvarint(buf, TAG_RETURN);
            write_location(buf, expr.location.as_ref());
            encode_expr(buf, value);
        }
        ExprKind::Break { label } => {
            write_uvarint(buf, TAG_BREAK);
            write_location(buf, expr.location.as_ref());
            write_opt_string(buf, label.as_deref());
        }
        ExprKind::Continue { label } => {
            write_uvarint(buf, TAG_CONTINUE);
            write_location(buf, expr.location.as_ref());
            write_opt_string(buf, label.as_deref());
        }
        ExprKind::Error { message } => {
            write_uvarint(buf, TAG_ERROR);
            write_location(buf, expr.location.as_ref());
            encode_expr(buf, message);
        }
        ExprKind::Try {
            body,
            message,
            stack,
            catch,
        } => {
            write_uvarint(buf, TAG_TRY);
            write_location(buf, expr.location.as_ref());
            encode_expr(buf, body);
            write_string(buf, message);
            write_string(buf, stack);
            encode_expr(buf, catch);
        }
        ExprKind::Match { scrutinee, arms } => {
            write_uvarint(buf, TAG_MATCH);
            write_location(buf, expr.location.as_ref());
            encode_expr(buf, scrutinee);
            write_uvarint(buf, arms.len() as u64);
            for arm in arms {
                write_string(buf, &arm.case);
                write_string(buf, &arm.binding);
                encode_expr(buf, &arm.body);
            }
        }
        ExprKind::Call { callee, arguments } => {
            write_uvarint(buf, TAG_CALL);
            write_location(buf, expr.location.as_ref());
            encode_expr(buf, callee);
            write_exprs(buf, arguments);
        }
        ExprKind::Platform { name, arguments } => {
            write_uvarint(buf, TAG_PLATFORM);
            write_location(buf, expr.location.as_ref());
            write_string(buf, name);
            write_exprs(buf, arguments);
        }
        ExprKind::Builtin {
            name,
            type_args,
            arguments,
        } => {
            write_uvarint(buf, TAG_BUILTIN);
            write_location(buf, expr.location.as_ref());
            write_string(buf, name);
            write_uvarint(buf, type_args.len() as u64);
            for ty in type_args {
                encode_schema(buf, ty);
            }
            write_exprs(buf, arguments);
        }
        ExprKind::Function {
            is_async,
            inputs,
            output,
            captures,
            body,
        } => {
            write_uvarint(buf, if *is_async { TAG_ASYNC_FUNCTION } else { TAG_FUNCTION });
            write_location(buf, expr.location.as_ref());
            write_uvarint(buf, inputs.len() as u64);
            for (name, ty) in inputs {
                write_string(buf, name);
                encode_schema(buf, ty);
            }
            encode_schema(buf, output);
            write_uvarint(buf, captures.len() as u64);
            for name in captures {
                write_string(buf, name);
            }
            encode_expr(buf, body);
        }
        ExprKind::NewArray { element, items } => {
            write_uvarint(buf, TAG_NEW_ARRAY);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, element);
            write_exprs(buf, items);
        }
        ExprKind::NewSet { key, items } => {
            write_uvarint(buf, TAG_NEW_SET);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, key);
            write_exprs(buf, items);
        }
        ExprKind::NewDict { key, value, pairs } => {
            write_uvarint(buf, TAG_NEW_DICT);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, key);
            encode_schema(buf, value);
            write_uvarint(buf, pairs.len() as u64);
            for (k, v) in pairs {
                encode_expr(buf, k);
                encode_expr(buf, v);
            }
        }
        ExprKind::NewRef { inner, value } => {
            write_uvarint(buf, TAG_NEW_REF);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, inner);
            encode_expr(buf, value);
        }
        ExprKind::Struct { ty, fields } => {
            write_uvarint(buf, TAG_STRUCT);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, ty);
            write_exprs(buf, fields);
        }
        ExprKind::Variant { ty, case, value } => {
            write_uvarint(buf, TAG_VARIANT);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, ty);
            write_string(buf, case);
            encode_expr(buf, value);
        }
        ExprKind::WrapRecursive { ty, value } => {
            write_uvarint(buf, TAG_WRAP_RECURSIVE);
            write_location(buf, expr.location.as_ref());
            encode_schema(buf, ty);
            encode_expr(buf, value);
        }
        ExprKind::UnwrapRecursive { value } => {
            write_uvarint(buf, TAG_UNWRAP_RECURSIVE);
            write_location(buf, expr.location.as_ref());
            encode_expr(buf, value);
        }
        ExprKind::Reference { name } => {
            write_uvarint(buf, TAG_REFERENCE);
            write_location(buf, expr.location.as_ref());
            write_string(buf, name);
        }
    }
}

fn read_opt_string(reader: &mut Reader<'_>) -> Result<Option<String>, CodecError> {
    match reader.read_u8()? {
        0 => Ok(None),
        1 => Ok(Some(reader.read_string()?)),
        other => Err(CodecError::Malformed(format!(
            "invalid optional flag {other}"
        ))),
    }
}

fn read_location(reader: &mut Reader<'_>) -> Result<Option<Location>, CodecError> {
    match reader.read_u8()? {
        0 => Ok(None),
        1 => {
            let file = read_opt_string(reader)?;
            let line = reader.read_uvarint()?;
            let column = reader.read_uvarint()?;
            let (line, column) = (
                u32::try_from(line).map_err(|_| CodecError::Malformed("line out of range".into()))?,
                u32::try_from(column)
                    .map_err(|_| CodecError::Malformed("column out of range".into()))?,
            );
            Ok(Some(match file {
                Some(file) => Location::in_file(file, line, column),
                None => Location::new(line, column),
            }))
        }
        other => Err(CodecError::Malformed(format!(
            "invalid location flag {other}"
        ))),
    }
}

fn read_exprs(reader: &mut Reader<'_>) -> Result<Vec<Rc<Expr>>, CodecError> {
    let count = reader.read_uvarint()?;
    if count > reader.remaining() as u64 {
        return Err(CodecError::ShortRead);
    }
    let mut exprs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        exprs.push(decode_expr(reader)?);
    }
    Ok(exprs)
}

fn node(kind: ExprKind, location: Option<Location>) -> Rc<Expr> {
    Rc::new(Expr { kind, location })
}

pub fn decode_expr(reader: &mut Reader<'_>) -> Result<Rc<Expr>, CodecError> {
    let tag = reader.read_uvarint()?;
    let location = read_location(reader)?;
    let kind = match tag {
        TAG_VALUE => {
            let ty = decode_schema(reader)?;
            let value = ValueDecoder::new(reader).decode(&ty)?;
            // Re-validate the literal against its declared type.
            return Expr::value(ty, value)
                .map(|expr| match location {
                    Some(location) => Expr::with_location(&expr, location),
                    None => expr,
                })
                .map_err(|e| CodecError::Malformed(e.to_string()));
        }
        TAG_BLOCK => {
            let statements = read_exprs(reader)?;
            let result = decode_expr(reader)?;
            ExprKind::Block { statements, result }
        }
        TAG_LET => ExprKind::Let {
            name: reader.read_string()?,
            value: decode_expr(reader)?,
        },
        TAG_ASSIGN => ExprKind::Assign {
            name: reader.read_string()?,
            value: decode_expr(reader)?,
        },
        TAG_IF => {
            let count = reader.read_uvarint()?;
            if count > reader.remaining() as u64 {
                return Err(CodecError::ShortRead);
            }
            let mut branches = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let predicate = decode_expr(reader)?;
                let body = decode_expr(reader)?;
                branches.push((predicate, body));
            }
            let otherwise = match reader.read_u8()? {
                0 => None,
                1 => Some(decode_expr(reader)?),
                other => {
                    return Err(CodecError::Malformed(format!(
                        "invalid else flag {other}"
                    )));
                }
            };
            ExprKind::If {
                branches,
                otherwise,
            }
        }
        TAG_WHILE => ExprKind::While {
            label: read_opt_string(reader)?,
            predicate: decode_expr(reader)?,
            body: decode_expr(reader)?,
        },
        TAG_FOR => ExprKind::For {
            label: read_opt_string(reader)?,
            item: reader.read_string()?,
            key: read_opt_string(reader)?,
            collection: decode_expr(reader)?,
            body: decode_expr(reader)?,
        },
        TAG_RETURN => ExprKind::Return {
            value: decode_expr(reader)?,
        },
        TAG_BREAK => ExprKind::Break {
            label: read_opt_string(reader)?,
        },
        TAG_CONTINUE => ExprKind::Continue {
            label: read_opt_string(reader)?,
        },
        TAG_ERROR => ExprKind::Error {
            message: decode_expr(reader)?,
        },
        TAG_TRY => ExprKind::Try {
            body: decode_expr(reader)?,
            message: reader.read_string()?,
            stack: reader.read_string()?,
            catch: decode_expr(reader)?,
        },
        TAG_MATCH => {
            let scrutinee = decode_expr(reader)?;
            let count = reader.read_uvarint()?;
            if count > reader.remaining() as u64 {
                return Err(CodecError::ShortRead);
            }
            let mut arms = Vec::with_capacity(count as usize);
            for _ in 0..count {
                arms.push(MatchArm {
                    case: reader.read_string()?,
                    binding: reader.read_string()?,
                    body: decode_expr(reader)?,
                });
            }
            ExprKind::Match { scrutinee, arms }
        }
        TAG_CALL => ExprKind::Call {
            callee: decode_expr(reader)?,
            arguments: read_exprs(reader)?,
        },
        TAG_PLATFORM => ExprKind::Platform {
            name: reader.read_string()?,
            arguments: read_exprs(reader)?,
        },
        TAG_BUILTIN => {
            let name = reader.read_string()?;
            let count = reader.read_uvarint()?;
            if count > reader.remaining() as u64 {
                return Err(CodecError::ShortRead);
            }
            let mut type_args = Vec::with_capacity(count as usize);
            for _ in 0..count {
                type_args.push(decode_schema(reader)?);
            }
            ExprKind::Builtin {
                name,
                type_args,
                arguments: read_exprs(reader)?,
            }
        }
        TAG_FUNCTION | TAG_ASYNC_FUNCTION => {
            let count = reader.read_uvarint()?;
            if count > reader.remaining() as u64 {
                return Err(CodecError::ShortRead);
            }
            let mut inputs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name = reader.read_string()?;
                let ty = decode_schema(reader)?;
                inputs.push((name, ty));
            }
            let output = decode_schema(reader)?;
            let capture_count = reader.read_uvarint()?;
            if capture_count > reader.remaining() as u64 {
                return Err(CodecError::ShortRead);
            }
            let mut captures = Vec::with_capacity(capture_count as usize);
            for _ in 0..capture_count {
                captures.push(reader.read_string()?);
            }
            let body = decode_expr(reader)?;
            ExprKind::Function {
                is_async: tag == TAG_ASYNC_FUNCTION,
                inputs,
                output,
                captures,
                body,
            }
        }
        TAG_NEW_ARRAY => ExprKind::NewArray {
            element: decode_schema(reader)?,
            items: read_exprs(reader)?,
        },
        TAG_NEW_SET => ExprKind::NewSet {
            key: decode_schema(reader)?,
            items: read_exprs(reader)?,
        },
        TAG_NEW_DICT => {
            let key = decode_schema(reader)?;
            let value = decode_schema(reader)?;
            let count = reader.read_uvarint()?;
            if count > reader.remaining() as u64 {
                return Err(CodecError::ShortRead);
            }
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let k = decode_expr(reader)?;
                let v = decode_expr(reader)?;
                pairs.push((k, v));
            }
            ExprKind::NewDict { key, value, pairs }
        }
        TAG_NEW_REF => ExprKind::NewRef {
            inner: decode_schema(reader)?,
            value: decode_expr(reader)?,
        },
        TAG_STRUCT => ExprKind::Struct {
            ty: decode_schema(reader)?,
            fields: read_exprs(reader)?,
        },
        TAG_VARIANT => {
            let ty = decode_schema(reader)?;
            let case = reader.read_string()?;
            let value = decode_expr(reader)?;
            ExprKind::Variant { ty, case, value }
        }
        TAG_WRAP_RECURSIVE => ExprKind::WrapRecursive {
            ty: decode_schema(reader)?,
            value: decode_expr(reader)?,
        },
        TAG_UNWRAP_RECURSIVE => ExprKind::UnwrapRecursive {
            value: decode_expr(reader)?,
        },
        TAG_REFERENCE => ExprKind::Reference {
            name: reader.read_string()?,
        },
        other => {
            return Err(CodecError::Malformed(format!("unknown IR tag {other}")));
        }
    };
    Ok(node(kind, location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use east_core::Value;

    #[test]
    fn test_expr_round_trip() {
        let body = Expr::block(
            vec![Expr::let_("x", Expr::integer(1))],
            Expr::builtin(
                "IntegerAdd",
                vec![],
                vec![Expr::reference("x"), Expr::integer(2)],
            ),
        );
        let function = Expr::function(
            vec![("n".to_string(), Type::Integer)],
            Type::Integer,
            vec![],
            body,
        );
        let mut buf = Vec::new();
        encode_expr(&mut buf, &function);
        let mut reader = Reader::new(&buf);
        let back = decode_expr(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        let mut again = Vec::new();
        encode_expr(&mut again, &back);
        assert_eq!(buf, again, "re-encoding is byte-identical");
    }

    #[test]
    fn test_literal_validation_on_decode() {
        // A literal claiming Integer but carrying a boolean payload must
        // not decode. Build bytes by hand: Value tag, no location,
        // Integer schema, then a truncated payload.
        let good = Expr::value(Type::Integer, Value::Integer(300)).unwrap();
        let mut buf = Vec::new();
        encode_expr(&mut buf, &good);
        buf.pop();
        assert!(decode_expr(&mut Reader::new(&buf)).is_err());
    }

    #[test]
    fn test_location_survives() {
        let expr = Expr::with_location(
            &Expr::integer(5),
            Location::in_file("main.east", 3, 14),
        );
        let mut buf = Vec::new();
        encode_expr(&mut buf, &expr);
        let back = decode_expr(&mut Reader::new(&buf)).unwrap();
        assert_eq!(back.location, expr.location);
    }
}
