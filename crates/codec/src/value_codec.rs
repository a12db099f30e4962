//! Type-directed value encoding with container backreferences
//!
//! Mutable containers (`Array`/`Set`/`Dict`/`Ref`) begin with a marker
//! varint: `0` introduces the container inline, `k > 0` says "the same
//! container was encoded `k` bytes earlier". Offsets are measured at the
//! byte immediately after the marker varint on both sides, so the decoder
//! can pre-allocate the destination container and register it before
//! recursing, which makes cycles and aliases round-trip to
//! identical-identity aliases.

use crate::error::CodecError;
use crate::ir_codec;
use crate::reader::Reader;
use crate::varint::{uvarint_len, write_ivarint, write_uvarint};
use east_core::value::{ArrayData, DictData, Key, RefData, SetData};
use east_core::{Callable, ExprKind, FunctionData, Type, Value};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

/// The only NaN bit pattern that may be materialized in persistent form.
pub const CANONICAL_NAN_BITS: u64 = 0x7FF8_0000_0000_0000;

pub struct ValueEncoder<'b> {
    buf: &'b mut Vec<u8>,
    /// Container identity to the offset just after its inline marker.
    seen: HashMap<usize, usize>,
    env: Vec<Rc<Type>>,
}

impl<'b> ValueEncoder<'b> {
    pub fn new(buf: &'b mut Vec<u8>) -> Self {
        ValueEncoder {
            buf,
            seen: HashMap::new(),
            env: Vec::new(),
        }
    }

    fn shape_error(ty: &Type) -> CodecError {
        CodecError::Unsupported(format!("value does not have the shape of {ty}"))
    }

    /// Emit the marker for a container. Returns `true` when the container
    /// was already encoded and a backreference was written instead.
    fn container_marker(&mut self, ptr: usize) -> bool {
        if let Some(&start) = self.seen.get(&ptr) {
            // The delta is measured from the byte after this marker, so
            // the marker length feeds into its own value; pick the unique
            // fixed point.
            let pos = self.buf.len();
            let mut len = 1usize;
            let delta = loop {
                let candidate = (pos + len - start) as u64;
                if uvarint_len(candidate) == len {
                    break candidate;
                }
                len += 1;
            };
            write_uvarint(self.buf, delta);
            trace!(delta, "beast2 backreference");
            true
        } else {
            write_uvarint(self.buf, 0);
            self.seen.insert(ptr, self.buf.len());
            false
        }
    }

    pub fn encode(&mut self, ty: &Type, value: &Value) -> Result<(), CodecError> {
        match (ty, value) {
            (Type::Null, Value::Null) => Ok(()),
            (Type::Boolean, Value::Boolean(b)) => {
                self.buf.push(u8::from(*b));
                Ok(())
            }
            (Type::Integer, Value::Integer(n)) => {
                write_ivarint(self.buf, *n);
                Ok(())
            }
            (Type::Float, Value::Float(x)) => {
                let bits = if x.is_nan() {
                    CANONICAL_NAN_BITS
                } else {
                    x.to_bits()
                };
                self.buf.extend_from_slice(&f64::from_bits(bits).to_le_bytes());
                Ok(())
            }
            (Type::String, Value::String(s)) => {
                write_uvarint(self.buf, s.len() as u64);
                self.buf.extend_from_slice(s.as_bytes());
                Ok(())
            }
            (Type::DateTime, Value::DateTime(ms)) => {
                write_ivarint(self.buf, *ms);
                Ok(())
            }
            (Type::Blob, Value::Blob(bytes)) => {
                write_uvarint(self.buf, bytes.len() as u64);
                self.buf.extend_from_slice(bytes);
                Ok(())
            }
            (Type::Array(elem), Value::Array(data)) => {
                if self.container_marker(Rc::as_ptr(data) as usize) {
                    return Ok(());
                }
                let items = data.items.borrow();
                write_uvarint(self.buf, items.len() as u64);
                for item in items.iter() {
                    self.encode(elem, item)?;
                }
                Ok(())
            }
            (Type::Set(key), Value::Set(data)) => {
                if self.container_marker(Rc::as_ptr(data) as usize) {
                    return Ok(());
                }
                let items = data.items.borrow();
                write_uvarint(self.buf, items.len() as u64);
                for k in items.iter() {
                    self.encode(key, &k.0)?;
                }
                Ok(())
            }
            (Type::Dict(key, val), Value::Dict(data)) => {
                if self.container_marker(Rc::as_ptr(data) as usize) {
                    return Ok(());
                }
                let items = data.items.borrow();
                write_uvarint(self.buf, items.len() as u64);
                for (k, v) in items.iter() {
                    self.encode(key, &k.0)?;
                    self.encode(val, v)?;
                }
                Ok(())
            }
            (Type::Ref(inner), Value::Ref(data)) => {
                if self.container_marker(Rc::as_ptr(data) as usize) {
                    return Ok(());
                }
                let value = data.value.borrow();
                self.encode(inner, &value)
            }
            (Type::Struct(fields), Value::Struct(values)) => {
                if fields.len() != values.len() {
                    return Err(Self::shape_error(ty));
                }
                for ((_, field_ty), v) in fields.iter().zip(values.iter()) {
                    self.encode(field_ty, v)?;
                }
                Ok(())
            }
            (Type::Variant(cases), Value::Variant(data)) => {
                let Some(index) = cases.iter().position(|(n, _)| *n == data.case) else {
                    return Err(Self::shape_error(ty));
                };
                write_uvarint(self.buf, index as u64);
                self.encode(&cases[index].1, &data.value)
            }
            (Type::Recursive(inner), _) => {
                self.env.push(inner.clone());
                let result = self.encode(inner, value);
                self.env.pop();
                result
            }
            (Type::RecursiveRef(d), _) => {
                let idx = self.env.len() - *d as usize;
                let inner = self.env[idx].clone();
                let saved: Vec<Rc<Type>> = self.env.drain(idx + 1..).collect();
                let result = self.encode(&Type::Recursive(inner), value);
                self.env.extend(saved);
                result
            }
            (Type::Function { .. } | Type::AsyncFunction { .. }, Value::Function(data)) => {
                let Some(ir) = &data.ir else {
                    return Err(CodecError::Unsupported(
                        "function value has no originating IR".into(),
                    ));
                };
                match &ir.kind {
                    ExprKind::Function { captures, .. } if captures.is_empty() => {}
                    ExprKind::Function { .. } => return Err(CodecError::CaptureNotEmpty),
                    _ => {
                        return Err(CodecError::Unsupported(
                            "function IR is not a function literal".into(),
                        ));
                    }
                }
                ir_codec::encode_expr(self.buf, ir);
                Ok(())
            }
            _ => Err(Self::shape_error(ty)),
        }
    }
}

pub struct ValueDecoder<'r, 'a> {
    reader: &'r mut Reader<'a>,
    /// Offset just after an inline marker to the container registered
    /// there.
    containers: HashMap<usize, Value>,
    env: Vec<Rc<Type>>,
}

impl<'r, 'a> ValueDecoder<'r, 'a> {
    pub fn new(reader: &'r mut Reader<'a>) -> Self {
        ValueDecoder {
            reader,
            containers: HashMap::new(),
            env: Vec::new(),
        }
    }

    /// Read a container marker. `Ok(Some(v))` is a resolved
    /// backreference; `Ok(None)` means the container follows inline and
    /// has to be registered at the returned-by-`position` offset.
    fn read_marker(&mut self) -> Result<Option<Value>, CodecError> {
        let marker = self.reader.read_uvarint()?;
        if marker == 0 {
            return Ok(None);
        }
        let here = self.reader.position() as u64;
        let target = here
            .checked_sub(marker)
            .ok_or(CodecError::BadBackreference(marker))?;
        let value = self
            .containers
            .get(&(target as usize))
            .ok_or(CodecError::BadBackreference(marker))?
            .clone();
        trace!(delta = marker, "beast2 backreference resolved");
        Ok(Some(value))
    }

    pub fn decode(&mut self, ty: &Type) -> Result<Value, CodecError> {
        match ty {
            Type::Never => Err(CodecError::Malformed("type Never has no values".into())),
            Type::Null => Ok(Value::Null),
            Type::Boolean => match self.reader.read_u8()? {
                0 => Ok(Value::Boolean(false)),
                1 => Ok(Value::Boolean(true)),
                other => Err(CodecError::Malformed(format!("invalid boolean byte {other}"))),
            },
            Type::Integer => Ok(Value::Integer(self.reader.read_ivarint()?)),
            Type::Float => {
                let x = self.reader.read_f64()?;
                if x.is_nan() && x.to_bits() != CANONICAL_NAN_BITS {
                    return Err(CodecError::NonCanonicalNan(x.to_bits()));
                }
                Ok(Value::Float(x))
            }
            Type::String => Ok(Value::string(self.reader.read_string()?)),
            Type::DateTime => Ok(Value::DateTime(self.reader.read_ivarint()?)),
            Type::Blob => Ok(Value::blob(self.reader.read_len_prefixed()?.to_vec())),
            Type::Array(elem) => {
                if let Some(existing) = self.read_marker()? {
                    return match existing {
                        Value::Array(_) => Ok(existing),
                        _ => Err(CodecError::Malformed(
                            "backreference resolves to a different container shape".into(),
                        )),
                    };
                }
                let data = ArrayData::new(Vec::new());
                self.containers
                    .insert(self.reader.position(), Value::Array(data.clone()));
                let count = self.checked_count()?;
                for _ in 0..count {
                    let item = self.decode(elem)?;
                    data.items.borrow_mut().push(item);
                }
                Ok(Value::Array(data))
            }
            Type::Set(key) => {
                if let Some(existing) = self.read_marker()? {
                    return match existing {
                        Value::Set(_) => Ok(existing),
                        _ => Err(CodecError::Malformed(
                            "backreference resolves to a different container shape".into(),
                        )),
                    };
                }
                let data = SetData::new(Default::default());
                self.containers
                    .insert(self.reader.position(), Value::Set(data.clone()));
                let count = self.checked_count()?;
                for _ in 0..count {
                    let k = self.decode(key)?;
                    data.items.borrow_mut().insert(Key(k));
                }
                Ok(Value::Set(data))
            }
            Type::Dict(key, val) => {
                if let Some(existing) = self.read_marker()? {
                    return match existing {
                        Value::Dict(_) => Ok(existing),
                        _ => Err(CodecError::Malformed(
                            "backreference resolves to a different container shape".into(),
                        )),
                    };
                }
                let data = DictData::new(Default::default());
                self.containers
                    .insert(self.reader.position(), Value::Dict(data.clone()));
                let count = self.checked_count()?;
                for _ in 0..count {
                    let k = self.decode(key)?;
                    let v = self.decode(val)?;
                    data.items.borrow_mut().insert(Key(k), v);
                }
                Ok(Value::Dict(data))
            }
            Type::Ref(inner) => {
                if let Some(existing) = self.read_marker()? {
                    return match existing {
                        Value::Ref(_) => Ok(existing),
                        _ => Err(CodecError::Malformed(
                            "backreference resolves to a different container shape".into(),
                        )),
                    };
                }
                let data = RefData::new(Value::Null);
                self.containers
                    .insert(self.reader.position(), Value::Ref(data.clone()));
                let value = self.decode(inner)?;
                *data.value.borrow_mut() = value;
                Ok(Value::Ref(data))
            }
            Type::Struct(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (_, field_ty) in fields {
                    values.push(self.decode(field_ty)?);
                }
                Ok(Value::structure(values))
            }
            Type::Variant(cases) => {
                let tag = self.reader.read_uvarint()?;
                let Some((name, case_ty)) = cases.get(tag as usize) else {
                    return Err(CodecError::VariantTagOutOfRange(tag));
                };
                let value = self.decode(case_ty)?;
                Ok(Value::variant(name.clone(), value))
            }
            Type::Recursive(inner) => {
                self.env.push(inner.clone());
                let result = self.decode(inner);
                self.env.pop();
                result
            }
            Type::RecursiveRef(d) => {
                let idx = self.env.len() - *d as usize;
                let inner = self.env[idx].clone();
                let saved: Vec<Rc<Type>> = self.env.drain(idx + 1..).collect();
                let result = self.decode(&Type::Recursive(inner));
                self.env.extend(saved);
                result
            }
            Type::Function { .. } | Type::AsyncFunction { .. } => {
                let expr = ir_codec::decode_expr(self.reader)?;
                match &expr.kind {
                    ExprKind::Function { captures, .. } if captures.is_empty() => {}
                    ExprKind::Function { .. } => return Err(CodecError::CaptureNotEmpty),
                    _ => {
                        return Err(CodecError::Malformed(
                            "embedded function IR is not a function literal".into(),
                        ));
                    }
                }
                Ok(Value::Function(Rc::new(FunctionData {
                    ty: ty.clone(),
                    ir: Some(expr),
                    callable: Callable::Unlinked,
                })))
            }
        }
    }

    fn checked_count(&mut self) -> Result<u64, CodecError> {
        self.reader.read_uvarint()
    }
}
