//! Canonical textual form of values
//!
//! Every data type admits a textual form; `print_value` followed by
//! `parse_value` of the same type yields an equal value. The shapes:
//!
//! | Type | Form |
//! |---|---|
//! | Null | `null` |
//! | Boolean | `true` / `false` |
//! | Integer | decimal |
//! | Float | shortest round-trip decimal; `inf`, `-inf`, `nan` |
//! | String | double-quoted, JSON-like escapes |
//! | DateTime | ISO-8601 UTC to millisecond |
//! | Blob | `0x` hex |
//! | Ref | `&<inner>` |
//! | Array | `[v1,v2]` |
//! | Set | `{v1,v2}` |
//! | Dict | `{k1:v1}`; empty is `{:}` |
//! | Struct | `(name1=v1,name2=v2)` |
//! | Variant | `.case(value)`, `.case` when the payload is null |

use crate::datetime::print_iso;
use crate::error::TypeError;
use crate::types::Type;
use crate::value::Value;
use std::fmt::Write;
use std::rc::Rc;

/// Print `value` in the canonical textual form of `ty`.
pub fn print_value(ty: &Type, value: &Value) -> Result<String, TypeError> {
    let mut printer = Printer {
        out: String::new(),
        env: Vec::new(),
        visiting: Vec::new(),
    };
    printer.print(ty, value)?;
    Ok(printer.out)
}

struct Printer {
    out: String,
    env: Vec<Rc<Type>>,
    /// Container cells on the current path, for cycle detection: the
    /// textual form cannot express aliasing.
    visiting: Vec<usize>,
}

impl Printer {
    fn mismatch(ty: &Type) -> TypeError {
        TypeError::new(format!("value does not match type {ty}"))
    }

    fn enter(&mut self, ptr: usize) -> Result<(), TypeError> {
        if self.visiting.contains(&ptr) {
            return Err(TypeError::new("cyclic value has no textual form"));
        }
        self.visiting.push(ptr);
        Ok(())
    }

    fn leave(&mut self) {
        self.visiting.pop();
    }

    fn print(&mut self, ty: &Type, value: &Value) -> Result<(), TypeError> {
        match (ty, value) {
            (Type::Null, Value::Null) => {
                self.out.push_str("null");
                Ok(())
            }
            (Type::Boolean, Value::Boolean(b)) => {
                self.out.push_str(if *b { "true" } else { "false" });
                Ok(())
            }
            (Type::Integer, Value::Integer(n)) => {
                write!(self.out, "{n}").ok();
                Ok(())
            }
            (Type::Float, Value::Float(x)) => {
                self.out.push_str(&print_float(*x));
                Ok(())
            }
            (Type::String, Value::String(s)) => {
                print_quoted(&mut self.out, s);
                Ok(())
            }
            (Type::DateTime, Value::DateTime(ms)) => {
                self.out.push_str(&print_iso(*ms));
                Ok(())
            }
            (Type::Blob, Value::Blob(bytes)) => {
                self.out.push_str("0x");
                self.out.push_str(&hex::encode(bytes.as_ref()));
                Ok(())
            }
            (Type::Array(elem), Value::Array(data)) => {
                self.enter(Rc::as_ptr(data) as usize)?;
                self.out.push('[');
                let items = data.items.borrow();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.print(elem, item)?;
                }
                self.out.push(']');
                self.leave();
                Ok(())
            }
            (Type::Set(key), Value::Set(data)) => {
                self.out.push('{');
                let items = data.items.borrow();
                for (i, k) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.print(key, &k.0)?;
                }
                self.out.push('}');
                Ok(())
            }
            (Type::Dict(key, val), Value::Dict(data)) => {
                self.enter(Rc::as_ptr(data) as usize)?;
                let items = data.items.borrow();
                if items.is_empty() {
                    self.out.push_str("{:}");
                } else {
                    self.out.push('{');
                    for (i, (k, v)) in items.iter().enumerate() {
                        if i > 0 {
                            self.out.push(',');
                        }
                        self.print(key, &k.0)?;
                        self.out.push(':');
                        self.print(val, v)?;
                    }
                    self.out.push('}');
                }
                self.leave();
                Ok(())
            }
            (Type::Ref(inner), Value::Ref(data)) => {
                self.enter(Rc::as_ptr(data) as usize)?;
                self.out.push('&');
                self.print(inner, &data.value.borrow())?;
                self.leave();
                Ok(())
            }
            (Type::Struct(fields), Value::Struct(values)) => {
                if fields.len() != values.len() {
                    return Err(Self::mismatch(ty));
                }
                self.out.push('(');
                for (i, ((name, field_ty), v)) in fields.iter().zip(values.iter()).enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.out.push_str(name);
                    self.out.push('=');
                    self.print(field_ty, v)?;
                }
                self.out.push(')');
                Ok(())
            }
            (Type::Variant(cases), Value::Variant(data)) => {
                let Some((_, case_ty)) = cases.iter().find(|(n, _)| *n == data.case) else {
                    return Err(Self::mismatch(ty));
                };
                self.out.push('.');
                self.out.push_str(&data.case);
                if !matches!(data.value, Value::Null) {
                    self.out.push('(');
                    self.print(case_ty, &data.value)?;
                    self.out.push(')');
                }
                Ok(())
            }
            (Type::Recursive(inner), _) => {
                self.env.push(inner.clone());
                let result = self.print(inner, value);
                self.env.pop();
                result
            }
            (Type::RecursiveRef(d), _) => {
                let idx = self.env.len() - *d as usize;
                let inner = self.env[idx].clone();
                let saved: Vec<Rc<Type>> = self.env.drain(idx + 1..).collect();
                let result = self.print(&Type::Recursive(inner), value);
                self.env.extend(saved);
                result
            }
            (Type::Function { .. } | Type::AsyncFunction { .. }, _) => Err(TypeError::new(
                "function values have no textual form".to_string(),
            )),
            (Type::Never, _) => Err(TypeError::new("type Never has no values".to_string())),
            _ => Err(Self::mismatch(ty)),
        }
    }
}

/// Shortest round-trip decimal form, with the canonical spellings for the
/// non-finite values.
pub fn print_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x == f64::INFINITY {
        "inf".to_string()
    } else if x == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{x}")
    }
}

/// Double-quoted string with JSON-like escapes.
pub fn print_quoted(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                write!(out, "\\u{:04x}", c as u32).ok();
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_forms() {
        assert_eq!(print_value(&Type::Null, &Value::Null).unwrap(), "null");
        assert_eq!(
            print_value(&Type::Integer, &Value::Integer(-42)).unwrap(),
            "-42"
        );
        assert_eq!(
            print_value(&Type::Float, &Value::Float(f64::NAN)).unwrap(),
            "nan"
        );
        assert_eq!(
            print_value(&Type::Float, &Value::Float(1.5)).unwrap(),
            "1.5"
        );
        assert_eq!(
            print_value(&Type::String, &Value::string("a\"b\n")).unwrap(),
            "\"a\\\"b\\n\""
        );
        assert_eq!(
            print_value(&Type::Blob, &Value::blob(vec![0xde, 0xad])).unwrap(),
            "0xdead"
        );
    }

    #[test]
    fn test_container_forms() {
        let arr = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(
            print_value(&Type::Array(Box::new(Type::Integer)), &arr).unwrap(),
            "[1,2]"
        );
        let dict = Value::dict_of([(Value::string("a"), Value::Integer(1))]);
        assert_eq!(
            print_value(
                &Type::Dict(Box::new(Type::String), Box::new(Type::Integer)),
                &dict
            )
            .unwrap(),
            "{\"a\":1}"
        );
        let empty_dict = Value::dict_of([]);
        assert_eq!(
            print_value(
                &Type::Dict(Box::new(Type::String), Box::new(Type::Integer)),
                &empty_dict
            )
            .unwrap(),
            "{:}"
        );
        let set = Value::set_of([Value::Integer(2), Value::Integer(1)]);
        assert_eq!(
            print_value(&Type::Set(Box::new(Type::Integer)), &set).unwrap(),
            "{1,2}"
        );
    }

    #[test]
    fn test_struct_variant_ref_forms() {
        let st = Type::Struct(vec![
            ("a".to_string(), Type::Integer),
            ("b".to_string(), Type::String),
        ]);
        let sv = Value::structure(vec![Value::Integer(1), Value::string("x")]);
        assert_eq!(print_value(&st, &sv).unwrap(), "(a=1,b=\"x\")");

        let vt = Type::Variant(vec![
            ("none".to_string(), Type::Null),
            ("some".to_string(), Type::Integer),
        ]);
        assert_eq!(
            print_value(&vt, &Value::variant("some", Value::Integer(3))).unwrap(),
            ".some(3)"
        );
        assert_eq!(
            print_value(&vt, &Value::variant("none", Value::Null)).unwrap(),
            ".none"
        );

        let rt = Type::Ref(Box::new(Type::Integer));
        assert_eq!(
            print_value(&rt, &Value::reference(Value::Integer(9))).unwrap(),
            "&9"
        );
    }

    #[test]
    fn test_cyclic_value_rejected() {
        let arr = Value::array(vec![]);
        if let Value::Array(data) = &arr {
            data.items.borrow_mut().push(arr.clone());
        }
        let ty = Type::recursive(Type::Array(Box::new(Type::RecursiveRef(1)))).unwrap();
        assert!(print_value(&ty, &arr).is_err());
    }
}
