//! String builtins
//!
//! Indices and lengths count Unicode scalar values, not bytes. The regex
//! operations use the `regex` crate and fault (catchably) on an invalid
//! pattern. `PrintJson`/`ParseJson` bridge data-typed values to JSON
//! text through `serde_json`.

use crate::operands::{integer, string, take};
use crate::registry::{BuiltinDef, ParamKind, TPat, def};
use east_core::datetime::{parse_iso, print_iso};
use east_core::value::Key;
use east_core::{EastError, Type, Value, print_value};
use std::collections::BTreeMap;
use std::rc::Rc;

fn char_len(s: &str) -> i64 {
    s.chars().count() as i64
}

/// Byte offset of the n-th char, clamped to the string bounds.
fn byte_at(s: &str, index: i64) -> usize {
    if index <= 0 {
        return 0;
    }
    s.char_indices()
        .nth(index as usize)
        .map_or(s.len(), |(byte, _)| byte)
}

fn run_concat(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, b] = take::<2>(args)?;
    let (a, b) = (string(&a)?, string(&b)?);
    Ok(Value::string(format!("{a}{b}")))
}

fn run_repeat(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, n] = take::<2>(args)?;
    let s = string(&s)?;
    let n = integer(&n)?.max(0) as usize;
    Ok(Value::string(s.repeat(n)))
}

fn run_length(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::Integer(char_len(&string(&s)?)))
}

fn run_substring(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, start, end] = take::<3>(args)?;
    let s = string(&s)?;
    let from = byte_at(&s, integer(&start)?);
    let to = byte_at(&s, integer(&end)?).max(from);
    Ok(Value::string(&s[from..to]))
}

fn run_to_upper(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::string(string(&s)?.to_uppercase()))
}

fn run_to_lower(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::string(string(&s)?.to_lowercase()))
}

/// An empty separator splits into individual characters.
fn run_split(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, sep] = take::<2>(args)?;
    let (s, sep) = (string(&s)?, string(&sep)?);
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(sep.as_ref()).map(Value::string).collect()
    };
    Ok(Value::array(parts))
}

fn run_trim(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::string(string(&s)?.trim()))
}

fn run_trim_start(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::string(string(&s)?.trim_start()))
}

fn run_trim_end(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::string(string(&s)?.trim_end()))
}

fn run_starts_with(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, prefix] = take::<2>(args)?;
    Ok(Value::Boolean(
        string(&s)?.starts_with(string(&prefix)?.as_ref()),
    ))
}

fn run_ends_with(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, suffix] = take::<2>(args)?;
    Ok(Value::Boolean(
        string(&s)?.ends_with(string(&suffix)?.as_ref()),
    ))
}

fn run_contains(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, needle] = take::<2>(args)?;
    Ok(Value::Boolean(
        string(&s)?.contains(string(&needle)?.as_ref()),
    ))
}

fn run_index_of(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, needle] = take::<2>(args)?;
    let (s, needle) = (string(&s)?, string(&needle)?);
    Ok(Value::Integer(match s.find(needle.as_ref()) {
        Some(byte) => char_len(&s[..byte]),
        None => -1,
    }))
}

fn run_replace(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, from, to] = take::<3>(args)?;
    let (s, from, to) = (string(&s)?, string(&from)?, string(&to)?);
    if from.is_empty() {
        return Ok(Value::String(s));
    }
    Ok(Value::string(s.replace(from.as_ref(), &to)))
}

fn compile_regex(pattern: &str) -> Result<regex::Regex, EastError> {
    regex::Regex::new(pattern)
        .map_err(|e| EastError::new(format!("invalid regular expression: {e}")))
}

fn run_regex_contains(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, pattern] = take::<2>(args)?;
    let re = compile_regex(&string(&pattern)?)?;
    Ok(Value::Boolean(re.is_match(&string(&s)?)))
}

fn run_regex_index_of(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, pattern] = take::<2>(args)?;
    let s = string(&s)?;
    let re = compile_regex(&string(&pattern)?)?;
    Ok(Value::Integer(match re.find(&s) {
        Some(found) => char_len(&s[..found.start()]),
        None => -1,
    }))
}

fn run_regex_replace(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, pattern, replacement] = take::<3>(args)?;
    let re = compile_regex(&string(&pattern)?)?;
    Ok(Value::string(
        re.replace_all(&string(&s)?, string(&replacement)?.as_ref())
            .into_owned(),
    ))
}

fn run_encode_utf8(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::blob(string(&s)?.as_bytes().to_vec()))
}

fn run_encode_utf16(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    let mut bytes = Vec::new();
    for unit in string(&s)?.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(Value::blob(bytes))
}

// ----------------------------------------------------------------------
//                                 JSON
// ----------------------------------------------------------------------

fn run_print_json(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [value] = take::<1>(args)?;
    let json = to_json(&type_args[0], &value, &mut Vec::new())?;
    Ok(Value::string(json.to_string()))
}

fn run_parse_json(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [text] = take::<1>(args)?;
    let json: serde_json::Value = serde_json::from_str(&string(&text)?)
        .map_err(|e| EastError::new(format!("invalid JSON: {e}")))?;
    from_json(&type_args[0], &json, &mut Vec::new())
}

fn json_key(key_ty: &Type, key: &Value) -> Result<String, EastError> {
    match key {
        Value::String(s) => Ok(s.to_string()),
        other => print_value(key_ty, other).map_err(|e| EastError::new(e.to_string())),
    }
}

fn to_json(
    ty: &Type,
    value: &Value,
    env: &mut Vec<Rc<Type>>,
) -> Result<serde_json::Value, EastError> {
    use serde_json::Value as Json;
    match (ty, value) {
        (Type::Null, Value::Null) => Ok(Json::Null),
        (Type::Boolean, Value::Boolean(b)) => Ok(Json::Bool(*b)),
        (Type::Integer, Value::Integer(n)) => Ok(Json::Number((*n).into())),
        (Type::Float, Value::Float(x)) => serde_json::Number::from_f64(*x)
            .map(Json::Number)
            .ok_or_else(|| EastError::new("non-finite float has no JSON form")),
        (Type::String, Value::String(s)) => Ok(Json::String(s.to_string())),
        (Type::DateTime, Value::DateTime(ms)) => Ok(Json::String(print_iso(*ms))),
        (Type::Blob, Value::Blob(bytes)) => Ok(Json::String(hex::encode(bytes.as_ref()))),
        (Type::Array(elem), Value::Array(data)) => {
            let items = data.items.borrow();
            items.iter().map(|v| to_json(elem, v, env)).collect()
        }
        (Type::Set(key), Value::Set(data)) => {
            let items = data.items.borrow();
            items.iter().map(|k| to_json(key, &k.0, env)).collect()
        }
        (Type::Dict(key, val), Value::Dict(data)) => {
            let items = data.items.borrow();
            let mut object = serde_json::Map::new();
            for (k, v) in items.iter() {
                object.insert(json_key(key, &k.0)?, to_json(val, v, env)?);
            }
            Ok(Json::Object(object))
        }
        (Type::Ref(inner), Value::Ref(data)) => to_json(inner, &data.value.borrow(), env),
        (Type::Struct(fields), Value::Struct(values)) => {
            let mut object = serde_json::Map::new();
            for ((name, field_ty), v) in fields.iter().zip(values.iter()) {
                object.insert(name.clone(), to_json(field_ty, v, env)?);
            }
            Ok(Json::Object(object))
        }
        (Type::Variant(cases), Value::Variant(data)) => {
            let Some((_, case_ty)) = cases.iter().find(|(n, _)| *n == data.case) else {
                return Err(EastError::new("variant case not in type"));
            };
            let mut object = serde_json::Map::new();
            object.insert(data.case.clone(), to_json(case_ty, &data.value, env)?);
            Ok(Json::Object(object))
        }
        (Type::Recursive(inner), _) => {
            env.push(inner.clone());
            let result = to_json(inner, value, env);
            env.pop();
            result
        }
        (Type::RecursiveRef(d), _) => {
            let idx = env.len() - *d as usize;
            let inner = env[idx].clone();
            let mut truncated: Vec<Rc<Type>> = env[..=idx].to_vec();
            to_json(&Type::Recursive(inner), value, &mut truncated)
        }
        _ => Err(EastError::new("value has no JSON form")),
    }
}

fn from_json(
    ty: &Type,
    json: &serde_json::Value,
    env: &mut Vec<Rc<Type>>,
) -> Result<Value, EastError> {
    use serde_json::Value as Json;
    let fail = || EastError::new(format!("JSON value does not match type {ty}"));
    match (ty, json) {
        (Type::Null, Json::Null) => Ok(Value::Null),
        (Type::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
        (Type::Integer, Json::Number(n)) => n.as_i64().map(Value::Integer).ok_or_else(fail),
        (Type::Float, Json::Number(n)) => n.as_f64().map(Value::Float).ok_or_else(fail),
        (Type::String, Json::String(s)) => Ok(Value::string(s.clone())),
        (Type::DateTime, Json::String(s)) => {
            parse_iso(s).map(Value::DateTime).ok_or_else(fail)
        }
        (Type::Blob, Json::String(s)) => hex::decode(s)
            .map(Value::blob)
            .map_err(|_| fail()),
        (Type::Array(elem), Json::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(elem, item, env)?);
            }
            Ok(Value::array(out))
        }
        (Type::Set(key), Json::Array(items)) => {
            let mut out = std::collections::BTreeSet::new();
            for item in items {
                out.insert(Key(from_json(key, item, env)?));
            }
            Ok(Value::Set(east_core::value::SetData::new(out)))
        }
        (Type::Dict(key, val), Json::Object(object)) => {
            let mut out = BTreeMap::new();
            for (name, item) in object {
                let k = match key.as_ref() {
                    Type::String => Value::string(name.clone()),
                    other => east_core::parse_value(other, name)
                        .map_err(|e| EastError::new(e.to_string()))?,
                };
                out.insert(Key(k), from_json(val, item, env)?);
            }
            Ok(Value::Dict(east_core::value::DictData::new(out)))
        }
        (Type::Ref(inner), _) => Ok(Value::reference(from_json(inner, json, env)?)),
        (Type::Struct(fields), Json::Object(object)) => {
            let mut values = Vec::with_capacity(fields.len());
            for (name, field_ty) in fields {
                let item = object.get(name).ok_or_else(fail)?;
                values.push(from_json(field_ty, item, env)?);
            }
            Ok(Value::structure(values))
        }
        (Type::Variant(cases), Json::Object(object)) => {
            if object.len() != 1 {
                return Err(fail());
            }
            let (case, inner) = object.iter().next().ok_or_else(fail)?;
            let Some((_, case_ty)) = cases.iter().find(|(n, _)| n == case) else {
                return Err(fail());
            };
            Ok(Value::variant(case.clone(), from_json(case_ty, inner, env)?))
        }
        (Type::Recursive(inner), _) => {
            env.push(inner.clone());
            let result = from_json(inner, json, env);
            env.pop();
            result
        }
        (Type::RecursiveRef(d), _) => {
            let idx = env.len() - *d as usize;
            let inner = env[idx].clone();
            let mut truncated: Vec<Rc<Type>> = env[..=idx].to_vec();
            from_json(&Type::Recursive(inner), json, &mut truncated)
        }
        _ => Err(fail()),
    }
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    defs.push(def(
        "StringConcat",
        vec![],
        vec![TPat::String, TPat::String],
        TPat::String,
        run_concat,
    ));
    defs.push(def(
        "StringRepeat",
        vec![],
        vec![TPat::String, TPat::Integer],
        TPat::String,
        run_repeat,
    ));
    defs.push(def(
        "StringLength",
        vec![],
        vec![TPat::String],
        TPat::Integer,
        run_length,
    ));
    defs.push(def(
        "StringSubstring",
        vec![],
        vec![TPat::String, TPat::Integer, TPat::Integer],
        TPat::String,
        run_substring,
    ));
    let unary_defs: [(&'static str, crate::registry::Run); 5] = [
        ("StringToUpper", run_to_upper),
        ("StringToLower", run_to_lower),
        ("StringTrim", run_trim),
        ("StringTrimStart", run_trim_start),
        ("StringTrimEnd", run_trim_end),
    ];
    for (name, run) in unary_defs {
        defs.push(def(name, vec![], vec![TPat::String], TPat::String, run));
    }
    defs.push(def(
        "StringSplit",
        vec![],
        vec![TPat::String, TPat::String],
        TPat::Array(Box::new(TPat::String)),
        run_split,
    ));
    let predicate_defs: [(&'static str, crate::registry::Run); 4] = [
        ("StringStartsWith", run_starts_with),
        ("StringEndsWith", run_ends_with),
        ("StringContains", run_contains),
        ("RegexContains", run_regex_contains),
    ];
    for (name, run) in predicate_defs {
        defs.push(def(
            name,
            vec![],
            vec![TPat::String, TPat::String],
            TPat::Boolean,
            run,
        ));
    }
    defs.push(def(
        "StringIndexOf",
        vec![],
        vec![TPat::String, TPat::String],
        TPat::Integer,
        run_index_of,
    ));
    defs.push(def(
        "RegexIndexOf",
        vec![],
        vec![TPat::String, TPat::String],
        TPat::Integer,
        run_regex_index_of,
    ));
    defs.push(def(
        "StringReplace",
        vec![],
        vec![TPat::String, TPat::String, TPat::String],
        TPat::String,
        run_replace,
    ));
    defs.push(def(
        "RegexReplace",
        vec![],
        vec![TPat::String, TPat::String, TPat::String],
        TPat::String,
        run_regex_replace,
    ));
    defs.push(def(
        "StringEncodeUtf8",
        vec![],
        vec![TPat::String],
        TPat::Blob,
        run_encode_utf8,
    ));
    defs.push(def(
        "StringEncodeUtf16",
        vec![],
        vec![TPat::String],
        TPat::Blob,
        run_encode_utf16,
    ));
    defs.push(def(
        "PrintJson",
        vec![ParamKind::Data],
        vec![TPat::Param(0)],
        TPat::String,
        run_print_json,
    ));
    defs.push(def(
        "ParseJson",
        vec![ParamKind::Data],
        vec![TPat::String],
        TPat::Param(0),
        run_parse_json,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_based_indexing() {
        let s = Value::string("héllo");
        let len = run_length(&[], vec![s.clone()]).unwrap();
        assert!(matches!(len, Value::Integer(5)));
        let sub = run_substring(&[], vec![s.clone(), Value::Integer(1), Value::Integer(3)]).unwrap();
        match sub {
            Value::String(text) => assert_eq!(text.as_ref(), "él"),
            _ => panic!("expected string"),
        }
        let idx = run_index_of(&[], vec![s, Value::string("llo")]).unwrap();
        assert!(matches!(idx, Value::Integer(2)));
    }

    #[test]
    fn test_regex_fault_is_catchable_error() {
        let err = run_regex_contains(&[], vec![Value::string("x"), Value::string("(")]).unwrap_err();
        assert!(err.message.contains("invalid regular expression"));
    }

    #[test]
    fn test_json_round_trip() {
        let ty = Type::Struct(vec![
            ("name".to_string(), Type::String),
            ("count".to_string(), Type::Integer),
            (
                "tags".to_string(),
                Type::Array(Box::new(Type::String)),
            ),
        ]);
        let value = Value::structure(vec![
            Value::string("beast"),
            Value::Integer(2),
            Value::array(vec![Value::string("binary")]),
        ]);
        let printed = run_print_json(std::slice::from_ref(&ty), vec![value.clone()]).unwrap();
        let parsed = run_parse_json(&[ty], vec![printed]).unwrap();
        assert!(east_core::values_equal(&value, &parsed));
    }
}
