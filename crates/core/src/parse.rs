//! Parsing of the canonical textual forms
//!
//! `parse_value` is type-directed and round-trips everything
//! [`crate::print::print_value`] emits; `parse_type` round-trips
//! [`crate::types::print_type`]. Whitespace is tolerated between tokens
//! (including after `&`). Both entry points insist on consuming the whole
//! input.

use crate::datetime::parse_iso;
use crate::error::TypeError;
use crate::types::Type;
use crate::value::{Key, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// A textual-form parse fault.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl ParseError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        ParseError {
            position,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse the canonical textual form of a value of `ty`.
pub fn parse_value(ty: &Type, text: &str) -> Result<Value, ParseError> {
    let mut parser = Parser::new(text);
    let value = parser.value(ty, &mut Vec::new())?;
    parser.finish()?;
    Ok(value)
}

/// Parse the textual form of a type.
pub fn parse_type(text: &str) -> Result<Type, ParseError> {
    let mut parser = Parser::new(text);
    let ty = parser.ty()?;
    parser.finish()?;
    Ok(ty)
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Parser {
            text,
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.pos, message)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), ParseError> {
        self.skip_ws();
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{ch}'")))
        }
    }

    fn eat(&mut self, ch: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn keyword(&mut self, word: &str) -> bool {
        self.skip_ws();
        let end = self.pos + word.len();
        if end <= self.chars.len()
            && self.chars[self.pos..end].iter().collect::<String>() == word
            && !matches!(self.chars.get(end), Some(c) if c.is_alphanumeric() || *c == '_')
        {
            self.pos = end;
            true
        } else {
            false
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if !matches!(self.peek(), Some(c) if c.is_alphabetic() || c == '_') {
            return Err(self.error("expected identifier"));
        }
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.skip_ws();
        if self.pos == self.chars.len() {
            Ok(())
        } else {
            Err(self.error("trailing input"))
        }
    }

    // ------------------------------------------------------------------
    //                              Values
    // ------------------------------------------------------------------

    fn value(&mut self, ty: &Type, env: &mut Vec<Rc<Type>>) -> Result<Value, ParseError> {
        self.skip_ws();
        match ty {
            Type::Never => Err(self.error("type Never has no values")),
            Type::Null => {
                if self.keyword("null") {
                    Ok(Value::Null)
                } else {
                    Err(self.error("expected null"))
                }
            }
            Type::Boolean => {
                if self.keyword("true") {
                    Ok(Value::Boolean(true))
                } else if self.keyword("false") {
                    Ok(Value::Boolean(false))
                } else {
                    Err(self.error("expected true or false"))
                }
            }
            Type::Integer => self.integer().map(Value::Integer),
            Type::Float => self.float().map(Value::Float),
            Type::String => self.quoted().map(Value::String),
            Type::DateTime => self.datetime().map(Value::DateTime),
            Type::Blob => self.blob(),
            Type::Array(elem) => {
                self.expect('[')?;
                let mut items = Vec::new();
                if !self.eat(']') {
                    loop {
                        items.push(self.value(elem, env)?);
                        if self.eat(']') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                Ok(Value::array(items))
            }
            Type::Set(key) => {
                self.expect('{')?;
                let mut items = BTreeSet::new();
                if !self.eat('}') {
                    loop {
                        items.insert(Key(self.value(key, env)?));
                        if self.eat('}') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                Ok(Value::Set(crate::value::SetData::new(items)))
            }
            Type::Dict(key, val) => {
                self.expect('{')?;
                let mut items = BTreeMap::new();
                if self.eat(':') {
                    self.expect('}')?;
                } else if !self.eat('}') {
                    loop {
                        let k = self.value(key, env)?;
                        self.expect(':')?;
                        let v = self.value(val, env)?;
                        items.insert(Key(k), v);
                        if self.eat('}') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                Ok(Value::Dict(crate::value::DictData::new(items)))
            }
            Type::Ref(inner) => {
                self.expect('&')?;
                // Whitespace after '&' is tolerated.
                let value = self.value(inner, env)?;
                Ok(Value::reference(value))
            }
            Type::Struct(fields) => {
                self.expect('(')?;
                let mut values = Vec::with_capacity(fields.len());
                for (i, (name, field_ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.expect(',')?;
                    }
                    let seen = self.identifier()?;
                    if &seen != name {
                        return Err(self.error(format!(
                            "expected struct field {name}, found {seen}"
                        )));
                    }
                    self.expect('=')?;
                    values.push(self.value(field_ty, env)?);
                }
                self.expect(')')?;
                Ok(Value::structure(values))
            }
            Type::Variant(cases) => {
                self.expect('.')?;
                let case = self.identifier()?;
                let Some((_, case_ty)) = cases.iter().find(|(n, _)| *n == case) else {
                    return Err(self.error(format!("unknown variant case {case}")));
                };
                let value = if self.eat('(') {
                    let inner = self.value(case_ty, env)?;
                    self.expect(')')?;
                    inner
                } else {
                    if !matches!(case_ty, Type::Null) {
                        return Err(self.error(format!("variant case {case} requires a value")));
                    }
                    Value::Null
                };
                Ok(Value::variant(case, value))
            }
            Type::Recursive(inner) => {
                env.push(inner.clone());
                let result = self.value(inner, env);
                env.pop();
                result
            }
            Type::RecursiveRef(d) => {
                let idx = env.len() - *d as usize;
                let inner = env[idx].clone();
                let mut truncated: Vec<Rc<Type>> = env[..=idx].to_vec();
                self.value(&Type::Recursive(inner), &mut truncated)
            }
            Type::Function { .. } | Type::AsyncFunction { .. } => {
                Err(self.error("function values have no textual form"))
            }
        }
    }

    fn integer(&mut self) -> Result<i64, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return Err(self.error("expected integer"));
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| ParseError::new(start, "integer out of range"))
    }

    fn float(&mut self) -> Result<f64, ParseError> {
        self.skip_ws();
        if self.keyword("nan") {
            return Ok(f64::NAN);
        }
        if self.keyword("inf") {
            return Ok(f64::INFINITY);
        }
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
            if self.keyword("inf") {
                return Ok(f64::NEG_INFINITY);
            }
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E'))
            || (matches!(self.peek(), Some('+' | '-'))
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e' | 'E')))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| ParseError::new(start, "expected float"))
    }

    fn quoted(&mut self) -> Result<Rc<str>, ParseError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('b') => out.push('\u{8}'),
                    Some('f') => out.push('\u{c}'),
                    Some('u') => {
                        let unit = self.hex_unit()?;
                        if (0xD800..0xDC00).contains(&unit) {
                            // High surrogate: the low half must follow.
                            if self.bump() != Some('\\') || self.bump() != Some('u') {
                                return Err(self.error("unpaired surrogate escape"));
                            }
                            let low = self.hex_unit()?;
                            if !(0xDC00..0xE000).contains(&low) {
                                return Err(self.error("unpaired surrogate escape"));
                            }
                            let code =
                                0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                            match char::from_u32(code) {
                                Some(c) => out.push(c),
                                None => return Err(self.error("invalid escape")),
                            }
                        } else {
                            match char::from_u32(unit) {
                                Some(c) => out.push(c),
                                None => return Err(self.error("unpaired surrogate escape")),
                            }
                        }
                    }
                    _ => return Err(self.error("invalid escape")),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(out.into())
    }

    fn hex_unit(&mut self) -> Result<u32, ParseError> {
        let mut unit = 0u32;
        for _ in 0..4 {
            let Some(digit) = self.bump().and_then(|c| c.to_digit(16)) else {
                return Err(self.error("expected four hex digits"));
            };
            unit = unit * 16 + digit;
        }
        Ok(unit)
    }

    fn datetime(&mut self) -> Result<i64, ParseError> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | ':' | '.' | 'T' | 'Z')) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        parse_iso(&text).ok_or_else(|| ParseError::new(start, "expected ISO-8601 datetime"))
    }

    fn blob(&mut self) -> Result<Value, ParseError> {
        self.skip_ws();
        if self.peek() != Some('0') {
            return Err(self.error("expected 0x blob literal"));
        }
        self.pos += 1;
        if self.peek() != Some('x') {
            return Err(self.error("expected 0x blob literal"));
        }
        self.pos += 1;
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let bytes = hex::decode(&text)
            .map_err(|_| ParseError::new(start, "expected an even number of hex digits"))?;
        Ok(Value::blob(bytes))
    }

    // ------------------------------------------------------------------
    //                              Types
    // ------------------------------------------------------------------

    fn ty(&mut self) -> Result<Type, ParseError> {
        let head = self.identifier()?;
        match head.as_str() {
            "Never" => Ok(Type::Never),
            "Null" => Ok(Type::Null),
            "Boolean" => Ok(Type::Boolean),
            "Integer" => Ok(Type::Integer),
            "Float" => Ok(Type::Float),
            "String" => Ok(Type::String),
            "DateTime" => Ok(Type::DateTime),
            "Blob" => Ok(Type::Blob),
            "Array" => {
                let inner = self.angle_one()?;
                self.checked(Type::array(inner))
            }
            "Set" => {
                let inner = self.angle_one()?;
                self.checked(Type::set(inner))
            }
            "Dict" => {
                self.expect('<')?;
                let key = self.ty()?;
                self.expect(',')?;
                let value = self.ty()?;
                self.expect('>')?;
                self.checked(Type::dict(key, value))
            }
            "Ref" => {
                let inner = self.angle_one()?;
                self.checked(Type::reference(inner))
            }
            "Struct" => {
                let fields = self.field_list()?;
                self.checked(Type::structure(fields))
            }
            "Variant" => {
                let cases = self.field_list()?;
                self.checked(Type::variant(cases))
            }
            "Recursive" => {
                let inner = self.angle_one()?;
                self.checked(Type::recursive(inner))
            }
            "Rec" => {
                self.expect('<')?;
                let depth = self.integer()?;
                self.expect('>')?;
                if depth < 1 || depth > u32::MAX as i64 {
                    return Err(self.error("recursive back-reference depth out of range"));
                }
                Ok(Type::RecursiveRef(depth as u32))
            }
            "Function" => self.function_type(false),
            "AsyncFunction" => self.function_type(true),
            other => Err(self.error(format!("unknown type {other}"))),
        }
    }

    fn checked(&self, result: Result<Type, TypeError>) -> Result<Type, ParseError> {
        result.map_err(|e| ParseError::new(self.pos, e.to_string()))
    }

    fn angle_one(&mut self) -> Result<Type, ParseError> {
        self.expect('<')?;
        let inner = self.ty()?;
        self.expect('>')?;
        Ok(inner)
    }

    fn field_list(&mut self) -> Result<Vec<(String, Type)>, ParseError> {
        self.expect('{')?;
        let mut fields = Vec::new();
        if !self.eat('}') {
            loop {
                let name = self.identifier()?;
                self.expect(':')?;
                let ty = self.ty()?;
                fields.push((name, ty));
                if self.eat('}') {
                    break;
                }
                self.expect(',')?;
            }
        }
        Ok(fields)
    }

    fn function_type(&mut self, is_async: bool) -> Result<Type, ParseError> {
        self.expect('<')?;
        self.expect('[')?;
        let mut inputs = Vec::new();
        if !self.eat(']') {
            loop {
                inputs.push(self.ty()?);
                if self.eat(']') {
                    break;
                }
                self.expect(',')?;
            }
        }
        self.expect(',')?;
        let output = self.ty()?;
        let mut platforms = BTreeSet::new();
        if self.eat(',') {
            self.expect('{')?;
            if !self.eat('}') {
                loop {
                    platforms.insert(self.identifier()?);
                    if self.eat('}') {
                        break;
                    }
                    self.expect(',')?;
                }
            }
        }
        self.expect('>')?;
        Ok(if is_async {
            Type::async_function(inputs, output, platforms)
        } else {
            Type::function(inputs, output, platforms)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::print_value;
    use crate::types::print_type;
    use crate::value::values_equal;

    fn round_trip(ty: &Type, value: &Value) {
        let text = print_value(ty, value).unwrap();
        let back = parse_value(ty, &text).unwrap();
        assert!(
            values_equal(value, &back),
            "{text} did not round-trip: {value:?} vs {back:?}"
        );
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(&Type::Null, &Value::Null);
        round_trip(&Type::Boolean, &Value::Boolean(true));
        round_trip(&Type::Integer, &Value::Integer(i64::MIN));
        round_trip(&Type::Float, &Value::Float(0.1));
        round_trip(&Type::Float, &Value::Float(f64::NEG_INFINITY));
        round_trip(&Type::Float, &Value::Float(f64::NAN));
        round_trip(&Type::String, &Value::string("πé\t\"quoted\""));
        round_trip(&Type::DateTime, &Value::DateTime(1_700_000_000_123));
        round_trip(&Type::Blob, &Value::blob(vec![0, 255, 16]));
    }

    #[test]
    fn test_container_round_trips() {
        let ty = Type::Dict(Box::new(Type::String), Box::new(Type::Integer));
        round_trip(&ty, &Value::dict_of([]));
        round_trip(
            &ty,
            &Value::dict_of([
                (Value::string("a"), Value::Integer(1)),
                (Value::string("b"), Value::Integer(2)),
            ]),
        );
        round_trip(
            &Type::Ref(Box::new(Type::Integer)),
            &Value::reference(Value::Integer(3)),
        );
        round_trip(
            &Type::Set(Box::new(Type::Float)),
            &Value::set_of([Value::Float(1.5), Value::Float(-0.5)]),
        );
    }

    #[test]
    fn test_ref_whitespace_tolerance() {
        let ty = Type::Ref(Box::new(Type::Integer));
        let value = parse_value(&ty, "&  7").unwrap();
        assert!(values_equal(&value, &Value::reference(Value::Integer(7))));
    }

    #[test]
    fn test_trailing_input_rejected() {
        assert!(parse_value(&Type::Integer, "1 2").is_err());
        assert!(parse_value(&Type::Integer, " 12 ").is_ok());
    }

    #[test]
    fn test_recursive_value_round_trip() {
        let ty = Type::recursive(Type::Variant(vec![
            ("cons".to_string(), Type::Struct(vec![
                ("head".to_string(), Type::Integer),
                ("tail".to_string(), Type::RecursiveRef(1)),
            ])),
            ("nil".to_string(), Type::Null),
        ]))
        .unwrap();
        let list = Value::variant(
            "cons",
            Value::structure(vec![
                Value::Integer(1),
                Value::variant("nil", Value::Null),
            ]),
        );
        round_trip(&ty, &list);
    }

    #[test]
    fn test_type_round_trips() {
        let samples = [
            Type::Dict(Box::new(Type::String), Box::new(Type::Float)),
            Type::Struct(vec![
                ("a".to_string(), Type::Integer),
                ("b".to_string(), Type::Array(Box::new(Type::Blob))),
            ]),
            Type::recursive(Type::Variant(vec![
                ("leaf".to_string(), Type::Null),
                ("node".to_string(), Type::Array(Box::new(Type::RecursiveRef(1)))),
            ]))
            .unwrap(),
            Type::function(
                vec![Type::Integer],
                Type::Integer,
                ["double".to_string()].into_iter().collect(),
            ),
        ];
        for ty in samples {
            let text = print_type(&ty);
            let back = parse_type(&text).unwrap();
            assert!(crate::type_ops::type_equal(&ty, &back), "{text}");
        }
    }
}
