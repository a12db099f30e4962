//! DateTime builtins
//!
//! Component getters and the component constructor work in the proleptic
//! Gregorian calendar (`east_core::datetime`). The format print/parse
//! pair takes a token list: `YYYY MM DD hh mm ss SSS` are field tokens,
//! anything else is literal text.

use crate::operands::{array, datetime, integer, string, take};
use crate::registry::{BuiltinDef, TPat, def};
use east_core::datetime::{Civil, civil_from_epoch_millis, day_of_week, epoch_millis_from_civil};
use east_core::{EastError, Type, Value};

fn component(args: Vec<Value>, pick: fn(&Civil) -> i64) -> Result<Value, EastError> {
    let [dt] = take::<1>(args)?;
    let civil = civil_from_epoch_millis(datetime(&dt)?);
    Ok(Value::Integer(pick(&civil)))
}

fn run_year(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    component(args, |c| c.year)
}

fn run_month(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    component(args, |c| i64::from(c.month))
}

fn run_day(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    component(args, |c| i64::from(c.day))
}

fn run_hour(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    component(args, |c| i64::from(c.hour))
}

fn run_minute(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    component(args, |c| i64::from(c.minute))
}

fn run_second(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    component(args, |c| i64::from(c.second))
}

fn run_millisecond(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    component(args, |c| i64::from(c.millisecond))
}

fn run_day_of_week(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [dt] = take::<1>(args)?;
    Ok(Value::Integer(i64::from(day_of_week(datetime(&dt)?))))
}

fn run_new(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [year, month, day, hour, minute, second, millisecond] = take::<7>(args)?;
    let civil = Civil {
        year: integer(&year)?,
        month: integer(&month)?.try_into().unwrap_or(u32::MAX),
        day: integer(&day)?.try_into().unwrap_or(u32::MAX),
        hour: integer(&hour)?.try_into().unwrap_or(u32::MAX),
        minute: integer(&minute)?.try_into().unwrap_or(u32::MAX),
        second: integer(&second)?.try_into().unwrap_or(u32::MAX),
        millisecond: integer(&millisecond)?.try_into().unwrap_or(u32::MAX),
    };
    epoch_millis_from_civil(civil)
        .map(Value::DateTime)
        .ok_or_else(|| {
            EastError::new(format!(
                "invalid datetime components {}-{}-{} {}:{}:{}.{}",
                civil.year,
                civil.month,
                civil.day,
                civil.hour,
                civil.minute,
                civil.second,
                civil.millisecond
            ))
        })
}

fn run_to_epoch(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [dt] = take::<1>(args)?;
    Ok(Value::Integer(datetime(&dt)?))
}

fn run_from_epoch(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [ms] = take::<1>(args)?;
    Ok(Value::DateTime(integer(&ms)?))
}

fn tokens_of(value: &Value) -> Result<Vec<String>, EastError> {
    let data = array(value)?;
    let items = data.items.borrow();
    items
        .iter()
        .map(|item| string(item).map(|s| s.to_string()))
        .collect()
}

fn run_format(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [dt, tokens] = take::<2>(args)?;
    let civil = civil_from_epoch_millis(datetime(&dt)?);
    let mut out = String::new();
    for token in tokens_of(&tokens)? {
        match token.as_str() {
            "YYYY" => out.push_str(&format!("{:04}", civil.year)),
            "YY" => out.push_str(&format!("{:02}", civil.year.rem_euclid(100))),
            "MM" => out.push_str(&format!("{:02}", civil.month)),
            "DD" => out.push_str(&format!("{:02}", civil.day)),
            "hh" => out.push_str(&format!("{:02}", civil.hour)),
            "mm" => out.push_str(&format!("{:02}", civil.minute)),
            "ss" => out.push_str(&format!("{:02}", civil.second)),
            "SSS" => out.push_str(&format!("{:03}", civil.millisecond)),
            literal => out.push_str(literal),
        }
    }
    Ok(Value::string(out))
}

fn parse_digits(text: &str, pos: &mut usize, width: usize) -> Result<i64, EastError> {
    let bytes = text.as_bytes();
    let end = *pos + width;
    if end > bytes.len() || !bytes[*pos..end].iter().all(u8::is_ascii_digit) {
        return Err(EastError::new(format!(
            "expected {width} digits at position {pos}"
        )));
    }
    let value = text[*pos..end]
        .parse()
        .map_err(|_| EastError::new("datetime component out of range"))?;
    *pos = end;
    Ok(value)
}

fn run_parse(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [text, tokens] = take::<2>(args)?;
    let text = string(&text)?;
    let mut pos = 0usize;
    let mut civil = Civil {
        year: 1970,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
        millisecond: 0,
    };
    for token in tokens_of(&tokens)? {
        match token.as_str() {
            "YYYY" => civil.year = parse_digits(&text, &mut pos, 4)?,
            "YY" => civil.year = 2000 + parse_digits(&text, &mut pos, 2)?,
            "MM" => civil.month = parse_digits(&text, &mut pos, 2)? as u32,
            "DD" => civil.day = parse_digits(&text, &mut pos, 2)? as u32,
            "hh" => civil.hour = parse_digits(&text, &mut pos, 2)? as u32,
            "mm" => civil.minute = parse_digits(&text, &mut pos, 2)? as u32,
            "ss" => civil.second = parse_digits(&text, &mut pos, 2)? as u32,
            "SSS" => civil.millisecond = parse_digits(&text, &mut pos, 3)? as u32,
            literal => {
                if !text[pos..].starts_with(literal) {
                    return Err(EastError::new(format!(
                        "expected literal {literal:?} at position {pos}"
                    )));
                }
                pos += literal.len();
            }
        }
    }
    if pos != text.len() {
        return Err(EastError::new("trailing text after datetime"));
    }
    epoch_millis_from_civil(civil)
        .map(Value::DateTime)
        .ok_or_else(|| EastError::new("datetime components out of range"))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    let getters: [(&'static str, crate::registry::Run); 8] = [
        ("DateTimeYear", run_year),
        ("DateTimeMonth", run_month),
        ("DateTimeDay", run_day),
        ("DateTimeHour", run_hour),
        ("DateTimeMinute", run_minute),
        ("DateTimeSecond", run_second),
        ("DateTimeMillisecond", run_millisecond),
        ("DateTimeDayOfWeek", run_day_of_week),
    ];
    for (name, run) in getters {
        defs.push(def(name, vec![], vec![TPat::DateTime], TPat::Integer, run));
    }
    defs.push(def(
        "NewDateTime",
        vec![],
        vec![
            TPat::Integer,
            TPat::Integer,
            TPat::Integer,
            TPat::Integer,
            TPat::Integer,
            TPat::Integer,
            TPat::Integer,
        ],
        TPat::DateTime,
        run_new,
    ));
    defs.push(def(
        "DateTimeToEpochMilliseconds",
        vec![],
        vec![TPat::DateTime],
        TPat::Integer,
        run_to_epoch,
    ));
    defs.push(def(
        "DateTimeFromEpochMilliseconds",
        vec![],
        vec![TPat::Integer],
        TPat::DateTime,
        run_from_epoch,
    ));
    defs.push(def(
        "PrintDateTime",
        vec![],
        vec![TPat::DateTime, TPat::Array(Box::new(TPat::String))],
        TPat::String,
        run_format,
    ));
    defs.push(def(
        "ParseDateTime",
        vec![],
        vec![TPat::String, TPat::Array(Box::new(TPat::String))],
        TPat::DateTime,
        run_parse,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_list(tokens: &[&str]) -> Value {
        Value::array(tokens.iter().map(|t| Value::string(*t)).collect())
    }

    #[test]
    fn test_format_and_parse_tokens() {
        let tokens = token_list(&["YYYY", "-", "MM", "-", "DD", " ", "hh", ":", "mm"]);
        let dt = run_new(
            &[],
            vec![
                Value::Integer(2024),
                Value::Integer(2),
                Value::Integer(29),
                Value::Integer(13),
                Value::Integer(5),
                Value::Integer(0),
                Value::Integer(0),
            ],
        )
        .unwrap();
        let printed = run_format(&[], vec![dt.clone(), tokens.clone()]).unwrap();
        match &printed {
            Value::String(s) => assert_eq!(s.as_ref(), "2024-02-29 13:05"),
            _ => panic!("expected string"),
        }
        let parsed = run_parse(&[], vec![printed, tokens]).unwrap();
        assert!(east_core::values_equal(&parsed, &dt));
    }

    #[test]
    fn test_invalid_components_fault() {
        let err = run_new(
            &[],
            vec![
                Value::Integer(2023),
                Value::Integer(2),
                Value::Integer(29),
                Value::Integer(0),
                Value::Integer(0),
                Value::Integer(0),
                Value::Integer(0),
            ],
        )
        .unwrap_err();
        assert!(err.message.contains("invalid datetime components"));
    }
}
