//! Dict builtins
//!
//! The insert/update/swap/delete/pop family is strict: inserting an
//! existing key or touching a missing one is a catchable runtime fault.
//! `getOrInsert` and `insertOrUpdate` are the lenient counterparts.
//! Guarded walks use a range cursor like the set walks.

use crate::operands::{array, call_sync, dict, function, integer, take};
use crate::registry::{BuiltinDef, ParamKind, TPat, def, none_value, option_pat, some_value};
use east_core::value::{DictData, Key};
use east_core::{EastError, IterGuard, Type, Value, check_mutable, print_value};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;

/// Printable form of a key for fault messages; falls back to a generic
/// description when the key type cannot render it.
fn describe_key(type_args: &[Type], key: &Value) -> String {
    type_args
        .first()
        .and_then(|ty| print_value(ty, key).ok())
        .unwrap_or_else(|| "<key>".to_string())
}

fn missing(type_args: &[Type], key: &Value) -> EastError {
    EastError::new(format!(
        "dict key {} not found",
        describe_key(type_args, key)
    ))
}

fn next_entry(data: &DictData, after: Option<&Key>) -> Option<(Key, Value)> {
    let items = data.items.borrow();
    match after {
        None => items.iter().next().map(|(k, v)| (k.clone(), v.clone())),
        Some(key) => items
            .range((Bound::Excluded(key.clone()), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())),
    }
}

fn guarded_walk(
    data: &Rc<DictData>,
    mut visit: impl FnMut(Key, Value) -> Result<(), EastError>,
) -> Result<(), EastError> {
    let _guard = IterGuard::new(data.clone());
    let mut cursor: Option<Key> = None;
    while let Some((key, value)) = next_entry(data, cursor.as_ref()) {
        visit(key.clone(), value)?;
        cursor = Some(key);
    }
    Ok(())
}

fn run_generate(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [count, keyer, valuer] = take::<3>(args)?;
    let count = integer(&count)?.max(0);
    let keyer = function(&keyer)?;
    let valuer = function(&valuer)?;
    let mut items = BTreeMap::new();
    for i in 0..count {
        let key = call_sync(&keyer, vec![Value::Integer(i)])?;
        let value = call_sync(&valuer, vec![Value::Integer(i)])?;
        items.insert(Key(key), value);
    }
    Ok(Value::Dict(DictData::new(items)))
}

fn run_size(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d] = take::<1>(args)?;
    Ok(Value::Integer(dict(&d)?.items.borrow().len() as i64))
}

fn run_has(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key] = take::<2>(args)?;
    Ok(Value::Boolean(
        dict(&d)?.items.borrow().contains_key(&Key(key)),
    ))
}

fn run_get(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key] = take::<2>(args)?;
    let data = dict(&d)?;
    let found = data.items.borrow().get(&Key(key.clone())).cloned();
    found.ok_or_else(|| missing(type_args, &key))
}

fn run_get_or_default(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key, fallback] = take::<3>(args)?;
    let data = dict(&d)?;
    let found = data.items.borrow().get(&Key(key)).cloned();
    Ok(found.unwrap_or(fallback))
}

fn run_try_get(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key] = take::<2>(args)?;
    let data = dict(&d)?;
    let found = data.items.borrow().get(&Key(key)).cloned();
    Ok(found.map_or_else(none_value, some_value))
}

fn run_insert(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key, value] = take::<3>(args)?;
    let data = dict(&d)?;
    check_mutable(data.as_ref())?;
    let mut items = data.items.borrow_mut();
    if items.contains_key(&Key(key.clone())) {
        return Err(EastError::new(format!(
            "dict key {} already present",
            describe_key(type_args, &key)
        )));
    }
    items.insert(Key(key), value);
    Ok(Value::Null)
}

fn run_update(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key, value] = take::<3>(args)?;
    let data = dict(&d)?;
    check_mutable(data.as_ref())?;
    let mut items = data.items.borrow_mut();
    match items.get_mut(&Key(key.clone())) {
        Some(slot) => {
            *slot = value;
            Ok(Value::Null)
        }
        None => Err(missing(type_args, &key)),
    }
}

/// Replace the value at `key`, returning the previous value.
fn run_swap(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key, value] = take::<3>(args)?;
    let data = dict(&d)?;
    check_mutable(data.as_ref())?;
    let mut items = data.items.borrow_mut();
    match items.get_mut(&Key(key.clone())) {
        Some(slot) => Ok(std::mem::replace(slot, value)),
        None => Err(missing(type_args, &key)),
    }
}

fn run_delete(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key] = take::<2>(args)?;
    let data = dict(&d)?;
    check_mutable(data.as_ref())?;
    if data.items.borrow_mut().remove(&Key(key.clone())).is_none() {
        return Err(missing(type_args, &key));
    }
    Ok(Value::Null)
}

fn run_pop(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key] = take::<2>(args)?;
    let data = dict(&d)?;
    check_mutable(data.as_ref())?;
    data.items
        .borrow_mut()
        .remove(&Key(key.clone()))
        .ok_or_else(|| missing(type_args, &key))
}

fn run_get_or_insert(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key, fallback] = take::<3>(args)?;
    let data = dict(&d)?;
    let key = Key(key);
    if let Some(found) = data.items.borrow().get(&key).cloned() {
        return Ok(found);
    }
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().insert(key, fallback.clone());
    Ok(fallback)
}

fn run_insert_or_update(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key, value] = take::<3>(args)?;
    let data = dict(&d)?;
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().insert(Key(key), value);
    Ok(Value::Null)
}

/// Combine into an existing entry: `dict[key] := combiner(old, value)`.
/// The key must already be present.
fn run_merge(type_args: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, key, value, combiner] = take::<4>(args)?;
    let data = dict(&d)?;
    check_mutable(data.as_ref())?;
    let combiner = function(&combiner)?;
    let key = Key(key);
    let Some(old) = data.items.borrow().get(&key).cloned() else {
        return Err(EastError::new(format!(
            "merge into missing dict key {}",
            describe_key(type_args, &key.0)
        )));
    };
    let merged = call_sync(&combiner, vec![old, value])?;
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().insert(key, merged);
    Ok(Value::Null)
}

fn run_union_in_place(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, other, combiner] = take::<3>(args)?;
    let data = dict(&d)?;
    let other = dict(&other)?;
    check_mutable(data.as_ref())?;
    let combiner = function(&combiner)?;
    let entries: Vec<(Key, Value)> = other
        .items
        .borrow()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in entries {
        let old = data.items.borrow().get(&key).cloned();
        let merged = match old {
            Some(old) => call_sync(&combiner, vec![old, value])?,
            None => value,
        };
        check_mutable(data.as_ref())?;
        data.items.borrow_mut().insert(key, merged);
    }
    Ok(Value::Null)
}

fn run_merge_all(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [dicts, combiner] = take::<2>(args)?;
    let dicts = array(&dicts)?;
    let combiner = function(&combiner)?;
    let mut out: BTreeMap<Key, Value> = BTreeMap::new();
    let sources: Vec<Value> = dicts.items.borrow().clone();
    for source in sources {
        let source = dict(&source)?;
        let entries: Vec<(Key, Value)> = source
            .items
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in entries {
            let merged = match out.get(&key).cloned() {
                Some(old) => call_sync(&combiner, vec![old, value])?,
                None => value,
            };
            out.insert(key, merged);
        }
    }
    Ok(Value::Dict(DictData::new(out)))
}

fn run_keys(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d] = take::<1>(args)?;
    let data = dict(&d)?;
    let keys: std::collections::BTreeSet<Key> =
        data.items.borrow().keys().cloned().collect();
    Ok(Value::Set(east_core::value::SetData::new(keys)))
}

fn run_get_keys(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d] = take::<1>(args)?;
    let data = dict(&d)?;
    let keys: Vec<Value> = data.items.borrow().keys().map(|k| k.0.clone()).collect();
    Ok(Value::array(keys))
}

fn run_copy(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d] = take::<1>(args)?;
    let data = dict(&d)?;
    let items = data.items.borrow().clone();
    Ok(Value::Dict(DictData::new(items)))
}

/// The body receives `(value, key)`, matching `For` over a dict.
fn run_for_each(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, body] = take::<2>(args)?;
    let data = dict(&d)?;
    let body = function(&body)?;
    guarded_walk(&data, |key, value| {
        call_sync(&body, vec![value, key.0]).map(|_| ())
    })?;
    Ok(Value::Null)
}

fn run_map(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, mapper] = take::<2>(args)?;
    let data = dict(&d)?;
    let mapper = function(&mapper)?;
    let mut out = BTreeMap::new();
    guarded_walk(&data, |key, value| {
        out.insert(key, call_sync(&mapper, vec![value])?);
        Ok(())
    })?;
    Ok(Value::Dict(DictData::new(out)))
}

fn run_filter(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, predicate] = take::<2>(args)?;
    let data = dict(&d)?;
    let predicate = function(&predicate)?;
    let mut out = BTreeMap::new();
    guarded_walk(&data, |key, value| {
        if matches!(
            call_sync(&predicate, vec![value.clone()])?,
            Value::Boolean(true)
        ) {
            out.insert(key, value);
        }
        Ok(())
    })?;
    Ok(Value::Dict(DictData::new(out)))
}

fn run_fold(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d, initial, folder] = take::<3>(args)?;
    let data = dict(&d)?;
    let folder = function(&folder)?;
    let mut acc = initial;
    guarded_walk(&data, |_, value| {
        acc = call_sync(&folder, vec![acc.clone(), value])?;
        Ok(())
    })?;
    Ok(acc)
}

fn run_to_array(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [d] = take::<1>(args)?;
    let data = dict(&d)?;
    let items: Vec<Value> = data
        .items
        .borrow()
        .iter()
        .map(|(k, v)| Value::structure(vec![k.0.clone(), v.clone()]))
        .collect();
    Ok(Value::array(items))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    let k = || TPat::Param(0);
    let v = || TPat::Param(1);
    let d = || TPat::Dict(Box::new(TPat::Param(0)), Box::new(TPat::Param(1)));
    let kv = || vec![ParamKind::Immutable, ParamKind::Data];

    defs.push(def(
        "DictGenerate",
        kv(),
        vec![
            TPat::Integer,
            TPat::Func(vec![TPat::Integer], Box::new(k())),
            TPat::Func(vec![TPat::Integer], Box::new(v())),
        ],
        d(),
        run_generate,
    ));
    defs.push(def("DictSize", kv(), vec![d()], TPat::Integer, run_size));
    defs.push(def("DictHas", kv(), vec![d(), k()], TPat::Boolean, run_has));
    defs.push(def("DictGet", kv(), vec![d(), k()], v(), run_get));
    defs.push(def(
        "DictGetOrDefault",
        kv(),
        vec![d(), k(), v()],
        v(),
        run_get_or_default,
    ));
    defs.push(def("DictTryGet", kv(), vec![d(), k()], option_pat(1), run_try_get));
    defs.push(def("DictInsert", kv(), vec![d(), k(), v()], TPat::Null, run_insert));
    defs.push(def("DictUpdate", kv(), vec![d(), k(), v()], TPat::Null, run_update));
    defs.push(def("DictSwap", kv(), vec![d(), k(), v()], v(), run_swap));
    defs.push(def("DictDelete", kv(), vec![d(), k()], TPat::Null, run_delete));
    defs.push(def("DictPop", kv(), vec![d(), k()], v(), run_pop));
    defs.push(def(
        "DictGetOrInsert",
        kv(),
        vec![d(), k(), v()],
        v(),
        run_get_or_insert,
    ));
    defs.push(def(
        "DictInsertOrUpdate",
        kv(),
        vec![d(), k(), v()],
        TPat::Null,
        run_insert_or_update,
    ));
    defs.push(def(
        "DictMerge",
        kv(),
        vec![
            d(),
            k(),
            v(),
            TPat::Func(vec![v(), v()], Box::new(v())),
        ],
        TPat::Null,
        run_merge,
    ));
    defs.push(def(
        "DictUnionInPlace",
        kv(),
        vec![d(), d(), TPat::Func(vec![v(), v()], Box::new(v()))],
        TPat::Null,
        run_union_in_place,
    ));
    defs.push(def(
        "DictMergeAll",
        kv(),
        vec![
            TPat::Array(Box::new(d())),
            TPat::Func(vec![v(), v()], Box::new(v())),
        ],
        d(),
        run_merge_all,
    ));
    defs.push(def(
        "DictKeys",
        kv(),
        vec![d()],
        TPat::Set(Box::new(TPat::Param(0))),
        run_keys,
    ));
    defs.push(def(
        "DictGetKeys",
        kv(),
        vec![d()],
        TPat::Array(Box::new(TPat::Param(0))),
        run_get_keys,
    ));
    defs.push(def("DictCopy", kv(), vec![d()], d(), run_copy));
    defs.push(def(
        "DictForEach",
        kv(),
        vec![d(), TPat::Func(vec![v(), k()], Box::new(TPat::Null))],
        TPat::Null,
        run_for_each,
    ));
    defs.push(def(
        "DictMap",
        vec![ParamKind::Immutable, ParamKind::Data, ParamKind::Data],
        vec![d(), TPat::Func(vec![v()], Box::new(TPat::Param(2)))],
        TPat::Dict(Box::new(TPat::Param(0)), Box::new(TPat::Param(2))),
        run_map,
    ));
    defs.push(def(
        "DictFilter",
        kv(),
        vec![d(), TPat::Func(vec![v()], Box::new(TPat::Boolean))],
        d(),
        run_filter,
    ));
    defs.push(def(
        "DictFold",
        vec![ParamKind::Immutable, ParamKind::Data, ParamKind::Data],
        vec![
            d(),
            TPat::Param(2),
            TPat::Func(vec![TPat::Param(2), v()], Box::new(TPat::Param(2))),
        ],
        TPat::Param(2),
        run_fold,
    ));
    defs.push(def(
        "DictToArray",
        kv(),
        vec![d()],
        TPat::Array(Box::new(TPat::Struct(vec![
            ("key", TPat::Param(0)),
            ("value", TPat::Param(1)),
        ]))),
        run_to_array,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use east_core::values_equal;

    fn sample() -> Value {
        Value::dict_of([
            (Value::string("a"), Value::Integer(10)),
            (Value::string("b"), Value::Integer(20)),
        ])
    }

    fn string_key() -> Vec<Type> {
        vec![Type::String, Type::Integer]
    }

    #[test]
    fn test_strict_insert_and_update() {
        let d = sample();
        let err = run_insert(
            &string_key(),
            vec![d.clone(), Value::string("a"), Value::Integer(1)],
        )
        .unwrap_err();
        assert!(err.message.contains("already present"));
        let err = run_update(
            &string_key(),
            vec![d.clone(), Value::string("zz"), Value::Integer(1)],
        )
        .unwrap_err();
        assert!(err.message.contains("not found"));
        run_insert_or_update(
            &string_key(),
            vec![d.clone(), Value::string("a"), Value::Integer(1)],
        )
        .unwrap();
        let got = run_get(&string_key(), vec![d, Value::string("a")]).unwrap();
        assert!(matches!(got, Value::Integer(1)));
    }

    #[test]
    fn test_merge_requires_existing_key() {
        let d = sample();
        let f = Value::Function(Rc::new(east_core::FunctionData {
            ty: Type::function(vec![], Type::Null, Default::default()),
            ir: None,
            callable: east_core::Callable::Unlinked,
        }));
        let err = run_merge(
            &string_key(),
            vec![d, Value::string("zz"), Value::Integer(1), f],
        )
        .unwrap_err();
        assert!(err.message.contains("merge into missing dict key"));
    }

    #[test]
    fn test_to_array_pairs() {
        let d = sample();
        let pairs = run_to_array(&string_key(), vec![d]).unwrap();
        let expected = Value::array(vec![
            Value::structure(vec![Value::string("a"), Value::Integer(10)]),
            Value::structure(vec![Value::string("b"), Value::Integer(20)]),
        ]);
        assert!(values_equal(&pairs, &expected));
    }
}
