//! Array builtins
//!
//! In-place operations check the iteration guard before touching the
//! cell; walking operations (`forEach`, `map`, `fold`, ...) hold an
//! [`IterGuard`] for the duration, so a callback that tries to mutate the
//! array it is walking faults. Callbacks run with no `RefCell` borrow
//! held; elements are read by index and cloned out first.

use crate::operands::{array, call_sync, function, integer, take};
use crate::registry::{BuiltinDef, ParamKind, TPat, def, none_value, option_pat, some_value};
use east_core::value::{ArrayData, Key, cmp_values, values_equal};
use east_core::{EastError, IterGuard, Type, Value, check_mutable};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

fn oob(index: i64, size: usize) -> EastError {
    EastError::new(format!("Array index {index} out of bounds (size {size})"))
}

fn checked_index(data: &ArrayData, index: i64) -> Result<usize, EastError> {
    let size = data.items.borrow().len();
    usize::try_from(index)
        .ok()
        .filter(|i| *i < size)
        .ok_or_else(|| oob(index, size))
}

/// Read element `i` without holding the borrow.
fn item_at(data: &ArrayData, i: usize) -> Option<Value> {
    data.items.borrow().get(i).cloned()
}

fn run_generate(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [count, producer] = take::<2>(args)?;
    let count = integer(&count)?.max(0);
    let producer = function(&producer)?;
    let mut items = Vec::with_capacity(count.min(1024) as usize);
    for i in 0..count {
        items.push(call_sync(&producer, vec![Value::Integer(i)])?);
    }
    Ok(Value::array(items))
}

fn run_size(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    Ok(Value::Integer(array(&a)?.items.borrow().len() as i64))
}

fn run_has(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index] = take::<2>(args)?;
    let data = array(&a)?;
    let size = data.items.borrow().len();
    let index = integer(&index)?;
    Ok(Value::Boolean(index >= 0 && (index as usize) < size))
}

fn run_get(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index] = take::<2>(args)?;
    let data = array(&a)?;
    let i = checked_index(&data, integer(&index)?)?;
    Ok(item_at(&data, i).ok_or_else(|| oob(i as i64, 0))?)
}

fn run_get_or_default(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index, fallback] = take::<3>(args)?;
    let data = array(&a)?;
    let index = integer(&index)?;
    Ok(usize::try_from(index)
        .ok()
        .and_then(|i| item_at(&data, i))
        .unwrap_or(fallback))
}

fn run_try_get(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index] = take::<2>(args)?;
    let data = array(&a)?;
    Ok(usize::try_from(integer(&index)?)
        .ok()
        .and_then(|i| item_at(&data, i))
        .map_or_else(none_value, some_value))
}

fn run_set(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index, value] = take::<3>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    let i = checked_index(&data, integer(&index)?)?;
    data.items.borrow_mut()[i] = value;
    Ok(Value::Null)
}

fn run_insert(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index, value] = take::<3>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    let size = data.items.borrow().len();
    let index = integer(&index)?;
    let i = usize::try_from(index)
        .ok()
        .filter(|i| *i <= size)
        .ok_or_else(|| oob(index, size))?;
    data.items.borrow_mut().insert(i, value);
    Ok(Value::Null)
}

fn run_delete(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index] = take::<2>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    let i = checked_index(&data, integer(&index)?)?;
    data.items.borrow_mut().remove(i);
    Ok(Value::Null)
}

fn run_pop(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, index] = take::<2>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    let i = checked_index(&data, integer(&index)?)?;
    Ok(data.items.borrow_mut().remove(i))
}

fn run_push(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, value] = take::<2>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().push(value);
    Ok(Value::Null)
}

fn run_pop_first(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    let mut items = data.items.borrow_mut();
    if items.is_empty() {
        return Err(EastError::new("popFirst on empty array"));
    }
    Ok(items.remove(0))
}

fn run_pop_last(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    data.items
        .borrow_mut()
        .pop()
        .ok_or_else(|| EastError::new("popLast on empty array"))
}

fn run_concat(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, b] = take::<2>(args)?;
    let (a, b) = (array(&a)?, array(&b)?);
    let mut items = a.items.borrow().clone();
    items.extend(b.items.borrow().iter().cloned());
    Ok(Value::array(items))
}

fn run_slice(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, start, end] = take::<3>(args)?;
    let data = array(&a)?;
    let items = data.items.borrow();
    let from = integer(&start)?.clamp(0, items.len() as i64) as usize;
    let to = integer(&end)?.clamp(from as i64, items.len() as i64) as usize;
    Ok(Value::array(items[from..to].to_vec()))
}

fn run_append(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, value] = take::<2>(args)?;
    let data = array(&a)?;
    let mut items = data.items.borrow().clone();
    items.push(value);
    Ok(Value::array(items))
}

fn run_prepend(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, value] = take::<2>(args)?;
    let data = array(&a)?;
    let mut items = vec![value];
    items.extend(data.items.borrow().iter().cloned());
    Ok(Value::array(items))
}

fn run_sort(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().sort_by(cmp_values);
    Ok(Value::Null)
}

fn run_sorted(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    let mut items = data.items.borrow().clone();
    items.sort_by(cmp_values);
    Ok(Value::array(items))
}

fn run_reverse(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().reverse();
    Ok(Value::Null)
}

fn run_reversed(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    let mut items = data.items.borrow().clone();
    items.reverse();
    Ok(Value::array(items))
}

fn run_find(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, needle] = take::<2>(args)?;
    let data = array(&a)?;
    let items = data.items.borrow();
    Ok(Value::Integer(
        items
            .iter()
            .position(|item| values_equal(item, &needle))
            .map_or(-1, |i| i as i64),
    ))
}

/// Binary search in an array sorted by the canonical order.
fn run_find_sorted(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, needle] = take::<2>(args)?;
    let data = array(&a)?;
    let items = data.items.borrow();
    Ok(Value::Integer(
        items
            .binary_search_by(|item| cmp_values(item, &needle))
            .map_or(-1, |i| i as i64),
    ))
}

fn run_copy(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    Ok(Value::array(data.items.borrow().clone()))
}

/// Iterate with the guard held; reads go one index at a time so the body
/// runs without any live borrow.
fn guarded_walk(
    data: &Rc<ArrayData>,
    mut visit: impl FnMut(usize, Value) -> Result<(), EastError>,
) -> Result<(), EastError> {
    let _guard = IterGuard::new(data.clone());
    let mut i = 0usize;
    loop {
        let Some(item) = item_at(data, i) else {
            return Ok(());
        };
        visit(i, item)?;
        i += 1;
    }
}

fn run_for_each(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, body] = take::<2>(args)?;
    let data = array(&a)?;
    let body = function(&body)?;
    guarded_walk(&data, |_, item| {
        call_sync(&body, vec![item]).map(|_| ())
    })?;
    Ok(Value::Null)
}

fn run_map(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, mapper] = take::<2>(args)?;
    let data = array(&a)?;
    let mapper = function(&mapper)?;
    let mut out = Vec::with_capacity(data.items.borrow().len());
    guarded_walk(&data, |_, item| {
        out.push(call_sync(&mapper, vec![item])?);
        Ok(())
    })?;
    Ok(Value::array(out))
}

fn run_filter(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, predicate] = take::<2>(args)?;
    let data = array(&a)?;
    let predicate = function(&predicate)?;
    let mut out = Vec::new();
    guarded_walk(&data, |_, item| {
        if matches!(call_sync(&predicate, vec![item.clone()])?, Value::Boolean(true)) {
            out.push(item);
        }
        Ok(())
    })?;
    Ok(Value::array(out))
}

fn option_of(value: Value) -> Result<Option<Value>, EastError> {
    match value {
        Value::Variant(data) if data.case == "some" => Ok(Some(data.value.clone())),
        Value::Variant(data) if data.case == "none" => Ok(None),
        _ => Err(EastError::new("expected a none/some variant")),
    }
}

fn run_filter_map(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, mapper] = take::<2>(args)?;
    let data = array(&a)?;
    let mapper = function(&mapper)?;
    let mut out = Vec::new();
    guarded_walk(&data, |_, item| {
        if let Some(mapped) = option_of(call_sync(&mapper, vec![item])?)? {
            out.push(mapped);
        }
        Ok(())
    })?;
    Ok(Value::array(out))
}

fn run_first_map(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, mapper] = take::<2>(args)?;
    let data = array(&a)?;
    let mapper = function(&mapper)?;
    let mut found = None;
    let _guard = IterGuard::new(data.clone());
    let mut i = 0usize;
    while let Some(item) = item_at(&data, i) {
        if let Some(mapped) = option_of(call_sync(&mapper, vec![item])?)? {
            found = Some(mapped);
            break;
        }
        i += 1;
    }
    Ok(found.map_or_else(none_value, some_value))
}

fn run_fold(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, initial, folder] = take::<3>(args)?;
    let data = array(&a)?;
    let folder = function(&folder)?;
    let mut acc = initial;
    guarded_walk(&data, |_, item| {
        acc = call_sync(&folder, vec![acc.clone(), item])?;
        Ok(())
    })?;
    Ok(acc)
}

fn run_reduce(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, reducer] = take::<2>(args)?;
    let data = array(&a)?;
    let reducer = function(&reducer)?;
    let Some(first) = item_at(&data, 0) else {
        return Err(EastError::new("reduce of empty array"));
    };
    let mut acc = first;
    let _guard = IterGuard::new(data.clone());
    let mut i = 1usize;
    while let Some(item) = item_at(&data, i) {
        acc = call_sync(&reducer, vec![acc, item])?;
        i += 1;
    }
    Ok(acc)
}

fn run_map_reduce(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, mapper, reducer] = take::<3>(args)?;
    let data = array(&a)?;
    let mapper = function(&mapper)?;
    let reducer = function(&reducer)?;
    let Some(first) = item_at(&data, 0) else {
        return Err(EastError::new("mapReduce of empty array"));
    };
    let _guard = IterGuard::new(data.clone());
    let mut acc = call_sync(&mapper, vec![first])?;
    let mut i = 1usize;
    while let Some(item) = item_at(&data, i) {
        let mapped = call_sync(&mapper, vec![item])?;
        acc = call_sync(&reducer, vec![acc, mapped])?;
        i += 1;
    }
    Ok(acc)
}

fn run_to_set(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    let items: BTreeSet<Key> = data.items.borrow().iter().cloned().map(Key).collect();
    Ok(Value::Set(east_core::value::SetData::new(items)))
}

/// Later items win on key collisions.
fn run_to_dict(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, keyer] = take::<2>(args)?;
    let data = array(&a)?;
    let keyer = function(&keyer)?;
    let mut out = BTreeMap::new();
    guarded_walk(&data, |_, item| {
        let key = call_sync(&keyer, vec![item.clone()])?;
        out.insert(Key(key), item);
        Ok(())
    })?;
    Ok(Value::Dict(east_core::value::DictData::new(out)))
}

fn run_flatten_to_array(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    let mut out = Vec::new();
    for item in data.items.borrow().iter() {
        let inner = array(item)?;
        out.extend(inner.items.borrow().iter().cloned());
    }
    Ok(Value::array(out))
}

fn run_flatten_to_set(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    let mut out = BTreeSet::new();
    for item in data.items.borrow().iter() {
        let inner = crate::operands::set(item)?;
        out.extend(inner.items.borrow().iter().cloned());
    }
    Ok(Value::Set(east_core::value::SetData::new(out)))
}

/// Later dicts win on key collisions.
fn run_flatten_to_dict(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a] = take::<1>(args)?;
    let data = array(&a)?;
    let mut out = BTreeMap::new();
    for item in data.items.borrow().iter() {
        let inner = crate::operands::dict(item)?;
        for (k, v) in inner.items.borrow().iter() {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(Value::Dict(east_core::value::DictData::new(out)))
}

/// Group by key, folding each group from a copy of the initial
/// accumulator.
fn run_group_fold(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [a, keyer, initial, folder] = take::<4>(args)?;
    let data = array(&a)?;
    let keyer = function(&keyer)?;
    let folder = function(&folder)?;
    let mut out: BTreeMap<Key, Value> = BTreeMap::new();
    guarded_walk(&data, |_, item| {
        let key = Key(call_sync(&keyer, vec![item.clone()])?);
        let acc = out.get(&key).cloned().unwrap_or_else(|| initial.clone());
        let folded = call_sync(&folder, vec![acc, item])?;
        out.insert(key, folded);
        Ok(())
    })?;
    Ok(Value::Dict(east_core::value::DictData::new(out)))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    let e = || TPat::Param(0);
    let arr = || TPat::Array(Box::new(TPat::Param(0)));
    let data = vec![ParamKind::Data];
    let data2 = vec![ParamKind::Data, ParamKind::Data];

    defs.push(def(
        "ArrayGenerate",
        data.clone(),
        vec![TPat::Integer, TPat::Func(vec![TPat::Integer], Box::new(e()))],
        arr(),
        run_generate,
    ));
    defs.push(def("ArraySize", data.clone(), vec![arr()], TPat::Integer, run_size));
    defs.push(def(
        "ArrayHas",
        data.clone(),
        vec![arr(), TPat::Integer],
        TPat::Boolean,
        run_has,
    ));
    defs.push(def(
        "ArrayGet",
        data.clone(),
        vec![arr(), TPat::Integer],
        e(),
        run_get,
    ));
    defs.push(def(
        "ArrayGetOrDefault",
        data.clone(),
        vec![arr(), TPat::Integer, e()],
        e(),
        run_get_or_default,
    ));
    defs.push(def(
        "ArrayTryGet",
        data.clone(),
        vec![arr(), TPat::Integer],
        option_pat(0),
        run_try_get,
    ));
    defs.push(def(
        "ArraySet",
        data.clone(),
        vec![arr(), TPat::Integer, e()],
        TPat::Null,
        run_set,
    ));
    defs.push(def(
        "ArrayInsert",
        data.clone(),
        vec![arr(), TPat::Integer, e()],
        TPat::Null,
        run_insert,
    ));
    defs.push(def(
        "ArrayDelete",
        data.clone(),
        vec![arr(), TPat::Integer],
        TPat::Null,
        run_delete,
    ));
    defs.push(def(
        "ArrayPop",
        data.clone(),
        vec![arr(), TPat::Integer],
        e(),
        run_pop,
    ));
    defs.push(def("ArrayPush", data.clone(), vec![arr(), e()], TPat::Null, run_push));
    defs.push(def("ArrayPopFirst", data.clone(), vec![arr()], e(), run_pop_first));
    defs.push(def("ArrayPopLast", data.clone(), vec![arr()], e(), run_pop_last));
    defs.push(def("ArrayConcat", data.clone(), vec![arr(), arr()], arr(), run_concat));
    defs.push(def(
        "ArraySlice",
        data.clone(),
        vec![arr(), TPat::Integer, TPat::Integer],
        arr(),
        run_slice,
    ));
    defs.push(def("ArrayAppend", data.clone(), vec![arr(), e()], arr(), run_append));
    defs.push(def("ArrayPrepend", data.clone(), vec![arr(), e()], arr(), run_prepend));
    defs.push(def("ArraySort", data.clone(), vec![arr()], TPat::Null, run_sort));
    defs.push(def("ArraySorted", data.clone(), vec![arr()], arr(), run_sorted));
    defs.push(def("ArrayReverse", data.clone(), vec![arr()], TPat::Null, run_reverse));
    defs.push(def("ArrayReversed", data.clone(), vec![arr()], arr(), run_reversed));
    defs.push(def(
        "ArrayFind",
        data.clone(),
        vec![arr(), e()],
        TPat::Integer,
        run_find,
    ));
    defs.push(def(
        "ArrayFindSorted",
        data.clone(),
        vec![arr(), e()],
        TPat::Integer,
        run_find_sorted,
    ));
    defs.push(def("ArrayCopy", data.clone(), vec![arr()], arr(), run_copy));
    defs.push(def(
        "ArrayForEach",
        data.clone(),
        vec![arr(), TPat::Func(vec![e()], Box::new(TPat::Null))],
        TPat::Null,
        run_for_each,
    ));
    defs.push(def(
        "ArrayMap",
        data2.clone(),
        vec![arr(), TPat::Func(vec![e()], Box::new(TPat::Param(1)))],
        TPat::Array(Box::new(TPat::Param(1))),
        run_map,
    ));
    defs.push(def(
        "ArrayFilter",
        data.clone(),
        vec![arr(), TPat::Func(vec![e()], Box::new(TPat::Boolean))],
        arr(),
        run_filter,
    ));
    defs.push(def(
        "ArrayFilterMap",
        data2.clone(),
        vec![arr(), TPat::Func(vec![e()], Box::new(option_pat(1)))],
        TPat::Array(Box::new(TPat::Param(1))),
        run_filter_map,
    ));
    defs.push(def(
        "ArrayFirstMap",
        data2.clone(),
        vec![arr(), TPat::Func(vec![e()], Box::new(option_pat(1)))],
        option_pat(1),
        run_first_map,
    ));
    defs.push(def(
        "ArrayFold",
        data2.clone(),
        vec![
            arr(),
            TPat::Param(1),
            TPat::Func(vec![TPat::Param(1), e()], Box::new(TPat::Param(1))),
        ],
        TPat::Param(1),
        run_fold,
    ));
    defs.push(def(
        "ArrayReduce",
        data.clone(),
        vec![arr(), TPat::Func(vec![e(), e()], Box::new(e()))],
        e(),
        run_reduce,
    ));
    defs.push(def(
        "ArrayMapReduce",
        data2.clone(),
        vec![
            arr(),
            TPat::Func(vec![e()], Box::new(TPat::Param(1))),
            TPat::Func(
                vec![TPat::Param(1), TPat::Param(1)],
                Box::new(TPat::Param(1)),
            ),
        ],
        TPat::Param(1),
        run_map_reduce,
    ));
    defs.push(def(
        "ArrayToSet",
        vec![ParamKind::Immutable],
        vec![arr()],
        TPat::Set(Box::new(TPat::Param(0))),
        run_to_set,
    ));
    defs.push(def(
        "ArrayToDict",
        vec![ParamKind::Data, ParamKind::Immutable],
        vec![arr(), TPat::Func(vec![e()], Box::new(TPat::Param(1)))],
        TPat::Dict(Box::new(TPat::Param(1)), Box::new(TPat::Param(0))),
        run_to_dict,
    ));
    defs.push(def(
        "ArrayFlattenToArray",
        data.clone(),
        vec![TPat::Array(Box::new(arr()))],
        arr(),
        run_flatten_to_array,
    ));
    defs.push(def(
        "ArrayFlattenToSet",
        vec![ParamKind::Immutable],
        vec![TPat::Array(Box::new(TPat::Set(Box::new(TPat::Param(0)))))],
        TPat::Set(Box::new(TPat::Param(0))),
        run_flatten_to_set,
    ));
    defs.push(def(
        "ArrayFlattenToDict",
        vec![ParamKind::Immutable, ParamKind::Data],
        vec![TPat::Array(Box::new(TPat::Dict(
            Box::new(TPat::Param(0)),
            Box::new(TPat::Param(1)),
        )))],
        TPat::Dict(Box::new(TPat::Param(0)), Box::new(TPat::Param(1))),
        run_flatten_to_dict,
    ));
    defs.push(def(
        "ArrayGroupFold",
        vec![ParamKind::Data, ParamKind::Immutable, ParamKind::Data],
        vec![
            arr(),
            TPat::Func(vec![e()], Box::new(TPat::Param(1))),
            TPat::Param(2),
            TPat::Func(vec![TPat::Param(2), e()], Box::new(TPat::Param(2))),
        ],
        TPat::Dict(Box::new(TPat::Param(1)), Box::new(TPat::Param(2))),
        run_group_fold,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds_message() {
        let a = Value::array(vec![
            Value::Integer(10),
            Value::Integer(20),
            Value::Integer(30),
        ]);
        let err = run_get(&[], vec![a, Value::Integer(4)]).unwrap_err();
        assert!(err.message.contains("Array index 4 out of bounds"));
    }

    #[test]
    fn test_pure_ops_do_not_mutate() {
        let a = Value::array(vec![Value::Integer(2), Value::Integer(1)]);
        let sorted = run_sorted(&[], vec![a.clone()]).unwrap();
        assert!(values_equal(
            &sorted,
            &Value::array(vec![Value::Integer(1), Value::Integer(2)])
        ));
        assert!(values_equal(
            &a,
            &Value::array(vec![Value::Integer(2), Value::Integer(1)])
        ));
    }

    #[test]
    fn test_slice_clamps() {
        let a = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        let sliced = run_slice(&[], vec![a, Value::Integer(-3), Value::Integer(99)]).unwrap();
        assert!(values_equal(
            &sliced,
            &Value::array(vec![Value::Integer(1), Value::Integer(2)])
        ));
    }

    #[test]
    fn test_empty_reduce_faults() {
        let a = Value::array(vec![]);
        // A reduce over an empty array cannot invoke its callback; a
        // dummy unlinked function is enough to observe the fault.
        let f = Value::Function(Rc::new(east_core::FunctionData {
            ty: Type::function(vec![], Type::Null, Default::default()),
            ir: None,
            callable: east_core::Callable::Unlinked,
        }));
        let err = run_reduce(&[], vec![a, f]).unwrap_err();
        assert!(err.message.contains("reduce of empty array"));
    }
}
