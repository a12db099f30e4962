//! Set builtins
//!
//! Keys are immutable values in the canonical order, so the minimum
//! element is well-defined and iteration order is deterministic.
//! Guarded walks read one key at a time through a range cursor; no
//! borrow is live while a callback runs.

use crate::operands::{call_sync, function, integer, set, take};
use crate::registry::{BuiltinDef, ParamKind, TPat, def};
use east_core::value::{Key, SetData};
use east_core::{EastError, IterGuard, Type, Value, check_mutable};
use std::collections::BTreeSet;
use std::ops::Bound;
use std::rc::Rc;

/// First key strictly above `after`, without holding the borrow.
fn next_key(data: &SetData, after: Option<&Key>) -> Option<Key> {
    let items = data.items.borrow();
    match after {
        None => items.iter().next().cloned(),
        Some(key) => items
            .range((Bound::Excluded(key.clone()), Bound::Unbounded))
            .next()
            .cloned(),
    }
}

fn guarded_walk(
    data: &Rc<SetData>,
    mut visit: impl FnMut(Key) -> Result<(), EastError>,
) -> Result<(), EastError> {
    let _guard = IterGuard::new(data.clone());
    let mut cursor: Option<Key> = None;
    while let Some(key) = next_key(data, cursor.as_ref()) {
        visit(key.clone())?;
        cursor = Some(key);
    }
    Ok(())
}

fn run_generate(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [count, producer] = take::<2>(args)?;
    let count = integer(&count)?.max(0);
    let producer = function(&producer)?;
    let mut items = BTreeSet::new();
    for i in 0..count {
        items.insert(Key(call_sync(&producer, vec![Value::Integer(i)])?));
    }
    Ok(Value::Set(SetData::new(items)))
}

fn run_size(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    Ok(Value::Integer(set(&s)?.items.borrow().len() as i64))
}

fn run_has(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, key] = take::<2>(args)?;
    Ok(Value::Boolean(set(&s)?.items.borrow().contains(&Key(key))))
}

fn run_insert(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, key] = take::<2>(args)?;
    let data = set(&s)?;
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().insert(Key(key));
    Ok(Value::Null)
}

fn run_delete(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, key] = take::<2>(args)?;
    let data = set(&s)?;
    check_mutable(data.as_ref())?;
    data.items.borrow_mut().remove(&Key(key));
    Ok(Value::Null)
}

/// Remove and return the minimum element.
fn run_pop(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    let data = set(&s)?;
    check_mutable(data.as_ref())?;
    let mut items = data.items.borrow_mut();
    let Some(first) = items.iter().next().cloned() else {
        return Err(EastError::new("minimum of empty set"));
    };
    items.remove(&first);
    Ok(first.0)
}

fn combine(
    args: Vec<Value>,
    merge: fn(&BTreeSet<Key>, &BTreeSet<Key>) -> BTreeSet<Key>,
) -> Result<(Rc<SetData>, BTreeSet<Key>), EastError> {
    let [a, b] = take::<2>(args)?;
    let (a, b) = (set(&a)?, set(&b)?);
    let result = if Rc::ptr_eq(&a, &b) {
        let items = a.items.borrow();
        merge(&items, &items)
    } else {
        let left = a.items.borrow();
        let right = b.items.borrow();
        merge(&left, &right)
    };
    Ok((a, result))
}

fn union_sets(a: &BTreeSet<Key>, b: &BTreeSet<Key>) -> BTreeSet<Key> {
    a.union(b).cloned().collect()
}

fn intersect_sets(a: &BTreeSet<Key>, b: &BTreeSet<Key>) -> BTreeSet<Key> {
    a.intersection(b).cloned().collect()
}

fn diff_sets(a: &BTreeSet<Key>, b: &BTreeSet<Key>) -> BTreeSet<Key> {
    a.difference(b).cloned().collect()
}

fn sym_diff_sets(a: &BTreeSet<Key>, b: &BTreeSet<Key>) -> BTreeSet<Key> {
    a.symmetric_difference(b).cloned().collect()
}

fn pure_op(
    merge: fn(&BTreeSet<Key>, &BTreeSet<Key>) -> BTreeSet<Key>,
) -> impl Fn(Vec<Value>) -> Result<Value, EastError> {
    move |args| {
        let (_, result) = combine(args, merge)?;
        Ok(Value::Set(SetData::new(result)))
    }
}

fn in_place_op(
    merge: fn(&BTreeSet<Key>, &BTreeSet<Key>) -> BTreeSet<Key>,
) -> impl Fn(Vec<Value>) -> Result<Value, EastError> {
    move |args| {
        let (target, result) = combine(args, merge)?;
        check_mutable(target.as_ref())?;
        *target.items.borrow_mut() = result;
        Ok(Value::Null)
    }
}

fn run_union(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    pure_op(union_sets)(args)
}

fn run_intersect(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    pure_op(intersect_sets)(args)
}

fn run_diff(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    pure_op(diff_sets)(args)
}

fn run_sym_diff(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    pure_op(sym_diff_sets)(args)
}

fn run_union_in_place(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    in_place_op(union_sets)(args)
}

fn run_intersect_in_place(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    in_place_op(intersect_sets)(args)
}

fn run_diff_in_place(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    in_place_op(diff_sets)(args)
}

fn run_sym_diff_in_place(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    in_place_op(sym_diff_sets)(args)
}

fn run_copy(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    let data = set(&s)?;
    let items = data.items.borrow().clone();
    Ok(Value::Set(SetData::new(items)))
}

fn run_for_each(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, body] = take::<2>(args)?;
    let data = set(&s)?;
    let body = function(&body)?;
    guarded_walk(&data, |key| call_sync(&body, vec![key.0]).map(|_| ()))?;
    Ok(Value::Null)
}

fn run_filter(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, predicate] = take::<2>(args)?;
    let data = set(&s)?;
    let predicate = function(&predicate)?;
    let mut out = BTreeSet::new();
    guarded_walk(&data, |key| {
        if matches!(
            call_sync(&predicate, vec![key.0.clone()])?,
            Value::Boolean(true)
        ) {
            out.insert(key);
        }
        Ok(())
    })?;
    Ok(Value::Set(SetData::new(out)))
}

fn run_fold(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, initial, folder] = take::<3>(args)?;
    let data = set(&s)?;
    let folder = function(&folder)?;
    let mut acc = initial;
    guarded_walk(&data, |key| {
        acc = call_sync(&folder, vec![acc.clone(), key.0])?;
        Ok(())
    })?;
    Ok(acc)
}

fn run_to_array(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s] = take::<1>(args)?;
    let data = set(&s)?;
    let items: Vec<Value> = data.items.borrow().iter().map(|k| k.0.clone()).collect();
    Ok(Value::array(items))
}

fn run_to_dict(_: &[Type], args: Vec<Value>) -> Result<Value, EastError> {
    let [s, valuer] = take::<2>(args)?;
    let data = set(&s)?;
    let valuer = function(&valuer)?;
    let mut out = std::collections::BTreeMap::new();
    guarded_walk(&data, |key| {
        let value = call_sync(&valuer, vec![key.0.clone()])?;
        out.insert(key, value);
        Ok(())
    })?;
    Ok(Value::Dict(east_core::value::DictData::new(out)))
}

pub(crate) fn install(defs: &mut Vec<BuiltinDef>) {
    let k = || TPat::Param(0);
    let st = || TPat::Set(Box::new(TPat::Param(0)));
    let imm = vec![ParamKind::Immutable];

    defs.push(def(
        "SetGenerate",
        imm.clone(),
        vec![TPat::Integer, TPat::Func(vec![TPat::Integer], Box::new(k()))],
        st(),
        run_generate,
    ));
    defs.push(def("SetSize", imm.clone(), vec![st()], TPat::Integer, run_size));
    defs.push(def("SetHas", imm.clone(), vec![st(), k()], TPat::Boolean, run_has));
    defs.push(def("SetInsert", imm.clone(), vec![st(), k()], TPat::Null, run_insert));
    defs.push(def("SetDelete", imm.clone(), vec![st(), k()], TPat::Null, run_delete));
    defs.push(def("SetPop", imm.clone(), vec![st()], k(), run_pop));
    let pure_defs: [(&'static str, crate::registry::Run); 4] = [
        ("SetUnion", run_union),
        ("SetIntersect", run_intersect),
        ("SetDiff", run_diff),
        ("SetSymDiff", run_sym_diff),
    ];
    for (name, run) in pure_defs {
        defs.push(def(name, imm.clone(), vec![st(), st()], st(), run));
    }
    let in_place_defs: [(&'static str, crate::registry::Run); 4] = [
        ("SetUnionInPlace", run_union_in_place),
        ("SetIntersectInPlace", run_intersect_in_place),
        ("SetDiffInPlace", run_diff_in_place),
        ("SetSymDiffInPlace", run_sym_diff_in_place),
    ];
    for (name, run) in in_place_defs {
        defs.push(def(name, imm.clone(), vec![st(), st()], TPat::Null, run));
    }
    defs.push(def("SetCopy", imm.clone(), vec![st()], st(), run_copy));
    defs.push(def(
        "SetForEach",
        imm.clone(),
        vec![st(), TPat::Func(vec![k()], Box::new(TPat::Null))],
        TPat::Null,
        run_for_each,
    ));
    defs.push(def(
        "SetFilter",
        imm.clone(),
        vec![st(), TPat::Func(vec![k()], Box::new(TPat::Boolean))],
        st(),
        run_filter,
    ));
    defs.push(def(
        "SetFold",
        vec![ParamKind::Immutable, ParamKind::Data],
        vec![
            st(),
            TPat::Param(1),
            TPat::Func(vec![TPat::Param(1), k()], Box::new(TPat::Param(1))),
        ],
        TPat::Param(1),
        run_fold,
    ));
    defs.push(def(
        "SetToArray",
        imm.clone(),
        vec![st()],
        TPat::Array(Box::new(TPat::Param(0))),
        run_to_array,
    ));
    defs.push(def(
        "SetToDict",
        vec![ParamKind::Immutable, ParamKind::Data],
        vec![st(), TPat::Func(vec![k()], Box::new(TPat::Param(1)))],
        TPat::Dict(Box::new(TPat::Param(0)), Box::new(TPat::Param(1))),
        run_to_dict,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use east_core::values_equal;

    fn int_set(values: &[i64]) -> Value {
        Value::set_of(values.iter().map(|n| Value::Integer(*n)))
    }

    #[test]
    fn test_set_algebra() {
        let a = int_set(&[1, 2, 3]);
        let b = int_set(&[2, 3, 4]);
        assert!(values_equal(
            &run_union(&[], vec![a.clone(), b.clone()]).unwrap(),
            &int_set(&[1, 2, 3, 4])
        ));
        assert!(values_equal(
            &run_intersect(&[], vec![a.clone(), b.clone()]).unwrap(),
            &int_set(&[2, 3])
        ));
        assert!(values_equal(
            &run_diff(&[], vec![a.clone(), b.clone()]).unwrap(),
            &int_set(&[1])
        ));
        assert!(values_equal(
            &run_sym_diff(&[], vec![a, b]).unwrap(),
            &int_set(&[1, 4])
        ));
    }

    #[test]
    fn test_pop_takes_minimum() {
        let s = int_set(&[3, 1, 2]);
        let min = run_pop(&[], vec![s.clone()]).unwrap();
        assert!(matches!(min, Value::Integer(1)));
        let err = run_pop(&[], vec![int_set(&[])]).unwrap_err();
        assert!(err.message.contains("minimum of empty set"));
    }

    #[test]
    fn test_in_place_union_mutates_first() {
        let a = int_set(&[1]);
        let b = int_set(&[2]);
        run_union_in_place(&[], vec![a.clone(), b]).unwrap();
        assert!(values_equal(&a, &int_set(&[1, 2])));
    }
}
