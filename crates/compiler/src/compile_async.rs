//! Asynchronous closure compiler
//!
//! Used when the function being compiled transitively touches an async
//! platform. Every node whose subtree may await compiles to a factory of
//! single-threaded deferreds; subtrees the analyzer marked synchronous
//! are delegated to the sync compiler and lifted into ready futures, so
//! suspension points exist exactly where the analysis demands.
//!
//! Evaluation order is unchanged: strictly left-to-right within a node,
//! top-to-bottom within a block. Two chained async platform calls always
//! observe the first's completion before the second begins.

use crate::analyzer::{AExpr, AKind, BindingId};
use crate::compile::{
    CompileError, Control, CtlResult, Ctx, Scope, compile_expr, compile_function_value,
};
use crate::platform::{PlatformImpl, Platforms};
use east_core::value::{DictData, Key, SetData};
use east_core::{Callable, EastError, IterGuard, Location, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::ops::Bound;
use std::pin::Pin;
use std::rc::Rc;
use tracing::debug;

pub(crate) type LocalFut = Pin<Box<dyn Future<Output = CtlResult>>>;
pub(crate) type AsyncThunk = Rc<dyn Fn(Scope) -> LocalFut>;

/// Compile an analyzed async function literal into an async callable
/// value. The platform list must contain at least one async binding.
pub fn compile_async(analyzed: &Rc<AExpr>, platforms: &Platforms) -> Result<Value, CompileError> {
    if platforms.first_async().is_none() {
        return Err(CompileError::NoAsyncPlatform);
    }
    debug!("compile async");
    compile_function_value(analyzed, platforms)
}

fn internal(msg: &str) -> Control {
    Control::Error(EastError::new(format!("engine invariant violated: {msg}")))
}

fn err_at(e: EastError, location: Option<&Location>) -> Control {
    Control::Error(e.at(location))
}

fn loop_catches(label: &Option<String>, ctl_label: &Option<String>) -> bool {
    match ctl_label {
        None => true,
        Some(name) => label.as_deref() == Some(name.as_str()),
    }
}

fn next_set_key(data: &SetData, after: Option<&Key>) -> Option<Key> {
    let items = data.items.borrow();
    match after {
        None => items.iter().next().cloned(),
        Some(key) => items
            .range((Bound::Excluded(key.clone()), Bound::Unbounded))
            .next()
            .cloned(),
    }
}

fn next_dict_entry(data: &DictData, after: Option<&Key>) -> Option<(Key, Value)> {
    let items = data.items.borrow();
    match after {
        None => items.iter().next().map(|(k, v)| (k.clone(), v.clone())),
        Some(key) => items
            .range((Bound::Excluded(key.clone()), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())),
    }
}

async fn eval_all(arguments: &[AsyncThunk], scope: &Scope) -> Result<Vec<Value>, Control> {
    let mut values = Vec::with_capacity(arguments.len());
    for argument in arguments {
        values.push(argument(scope.clone()).await?);
    }
    Ok(values)
}

pub(crate) fn compile_async_expr(
    analyzed: &Rc<AExpr>,
    ctx: &Ctx,
) -> Result<AsyncThunk, CompileError> {
    // Synchronous subtrees run on the sync path; only nodes that may
    // await pay for a deferred.
    if !analyzed.is_async {
        let thunk = compile_expr(analyzed, ctx)?;
        return Ok(Rc::new(move |scope: Scope| {
            let result = thunk(&scope);
            Box::pin(std::future::ready(result))
        }));
    }
    let location = analyzed.location.clone();
    match &analyzed.kind {
        AKind::Block { statements, result } => {
            let statements: Vec<AsyncThunk> = statements
                .iter()
                .map(|s| compile_async_expr(s, ctx))
                .collect::<Result<_, _>>()?;
            let result = compile_async_expr(result, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let statements = statements.clone();
                let result = result.clone();
                Box::pin(async move {
                    for statement in &statements {
                        statement(scope.clone()).await?;
                    }
                    result(scope).await
                })
            }))
        }
        AKind::Let { binding, value } | AKind::Assign { binding, value } => {
            let binding = *binding;
            let value = compile_async_expr(value, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let value = value.clone();
                Box::pin(async move {
                    let evaluated = value(scope.clone()).await?;
                    scope.insert(binding, evaluated);
                    Ok(Value::Null)
                })
            }))
        }
        AKind::If {
            branches,
            otherwise,
        } => {
            let branches: Vec<(AsyncThunk, AsyncThunk)> = branches
                .iter()
                .map(|(p, b)| {
                    Ok((compile_async_expr(p, ctx)?, compile_async_expr(b, ctx)?))
                })
                .collect::<Result<_, CompileError>>()?;
            let otherwise = otherwise
                .as_ref()
                .map(|body| compile_async_expr(body, ctx))
                .transpose()?;
            Ok(Rc::new(move |scope: Scope| {
                let branches = branches.clone();
                let otherwise = otherwise.clone();
                Box::pin(async move {
                    for (predicate, body) in &branches {
                        match predicate(scope.clone()).await? {
                            Value::Boolean(true) => return body(scope).await,
                            Value::Boolean(false) => {}
                            _ => return Err(internal("if predicate was not a boolean")),
                        }
                    }
                    match &otherwise {
                        Some(body) => body(scope).await,
                        None => Ok(Value::Null),
                    }
                })
            }))
        }
        AKind::While {
            label,
            predicate,
            body,
        } => {
            let label = label.clone();
            let predicate = compile_async_expr(predicate, ctx)?;
            let body = compile_async_expr(body, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let label = label.clone();
                let predicate = predicate.clone();
                let body = body.clone();
                Box::pin(async move {
                    loop {
                        match predicate(scope.clone()).await? {
                            Value::Boolean(true) => {}
                            Value::Boolean(false) => return Ok(Value::Null),
                            _ => return Err(internal("while predicate was not a boolean")),
                        }
                        match body(scope.clone()).await {
                            Ok(_) => {}
                            Err(Control::Break(l)) if loop_catches(&label, &l) => {
                                return Ok(Value::Null);
                            }
                            Err(Control::Continue(l)) if loop_catches(&label, &l) => {}
                            Err(other) => return Err(other),
                        }
                    }
                })
            }))
        }
        AKind::For {
            label,
            collection,
            item,
            key,
            body,
        } => {
            let label = label.clone();
            let collection = compile_async_expr(collection, ctx)?;
            let item = *item;
            let key = *key;
            let body = compile_async_expr(body, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let label = label.clone();
                let collection = collection.clone();
                let body = body.clone();
                Box::pin(async move {
                    let collection = collection(scope.clone()).await?;
                    run_for(scope, collection, item, key, body, label).await
                })
            }))
        }
        AKind::Return { value } => {
            let value = compile_async_expr(value, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let value = value.clone();
                Box::pin(async move { Err(Control::Return(value(scope).await?)) })
            }))
        }
        AKind::Error { message } => {
            let message = compile_async_expr(message, ctx)?;
            let location = location.clone();
            Ok(Rc::new(move |scope: Scope| {
                let message = message.clone();
                let location = location.clone();
                Box::pin(async move {
                    let message = match message(scope).await? {
                        Value::String(s) => s.to_string(),
                        _ => return Err(internal("error message was not a string")),
                    };
                    Err(err_at(EastError::new(message), location.as_ref()))
                })
            }))
        }
        AKind::Try {
            body,
            message,
            stack,
            catch,
        } => {
            let body = compile_async_expr(body, ctx)?;
            let message = *message;
            let stack = *stack;
            let catch = compile_async_expr(catch, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let body = body.clone();
                let catch = catch.clone();
                Box::pin(async move {
                    match body(scope.clone()).await {
                        Err(Control::Error(e)) => {
                            scope.insert(message, Value::string(e.message.clone()));
                            let locations: Vec<Value> = e
                                .stack
                                .iter()
                                .map(|l| Value::string(l.to_string()))
                                .collect();
                            scope.insert(stack, Value::array(locations));
                            catch(scope).await
                        }
                        other => other,
                    }
                })
            }))
        }
        AKind::Match { scrutinee, arms } => {
            let scrutinee = compile_async_expr(scrutinee, ctx)?;
            let arms: Rc<Vec<(String, BindingId, AsyncThunk)>> = Rc::new(
                arms.iter()
                    .map(|arm| {
                        Ok((
                            arm.case.clone(),
                            arm.binding,
                            compile_async_expr(&arm.body, ctx)?,
                        ))
                    })
                    .collect::<Result<_, CompileError>>()?,
            );
            Ok(Rc::new(move |scope: Scope| {
                let scrutinee = scrutinee.clone();
                let arms = arms.clone();
                Box::pin(async move {
                    let Value::Variant(data) = scrutinee(scope.clone()).await? else {
                        return Err(internal("match scrutinee was not a variant"));
                    };
                    let Some((_, binding, body)) =
                        arms.iter().find(|(case, _, _)| *case == data.case)
                    else {
                        return Err(internal("match arm missing for case"));
                    };
                    scope.insert(*binding, data.value.clone());
                    body(scope).await
                })
            }))
        }
        AKind::Call { callee, arguments } => {
            let callee = compile_async_expr(callee, ctx)?;
            let arguments: Rc<Vec<AsyncThunk>> = Rc::new(
                arguments
                    .iter()
                    .map(|a| compile_async_expr(a, ctx))
                    .collect::<Result<_, _>>()?,
            );
            let location = location.clone();
            Ok(Rc::new(move |scope: Scope| {
                let callee = callee.clone();
                let arguments = arguments.clone();
                let location = location.clone();
                Box::pin(async move {
                    let Value::Function(function) = callee(scope.clone()).await? else {
                        return Err(internal("call target was not a function"));
                    };
                    let values = eval_all(&arguments, &scope).await?;
                    match &function.callable {
                        Callable::Sync(run) => {
                            run(values).map_err(|e| err_at(e, location.as_ref()))
                        }
                        Callable::Async(run) => run(values)
                            .await
                            .map_err(|e| err_at(e, location.as_ref())),
                        Callable::Unlinked => Err(err_at(
                            EastError::new(
                                "function was decoded without platforms and cannot be invoked",
                            ),
                            location.as_ref(),
                        )),
                    }
                })
            }))
        }
        AKind::Platform { name, arguments } => {
            let Some(platform) = ctx.platforms.get(name) else {
                return Err(CompileError::Internal(format!(
                    "platform {name} missing at compile time"
                )));
            };
            let implementation = platform.implementation.clone();
            let arguments: Rc<Vec<AsyncThunk>> = Rc::new(
                arguments
                    .iter()
                    .map(|a| compile_async_expr(a, ctx))
                    .collect::<Result<_, _>>()?,
            );
            let location = location.clone();
            Ok(Rc::new(move |scope: Scope| {
                let implementation = implementation.clone();
                let arguments = arguments.clone();
                let location = location.clone();
                Box::pin(async move {
                    let values = eval_all(&arguments, &scope).await?;
                    match &implementation {
                        PlatformImpl::Sync(run) => {
                            run(values).map_err(|e| err_at(e, location.as_ref()))
                        }
                        PlatformImpl::Async(run) => run(values)
                            .await
                            .map_err(|e| err_at(e, location.as_ref())),
                    }
                })
            }))
        }
        AKind::Builtin {
            name,
            type_args,
            arguments,
        } => {
            let Some(builtin) = east_runtime::lookup(name) else {
                return Err(CompileError::Internal(format!(
                    "builtin {name} missing at compile time"
                )));
            };
            let run = builtin.run;
            let type_args = Rc::new(type_args.clone());
            let arguments: Rc<Vec<AsyncThunk>> = Rc::new(
                arguments
                    .iter()
                    .map(|a| compile_async_expr(a, ctx))
                    .collect::<Result<_, _>>()?,
            );
            let location = location.clone();
            Ok(Rc::new(move |scope: Scope| {
                let type_args = type_args.clone();
                let arguments = arguments.clone();
                let location = location.clone();
                Box::pin(async move {
                    let values = eval_all(&arguments, &scope).await?;
                    run(&type_args, values).map_err(|e| err_at(e, location.as_ref()))
                })
            }))
        }
        AKind::NewArray { items } => {
            let items: Rc<Vec<AsyncThunk>> = Rc::new(
                items
                    .iter()
                    .map(|i| compile_async_expr(i, ctx))
                    .collect::<Result<_, _>>()?,
            );
            Ok(Rc::new(move |scope: Scope| {
                let items = items.clone();
                Box::pin(async move { Ok(Value::array(eval_all(&items, &scope).await?)) })
            }))
        }
        AKind::NewSet { items } => {
            let items: Rc<Vec<AsyncThunk>> = Rc::new(
                items
                    .iter()
                    .map(|i| compile_async_expr(i, ctx))
                    .collect::<Result<_, _>>()?,
            );
            Ok(Rc::new(move |scope: Scope| {
                let items = items.clone();
                Box::pin(async move {
                    let values = eval_all(&items, &scope).await?;
                    let keys: BTreeSet<Key> = values.into_iter().map(Key).collect();
                    Ok(Value::Set(SetData::new(keys)))
                })
            }))
        }
        AKind::NewDict { pairs } => {
            let pairs: Rc<Vec<(AsyncThunk, AsyncThunk)>> = Rc::new(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        Ok((compile_async_expr(k, ctx)?, compile_async_expr(v, ctx)?))
                    })
                    .collect::<Result<_, CompileError>>()?,
            );
            Ok(Rc::new(move |scope: Scope| {
                let pairs = pairs.clone();
                Box::pin(async move {
                    let mut values = BTreeMap::new();
                    for (k, v) in pairs.iter() {
                        let key = Key(k(scope.clone()).await?);
                        let value = v(scope.clone()).await?;
                        values.insert(key, value);
                    }
                    Ok(Value::Dict(DictData::new(values)))
                })
            }))
        }
        AKind::NewRef { value } => {
            let value = compile_async_expr(value, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let value = value.clone();
                Box::pin(async move { Ok(Value::reference(value(scope).await?)) })
            }))
        }
        AKind::Struct { fields } => {
            let fields: Rc<Vec<AsyncThunk>> = Rc::new(
                fields
                    .iter()
                    .map(|f| compile_async_expr(f, ctx))
                    .collect::<Result<_, _>>()?,
            );
            Ok(Rc::new(move |scope: Scope| {
                let fields = fields.clone();
                Box::pin(async move {
                    Ok(Value::structure(eval_all(&fields, &scope).await?))
                })
            }))
        }
        AKind::Variant { case, value } => {
            let case = case.clone();
            let value = compile_async_expr(value, ctx)?;
            Ok(Rc::new(move |scope: Scope| {
                let case = case.clone();
                let value = value.clone();
                Box::pin(async move { Ok(Value::variant(case, value(scope).await?)) })
            }))
        }
        AKind::WrapRecursive { value } | AKind::UnwrapRecursive { value } => {
            compile_async_expr(value, ctx)
        }
        // Value, Reference, Break, Continue, and Function literals are
        // never async themselves; the delegation above handles them.
        _ => Err(CompileError::Internal(
            "synchronous node reached the async lowering".to_string(),
        )),
    }
}

async fn run_for(
    scope: Scope,
    collection: Value,
    item: BindingId,
    key: Option<BindingId>,
    body: AsyncThunk,
    label: Option<String>,
) -> CtlResult {
    enum Step {
        Continue,
        Stop,
    }
    let step = |item_value: Value, key_value: Option<Value>| {
        let scope = scope.clone();
        let body = body.clone();
        let label = label.clone();
        async move {
            scope.insert(item, item_value);
            if let (Some(binding), Some(value)) = (key, key_value) {
                scope.insert(binding, value);
            }
            match body(scope).await {
                Ok(_) => Ok(Step::Continue),
                Err(Control::Break(l)) if loop_catches(&label, &l) => Ok(Step::Stop),
                Err(Control::Continue(l)) if loop_catches(&label, &l) => Ok(Step::Continue),
                Err(other) => Err(other),
            }
        }
    };
    match collection {
        Value::Array(data) => {
            let _guard = IterGuard::new(data.clone());
            let mut i = 0usize;
            loop {
                let Some(value) = data.items.borrow().get(i).cloned() else {
                    return Ok(Value::Null);
                };
                if matches!(step(value, Some(Value::Integer(i as i64))).await?, Step::Stop) {
                    return Ok(Value::Null);
                }
                i += 1;
            }
        }
        Value::Set(data) => {
            let _guard = IterGuard::new(data.clone());
            let mut cursor: Option<Key> = None;
            while let Some(k) = next_set_key(&data, cursor.as_ref()) {
                if matches!(step(k.0.clone(), None).await?, Step::Stop) {
                    return Ok(Value::Null);
                }
                cursor = Some(k);
            }
            Ok(Value::Null)
        }
        Value::Dict(data) => {
            let _guard = IterGuard::new(data.clone());
            let mut cursor: Option<Key> = None;
            while let Some((k, v)) = next_dict_entry(&data, cursor.as_ref()) {
                if matches!(step(v, Some(k.0.clone())).await?, Step::Stop) {
                    return Ok(Value::Null);
                }
                cursor = Some(k);
            }
            Ok(Value::Null)
        }
        _ => Err(internal("for collection was not iterable")),
    }
}
