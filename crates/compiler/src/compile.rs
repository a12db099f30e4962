//! Synchronous closure compiler
//!
//! Lowers each analyzed node into a host closure that closes over its
//! compiled children. Scope is a flat binding environment passed down
//! into child thunks; non-local control flow travels as a [`Control`]
//! value through `Result`, with function frames catching `Return` and
//! loops catching their own `Break`/`Continue`.
//!
//! The sync and async code paths are disjoint: `compile_sync` refuses a
//! platform list containing any async binding, and `compile_async`
//! (in `compile_async.rs`) refuses one containing none.

use crate::analyzer::{AExpr, AFunction, AKind, BindingId};
use crate::platform::{PlatformImpl, Platforms};
use east_core::value::{DictData, Key, SetData, type_is_flat};
use east_core::{
    Callable, EastError, FunctionData, IterGuard, Location, Type, Value, deep_copy,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Bound;
use std::rc::Rc;
use tracing::debug;

/// Non-local control flow inside a running program.
#[derive(Debug, Clone)]
pub enum Control {
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
    Error(EastError),
}

pub type CtlResult = Result<Value, Control>;

/// A running activation's binding environment: one flat table keyed by
/// binding id (ids are unique program-wide).
#[derive(Clone, Default)]
pub struct Scope {
    vars: Rc<RefCell<HashMap<BindingId, Value>>>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn insert(&self, binding: BindingId, value: Value) {
        self.vars.borrow_mut().insert(binding, value);
    }

    pub fn get(&self, binding: BindingId) -> Option<Value> {
        self.vars.borrow().get(&binding).cloned()
    }
}

pub(crate) type Thunk = Rc<dyn Fn(&Scope) -> CtlResult>;

#[derive(Clone)]
pub(crate) struct Ctx {
    pub platforms: Platforms,
}

/// Compile-time faults. Runtime faults surface as `EastError` when the
/// compiled closure runs, never here.
#[derive(Debug)]
pub enum CompileError {
    /// `compile_sync` with an async platform bound.
    AsyncPlatformBound(String),
    /// `compile_async` with no async platform bound.
    NoAsyncPlatform,
    /// The analyzed root is not a function literal.
    NotAFunction,
    /// The root function captures bindings, so there is no environment
    /// to close over.
    NotFree,
    /// Engine invariant violation.
    Internal(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::AsyncPlatformBound(name) => write!(
                f,
                "synchronous compilation with async platform {name} bound"
            ),
            CompileError::NoAsyncPlatform => {
                write!(f, "async compilation with no async platform bound")
            }
            CompileError::NotAFunction => {
                write!(f, "compilation target must be a function literal")
            }
            CompileError::NotFree => {
                write!(f, "top-level function must have an empty capture set")
            }
            CompileError::Internal(msg) => write!(f, "compiler invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Compile an analyzed function literal into a sync callable value. The
/// platform list must be entirely synchronous.
pub fn compile_sync(analyzed: &Rc<AExpr>, platforms: &Platforms) -> Result<Value, CompileError> {
    if let Some(name) = platforms.first_async() {
        return Err(CompileError::AsyncPlatformBound(name.to_string()));
    }
    debug!("compile sync");
    compile_function_value(analyzed, platforms)
}

/// Compile any analyzed function literal, choosing the body path per its
/// analysis. Shared by the two gated entry points and by BEAST2
/// function decoding.
pub(crate) fn compile_function_value(
    analyzed: &Rc<AExpr>,
    platforms: &Platforms,
) -> Result<Value, CompileError> {
    let AKind::Function(function) = &analyzed.kind else {
        return Err(CompileError::NotAFunction);
    };
    if !function.captures.is_empty() {
        return Err(CompileError::NotFree);
    }
    let ctx = Ctx {
        platforms: platforms.clone(),
    };
    let thunk = compile_expr(analyzed, &ctx)?;
    let scope = Scope::new();
    match thunk(&scope) {
        Ok(value) => Ok(value),
        Err(_) => Err(CompileError::Internal(
            "free function literal failed to evaluate".to_string(),
        )),
    }
}

fn internal(msg: &str) -> Control {
    Control::Error(EastError::new(format!("engine invariant violated: {msg}")))
}

fn loop_catches(label: &Option<String>, ctl_label: &Option<String>) -> bool {
    match ctl_label {
        None => true,
        Some(name) => label.as_deref() == Some(name.as_str()),
    }
}

fn err_at(e: EastError, location: Option<&Location>) -> Control {
    Control::Error(e.at(location))
}

/// First set key strictly above the cursor, read without a live borrow.
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

pub(crate) fn compile_expr(analyzed: &Rc<AExpr>, ctx: &Ctx) -> Result<Thunk, CompileError> {
    let location = analyzed.location.clone();
    match &analyzed.kind {
        AKind::Value { value } => {
            let value = value.clone();
            // Literal containers are templates: each evaluation yields a
            // fresh copy so one activation's mutations do not leak into
            // the next.
            if type_is_flat(&analyzed.ty) {
                Ok(Rc::new(move |_| Ok(value.clone())))
            } else {
                Ok(Rc::new(move |_| Ok(deep_copy(&value))))
            }
        }
        AKind::Reference { binding } => {
            let binding = *binding;
            Ok(Rc::new(move |scope| {
                scope
                    .get(binding)
                    .ok_or_else(|| internal("reference to unbound id"))
            }))
        }
        AKind::Block { statements, result } => {
            let statements: Vec<Thunk> = statements
                .iter()
                .map(|s| compile_expr(s, ctx))
                .collect::<Result<_, _>>()?;
            let result = compile_expr(result, ctx)?;
            Ok(Rc::new(move |scope| {
                for statement in &statements {
                    statement(scope)?;
                }
                result(scope)
            }))
        }
        AKind::Let { binding, value } | AKind::Assign { binding, value } => {
            let binding = *binding;
            let value = compile_expr(value, ctx)?;
            Ok(Rc::new(move |scope| {
                let value = value(scope)?;
                scope.insert(binding, value);
                Ok(Value::Null)
            }))
        }
        AKind::If {
            branches,
            otherwise,
        } => {
            let branches: Vec<(Thunk, Thunk)> = branches
                .iter()
                .map(|(p, b)| Ok((compile_expr(p, ctx)?, compile_expr(b, ctx)?)))
                .collect::<Result<_, CompileError>>()?;
            let otherwise = otherwise
                .as_ref()
                .map(|body| compile_expr(body, ctx))
                .transpose()?;
            Ok(Rc::new(move |scope| {
                for (predicate, body) in &branches {
                    match predicate(scope)? {
                        Value::Boolean(true) => return body(scope),
                        Value::Boolean(false) => {}
                        _ => return Err(internal("if predicate was not a boolean")),
                    }
                }
                match &otherwise {
                    Some(body) => body(scope),
                    None => Ok(Value::Null),
                }
            }))
        }
        AKind::While {
            label,
            predicate,
            body,
        } => {
            let label = label.clone();
            let predicate = compile_expr(predicate, ctx)?;
            let body = compile_expr(body, ctx)?;
            Ok(Rc::new(move |scope| {
                loop {
                    match predicate(scope)? {
                        Value::Boolean(true) => {}
                        Value::Boolean(false) => return Ok(Value::Null),
                        _ => return Err(internal("while predicate was not a boolean")),
                    }
                    match body(scope) {
                        Ok(_) => {}
                        Err(Control::Break(l)) if loop_catches(&label, &l) => {
                            return Ok(Value::Null);
                        }
                        Err(Control::Continue(l)) if loop_catches(&label, &l) => {}
                        Err(other) => return Err(other),
                    }
                }
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
            let collection = compile_expr(collection, ctx)?;
            let item = *item;
            let key = *key;
            let body = compile_expr(body, ctx)?;
            Ok(Rc::new(move |scope| {
                run_for(scope, &collection, item, key, &body, &label)
            }))
        }
        AKind::Return { value } => {
            let value = compile_expr(value, ctx)?;
            Ok(Rc::new(move |scope| Err(Control::Return(value(scope)?))))
        }
        AKind::Break { label } => {
            let label = label.clone();
            Ok(Rc::new(move |_| Err(Control::Break(label.clone()))))
        }
        AKind::Continue { label } => {
            let label = label.clone();
            Ok(Rc::new(move |_| Err(Control::Continue(label.clone()))))
        }
        AKind::Error { message } => {
            let message = compile_expr(message, ctx)?;
            let location = location.clone();
            Ok(Rc::new(move |scope| {
                let message = match message(scope)? {
                    Value::String(s) => s.to_string(),
                    _ => return Err(internal("error message was not a string")),
                };
                Err(err_at(EastError::new(message), location.as_ref()))
            }))
        }
        AKind::Try {
            body,
            message,
            stack,
            catch,
        } => {
            let body = compile_expr(body, ctx)?;
            let message = *message;
            let stack = *stack;
            let catch = compile_expr(catch, ctx)?;
            Ok(Rc::new(move |scope| match body(scope) {
                Err(Control::Error(e)) => {
                    scope.insert(message, Value::string(e.message.clone()));
                    let locations: Vec<Value> = e
                        .stack
                        .iter()
                        .map(|l| Value::string(l.to_string()))
                        .collect();
                    scope.insert(stack, Value::array(locations));
                    catch(scope)
                }
                other => other,
            }))
        }
        AKind::Match { scrutinee, arms } => {
            let scrutinee = compile_expr(scrutinee, ctx)?;
            let arms: Vec<(String, BindingId, Thunk)> = arms
                .iter()
                .map(|arm| {
                    Ok((arm.case.clone(), arm.binding, compile_expr(&arm.body, ctx)?))
                })
                .collect::<Result<_, CompileError>>()?;
            Ok(Rc::new(move |scope| {
                let Value::Variant(data) = scrutinee(scope)? else {
                    return Err(internal("match scrutinee was not a variant"));
                };
                let Some((_, binding, body)) =
                    arms.iter().find(|(case, _, _)| *case == data.case)
                else {
                    return Err(internal("match arm missing for case"));
                };
                scope.insert(*binding, data.value.clone());
                body(scope)
            }))
        }
        AKind::Call { callee, arguments } => {
            let callee = compile_expr(callee, ctx)?;
            let arguments: Vec<Thunk> = arguments
                .iter()
                .map(|a| compile_expr(a, ctx))
                .collect::<Result<_, _>>()?;
            let location = location.clone();
            Ok(Rc::new(move |scope| {
                let Value::Function(function) = callee(scope)? else {
                    return Err(internal("call target was not a function"));
                };
                let mut values = Vec::with_capacity(arguments.len());
                for argument in &arguments {
                    values.push(argument(scope)?);
                }
                match &function.callable {
                    Callable::Sync(run) => {
                        run(values).map_err(|e| err_at(e, location.as_ref()))
                    }
                    Callable::Async(_) => Err(internal("async callee on the sync path")),
                    Callable::Unlinked => Err(err_at(
                        EastError::new(
                            "function was decoded without platforms and cannot be invoked",
                        ),
                        location.as_ref(),
                    )),
                }
            }))
        }
        AKind::Platform { name, arguments } => {
            let Some(platform) = ctx.platforms.get(name) else {
                return Err(CompileError::Internal(format!(
                    "platform {name} missing at compile time"
                )));
            };
            let PlatformImpl::Sync(run) = platform.implementation.clone() else {
                return Err(CompileError::Internal(format!(
                    "async platform {name} on the sync path"
                )));
            };
            let arguments: Vec<Thunk> = arguments
                .iter()
                .map(|a| compile_expr(a, ctx))
                .collect::<Result<_, _>>()?;
            let location = location.clone();
            Ok(Rc::new(move |scope| {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in &arguments {
                    values.push(argument(scope)?);
                }
                run(values).map_err(|e| err_at(e, location.as_ref()))
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
            let type_args = type_args.clone();
            let arguments: Vec<Thunk> = arguments
                .iter()
                .map(|a| compile_expr(a, ctx))
                .collect::<Result<_, _>>()?;
            let location = location.clone();
            let run = builtin.run;
            Ok(Rc::new(move |scope| {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in &arguments {
                    values.push(argument(scope)?);
                }
                run(&type_args, values).map_err(|e| err_at(e, location.as_ref()))
            }))
        }
        AKind::Function(function) => compile_function_literal(analyzed, function, ctx),
        AKind::NewArray { items } => {
            let items: Vec<Thunk> = items
                .iter()
                .map(|i| compile_expr(i, ctx))
                .collect::<Result<_, _>>()?;
            Ok(Rc::new(move |scope| {
                let mut values = Vec::with_capacity(items.len());
                for item in &items {
                    values.push(item(scope)?);
                }
                Ok(Value::array(values))
            }))
        }
        AKind::NewSet { items } => {
            let items: Vec<Thunk> = items
                .iter()
                .map(|i| compile_expr(i, ctx))
                .collect::<Result<_, _>>()?;
            Ok(Rc::new(move |scope| {
                let mut values = std::collections::BTreeSet::new();
                for item in &items {
                    values.insert(Key(item(scope)?));
                }
                Ok(Value::Set(SetData::new(values)))
            }))
        }
        AKind::NewDict { pairs } => {
            let pairs: Vec<(Thunk, Thunk)> = pairs
                .iter()
                .map(|(k, v)| Ok((compile_expr(k, ctx)?, compile_expr(v, ctx)?)))
                .collect::<Result<_, CompileError>>()?;
            Ok(Rc::new(move |scope| {
                let mut values = std::collections::BTreeMap::new();
                for (k, v) in &pairs {
                    let key = Key(k(scope)?);
                    let value = v(scope)?;
                    values.insert(key, value);
                }
                Ok(Value::Dict(DictData::new(values)))
            }))
        }
        AKind::NewRef { value } => {
            let value = compile_expr(value, ctx)?;
            Ok(Rc::new(move |scope| Ok(Value::reference(value(scope)?))))
        }
        AKind::Struct { fields } => {
            let fields: Vec<Thunk> = fields
                .iter()
                .map(|f| compile_expr(f, ctx))
                .collect::<Result<_, _>>()?;
            Ok(Rc::new(move |scope| {
                let mut values = Vec::with_capacity(fields.len());
                for field in &fields {
                    values.push(field(scope)?);
                }
                Ok(Value::structure(values))
            }))
        }
        AKind::Variant { case, value } => {
            let case = case.clone();
            let value = compile_expr(value, ctx)?;
            Ok(Rc::new(move |scope| {
                Ok(Value::variant(case.clone(), value(scope)?))
            }))
        }
        // Recursive coercions are type-level only.
        AKind::WrapRecursive { value } | AKind::UnwrapRecursive { value } => {
            compile_expr(value, ctx)
        }
    }
}

fn run_for(
    scope: &Scope,
    collection: &Thunk,
    item: BindingId,
    key: Option<BindingId>,
    body: &Thunk,
    label: &Option<String>,
) -> CtlResult {
    let step = |scope: &Scope, item_value: Value, key_value: Option<Value>| -> Result<bool, Control> {
        scope.insert(item, item_value);
        if let (Some(binding), Some(value)) = (key, key_value) {
            scope.insert(binding, value);
        }
        match body(scope) {
            Ok(_) => Ok(true),
            Err(Control::Break(l)) if loop_catches(label, &l) => Ok(false),
            Err(Control::Continue(l)) if loop_catches(label, &l) => Ok(true),
            Err(other) => Err(other),
        }
    };
    match collection(scope)? {
        Value::Array(data) => {
            let _guard = IterGuard::new(data.clone());
            let mut i = 0usize;
            loop {
                let Some(value) = data.items.borrow().get(i).cloned() else {
                    return Ok(Value::Null);
                };
                if !step(scope, value, Some(Value::Integer(i as i64)))? {
                    return Ok(Value::Null);
                }
                i += 1;
            }
        }
        Value::Set(data) => {
            let _guard = IterGuard::new(data.clone());
            let mut cursor: Option<Key> = None;
            while let Some(k) = next_set_key(&data, cursor.as_ref()) {
                if !step(scope, k.0.clone(), None)? {
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
                if !step(scope, v, Some(k.0.clone()))? {
                    return Ok(Value::Null);
                }
                cursor = Some(k);
            }
            Ok(Value::Null)
        }
        _ => Err(internal("for collection was not iterable")),
    }
}

fn compile_function_literal(
    analyzed: &Rc<AExpr>,
    function: &Rc<AFunction>,
    ctx: &Ctx,
) -> Result<Thunk, CompileError> {
    let ty = analyzed.ty.clone();
    let location = analyzed.location.clone();
    let captures = function.captures.clone();
    let inputs = function.inputs.clone();
    let ir = if function.captures.is_empty() {
        Some(function.source.clone())
    } else {
        None
    };

    if function.is_async {
        let body = crate::compile_async::compile_async_expr(&function.body, ctx)?;
        Ok(make_function_thunk(ty, location, captures, inputs, ir, move |snapshot, input_ids, loc| {
            let body = body.clone();
            Callable::Async(Rc::new(move |args: Vec<Value>| {
                let scope = Scope::new();
                if let Err(e) = bind_activation(&scope, &snapshot, &input_ids, args) {
                    return Box::pin(std::future::ready(Err(e)));
                }
                let body = body.clone();
                let loc = loc.clone();
                Box::pin(async move {
                    finish_frame(body(scope).await, (*loc).as_ref())
                })
            }))
        }))
    } else {
        let body = compile_expr(&function.body, ctx)?;
        Ok(make_function_thunk(ty, location, captures, inputs, ir, move |snapshot, input_ids, loc| {
            let body = body.clone();
            Callable::Sync(Rc::new(move |args: Vec<Value>| {
                let scope = Scope::new();
                bind_activation(&scope, &snapshot, &input_ids, args)?;
                finish_frame(body(&scope), (*loc).as_ref())
            }))
        }))
    }
}

type MakeCallable =
    dyn Fn(Vec<(BindingId, Value)>, Rc<[BindingId]>, Rc<Option<Location>>) -> Callable;

fn make_function_thunk(
    ty: Type,
    location: Option<Location>,
    captures: Vec<(BindingId, BindingId)>,
    inputs: Vec<(BindingId, Type)>,
    ir: Option<Rc<east_core::Expr>>,
    make: impl Fn(Vec<(BindingId, Value)>, Rc<[BindingId]>, Rc<Option<Location>>) -> Callable
        + 'static,
) -> Thunk {
    let make: Rc<MakeCallable> = Rc::new(make);
    let input_ids: Rc<[BindingId]> = inputs.iter().map(|(id, _)| *id).collect();
    let location = Rc::new(location);
    Rc::new(move |scope| {
        // Snapshot capture values at closure creation.
        let mut snapshot = Vec::with_capacity(captures.len());
        for (outer, inner) in &captures {
            let value = scope
                .get(*outer)
                .ok_or_else(|| internal("capture source unbound"))?;
            snapshot.push((*inner, value));
        }
        let callable = make(snapshot, input_ids.clone(), location.clone());
        Ok(Value::Function(Rc::new(FunctionData {
            ty: ty.clone(),
            ir: ir.clone(),
            callable,
        })))
    })
}

fn bind_activation(
    scope: &Scope,
    snapshot: &[(BindingId, Value)],
    input_ids: &[BindingId],
    args: Vec<Value>,
) -> Result<(), EastError> {
    if args.len() != input_ids.len() {
        return Err(EastError::new(format!(
            "function takes {} arguments, got {}",
            input_ids.len(),
            args.len()
        )));
    }
    for (binding, value) in snapshot {
        scope.insert(*binding, value.clone());
    }
    for (binding, value) in input_ids.iter().zip(args) {
        scope.insert(*binding, value);
    }
    Ok(())
}

/// Function frame boundary: catch `Return`, push the frame's location
/// onto a propagating error's stack, and refuse escaped loop control.
fn finish_frame(result: CtlResult, location: Option<&Location>) -> Result<Value, EastError> {
    match result {
        Ok(value) => Ok(value),
        Err(Control::Return(value)) => Ok(value),
        Err(Control::Error(e)) => Err(e.at(location)),
        Err(Control::Break(_)) | Err(Control::Continue(_)) => {
            Err(EastError::new("loop control escaped its function body"))
        }
    }
}
