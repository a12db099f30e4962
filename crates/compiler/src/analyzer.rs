//! IR analysis: name resolution, type verification, async annotation
//!
//! The analyzer walks the raw IR and produces a parallel analyzed tree.
//! Every node carries its resolved type and an `is_async` flag; bindings
//! are resolved to dense ids so the compilers can use a flat binding
//! environment. A node is async when any child is async; only platform
//! calls with async bindings (and calls to async callees) originate
//! asyncness. Creating a closure is synchronous, so a function literal
//! never makes its surrounding scope async, but it records in its
//! closure type the union of platform names its body touches.

use crate::platform::Platforms;
use east_core::type_ops::{subtype, subtype_relaxed, union};
use east_core::{Expr, ExprKind, Location, Type, TypeError, Value, is_value_of};
use std::collections::BTreeSet;
use std::rc::Rc;
use tracing::debug;

pub type BindingId = u32;

/// An analyzed IR node.
#[derive(Debug)]
pub struct AExpr {
    pub kind: AKind,
    pub ty: Type,
    pub is_async: bool,
    pub location: Option<Location>,
}

#[derive(Debug)]
pub struct AArm {
    pub case: String,
    pub binding: BindingId,
    pub body: Rc<AExpr>,
}

/// An analyzed function literal.
#[derive(Debug)]
pub struct AFunction {
    /// Declared as `AsyncFunction` in the IR.
    pub is_async: bool,
    pub inputs: Vec<(BindingId, Type)>,
    pub output: Type,
    /// Capture pairs: the outer binding read at closure creation and the
    /// inner binding it becomes inside the body.
    pub captures: Vec<(BindingId, BindingId)>,
    /// Platform names the body touches, transitively.
    pub platforms: BTreeSet<String>,
    pub body: Rc<AExpr>,
    /// The originating IR node, stapled to free function values for
    /// serialization.
    pub source: Rc<Expr>,
}

#[derive(Debug)]
pub enum AKind {
    Value { value: Value },
    Block { statements: Vec<Rc<AExpr>>, result: Rc<AExpr> },
    Let { binding: BindingId, value: Rc<AExpr> },
    Assign { binding: BindingId, value: Rc<AExpr> },
    If {
        branches: Vec<(Rc<AExpr>, Rc<AExpr>)>,
        otherwise: Option<Rc<AExpr>>,
    },
    While {
        label: Option<String>,
        predicate: Rc<AExpr>,
        body: Rc<AExpr>,
    },
    For {
        label: Option<String>,
        collection: Rc<AExpr>,
        item: BindingId,
        key: Option<BindingId>,
        body: Rc<AExpr>,
    },
    Return { value: Rc<AExpr> },
    Break { label: Option<String> },
    Continue { label: Option<String> },
    Error { message: Rc<AExpr> },
    Try {
        body: Rc<AExpr>,
        message: BindingId,
        stack: BindingId,
        catch: Rc<AExpr>,
    },
    Match { scrutinee: Rc<AExpr>, arms: Vec<AArm> },
    Call { callee: Rc<AExpr>, arguments: Vec<Rc<AExpr>> },
    Platform { name: String, arguments: Vec<Rc<AExpr>> },
    Builtin {
        name: String,
        type_args: Vec<Type>,
        arguments: Vec<Rc<AExpr>>,
    },
    Function(Rc<AFunction>),
    NewArray { items: Vec<Rc<AExpr>> },
    NewSet { items: Vec<Rc<AExpr>> },
    NewDict { pairs: Vec<(Rc<AExpr>, Rc<AExpr>)> },
    NewRef { value: Rc<AExpr> },
    Struct { fields: Vec<Rc<AExpr>> },
    Variant { case: String, value: Rc<AExpr> },
    WrapRecursive { value: Rc<AExpr> },
    UnwrapRecursive { value: Rc<AExpr> },
    Reference { binding: BindingId },
}

/// Analyze an IR tree against a platform list.
pub fn analyze(expr: &Rc<Expr>, platforms: &Platforms) -> Result<Rc<AExpr>, TypeError> {
    debug!(platforms = ?platforms.names(), "analyze");
    let mut analyzer = Analyzer {
        platforms,
        frames: vec![Frame::new(None)],
        next_binding: 0,
    };
    analyzer.node(expr)
}

struct Binding {
    name: String,
    id: BindingId,
    ty: Type,
}

/// One function activation's lexical state. References never reach past
/// a frame; outer bindings enter a function only through its declared
/// capture list.
struct Frame {
    blocks: Vec<Vec<Binding>>,
    loops: Vec<Option<String>>,
    output: Option<Type>,
    /// Platform names touched inside this frame, transitively.
    platforms: BTreeSet<String>,
}

impl Frame {
    fn new(output: Option<Type>) -> Self {
        Frame {
            blocks: vec![Vec::new()],
            loops: Vec::new(),
            output,
            platforms: BTreeSet::new(),
        }
    }
}

struct Analyzer<'p> {
    platforms: &'p Platforms,
    frames: Vec<Frame>,
    next_binding: BindingId,
}

impl<'p> Analyzer<'p> {
    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("analyzer frame stack empty")
    }

    fn fresh(&mut self) -> BindingId {
        let id = self.next_binding;
        self.next_binding += 1;
        id
    }

    fn declare(&mut self, name: &str, ty: Type) -> BindingId {
        let id = self.fresh();
        self.frame().blocks.last_mut().expect("open block").push(Binding {
            name: name.to_string(),
            id,
            ty,
        });
        id
    }

    fn resolve(&self, name: &str) -> Option<(BindingId, Type)> {
        let frame = self.frames.last()?;
        for block in frame.blocks.iter().rev() {
            for binding in block.iter().rev() {
                if binding.name == name {
                    return Some((binding.id, binding.ty.clone()));
                }
            }
        }
        None
    }

    fn resolve_or_explain(&self, name: &str) -> Result<(BindingId, Type), TypeError> {
        if let Some(found) = self.resolve(name) {
            return Ok(found);
        }
        let in_outer = self.frames[..self.frames.len().saturating_sub(1)]
            .iter()
            .any(|frame| {
                frame
                    .blocks
                    .iter()
                    .any(|block| block.iter().any(|b| b.name == name))
            });
        if in_outer {
            Err(TypeError::new(format!(
                "binding {name} belongs to an enclosing function; add it to the capture list"
            )))
        } else {
            Err(TypeError::new(format!("binding {name} is not in scope")))
        }
    }

    fn touch_platforms(&mut self, names: &BTreeSet<String>) {
        self.frame().platforms.extend(names.iter().cloned());
    }

    fn node(&mut self, expr: &Rc<Expr>) -> Result<Rc<AExpr>, TypeError> {
        let location = expr.location.clone();
        let out = |kind: AKind, ty: Type, is_async: bool| {
            Rc::new(AExpr {
                kind,
                ty,
                is_async,
                location: location.clone(),
            })
        };
        match &expr.kind {
            ExprKind::Value { ty, value } => {
                if !is_value_of(value, ty) {
                    return Err(TypeError::new(format!("literal is not of type {ty}")));
                }
                Ok(out(
                    AKind::Value {
                        value: value.clone(),
                    },
                    ty.clone(),
                    false,
                ))
            }
            ExprKind::Block { statements, result } => {
                self.frame().blocks.push(Vec::new());
                let analyzed: Result<Vec<Rc<AExpr>>, TypeError> =
                    statements.iter().map(|s| self.node(s)).collect();
                let analyzed = match analyzed {
                    Ok(a) => a,
                    Err(e) => {
                        self.frame().blocks.pop();
                        return Err(e);
                    }
                };
                let result = match self.node(result) {
                    Ok(r) => r,
                    Err(e) => {
                        self.frame().blocks.pop();
                        return Err(e);
                    }
                };
                self.frame().blocks.pop();
                let is_async =
                    analyzed.iter().any(|s| s.is_async) || result.is_async;
                let ty = result.ty.clone();
                Ok(out(
                    AKind::Block {
                        statements: analyzed,
                        result,
                    },
                    ty,
                    is_async,
                ))
            }
            ExprKind::Let { name, value } => {
                let value = self.node(value)?;
                let binding = self.declare(name, value.ty.clone());
                let is_async = value.is_async;
                Ok(out(AKind::Let { binding, value }, Type::Null, is_async))
            }
            ExprKind::Assign { name, value } => {
                let value = self.node(value)?;
                let (binding, ty) = self.resolve_or_explain(name)?;
                if !subtype(&value.ty, &ty) {
                    return Err(TypeError::new(format!(
                        "cannot assign {} to binding {name} of type {ty}",
                        value.ty
                    )));
                }
                let is_async = value.is_async;
                Ok(out(AKind::Assign { binding, value }, Type::Null, is_async))
            }
            ExprKind::If {
                branches,
                otherwise,
            } => {
                let mut analyzed = Vec::with_capacity(branches.len());
                let mut ty = Type::Never;
                let mut is_async = false;
                for (predicate, body) in branches {
                    let predicate = self.node(predicate)?;
                    if !subtype(&predicate.ty, &Type::Boolean) {
                        return Err(TypeError::new(format!(
                            "if predicate must be Boolean, got {}",
                            predicate.ty
                        )));
                    }
                    let body = self.node(body)?;
                    ty = union(&ty, &body.ty).map_err(|e| e.push("if branches"))?;
                    is_async = is_async || predicate.is_async || body.is_async;
                    analyzed.push((predicate, body));
                }
                let otherwise = match otherwise {
                    Some(body) => {
                        let body = self.node(body)?;
                        ty = union(&ty, &body.ty).map_err(|e| e.push("if branches"))?;
                        is_async = is_async || body.is_async;
                        Some(body)
                    }
                    None => {
                        ty = union(&ty, &Type::Null).map_err(|e| e.push("if branches"))?;
                        None
                    }
                };
                Ok(out(
                    AKind::If {
                        branches: analyzed,
                        otherwise,
                    },
                    ty,
                    is_async,
                ))
            }
            ExprKind::While {
                label,
                predicate,
                body,
            } => {
                let predicate = self.node(predicate)?;
                if !subtype(&predicate.ty, &Type::Boolean) {
                    return Err(TypeError::new(format!(
                        "while predicate must be Boolean, got {}",
                        predicate.ty
                    )));
                }
                self.frame().loops.push(label.clone());
                let body = self.node(body);
                self.frame().loops.pop();
                let body = body?;
                let is_async = predicate.is_async || body.is_async;
                Ok(out(
                    AKind::While {
                        label: label.clone(),
                        predicate,
                        body,
                    },
                    Type::Null,
                    is_async,
                ))
            }
            ExprKind::For {
                label,
                collection,
                item,
                key,
                body,
            } => {
                let collection = self.node(collection)?;
                let (item_ty, key_ty) = match &collection.ty {
                    Type::Array(elem) => (elem.as_ref().clone(), Some(Type::Integer)),
                    Type::Set(k) => (k.as_ref().clone(), None),
                    Type::Dict(k, v) => (v.as_ref().clone(), Some(k.as_ref().clone())),
                    other => {
                        return Err(TypeError::new(format!(
                            "for iterates an Array, Set, or Dict, got {other}"
                        )));
                    }
                };
                self.frame().blocks.push(Vec::new());
                let item_id = self.declare(item, item_ty);
                let key_id = match (key, key_ty) {
                    (Some(name), Some(ty)) => Some(self.declare(name, ty)),
                    (Some(_), None) => {
                        self.frame().blocks.pop();
                        return Err(TypeError::new(
                            "set iteration has no key binding".to_string(),
                        ));
                    }
                    (None, _) => None,
                };
                self.frame().loops.push(label.clone());
                let body = self.node(body);
                self.frame().loops.pop();
                self.frame().blocks.pop();
                let body = body?;
                let is_async = collection.is_async || body.is_async;
                Ok(out(
                    AKind::For {
                        label: label.clone(),
                        collection,
                        item: item_id,
                        key: key_id,
                        body,
                    },
                    Type::Null,
                    is_async,
                ))
            }
            ExprKind::Return { value } => {
                let value = self.node(value)?;
                let Some(output) = self.frames.last().and_then(|f| f.output.clone()) else {
                    return Err(TypeError::new("return outside a function".to_string()));
                };
                if !subtype(&value.ty, &output) {
                    return Err(TypeError::new(format!(
                        "return value has type {}, function returns {output}",
                        value.ty
                    )));
                }
                let is_async = value.is_async;
                Ok(out(AKind::Return { value }, Type::Never, is_async))
            }
            ExprKind::Break { label } => {
                self.check_loop_label(label, "break")?;
                Ok(out(
                    AKind::Break {
                        label: label.clone(),
                    },
                    Type::Never,
                    false,
                ))
            }
            ExprKind::Continue { label } => {
                self.check_loop_label(label, "continue")?;
                Ok(out(
                    AKind::Continue {
                        label: label.clone(),
                    },
                    Type::Never,
                    false,
                ))
            }
            ExprKind::Error { message } => {
                let message = self.node(message)?;
                if !subtype(&message.ty, &Type::String) {
                    return Err(TypeError::new(format!(
                        "error message must be String, got {}",
                        message.ty
                    )));
                }
                let is_async = message.is_async;
                Ok(out(AKind::Error { message }, Type::Never, is_async))
            }
            ExprKind::Try {
                body,
                message,
                stack,
                catch,
            } => {
                let body = self.node(body)?;
                self.frame().blocks.push(Vec::new());
                let message_id = self.declare(message, Type::String);
                let stack_id =
                    self.declare(stack, Type::Array(Box::new(Type::String)));
                let catch = self.node(catch);
                self.frame().blocks.pop();
                let catch = catch?;
                let ty = union(&body.ty, &catch.ty).map_err(|e| e.push("try branches"))?;
                let is_async = body.is_async || catch.is_async;
                Ok(out(
                    AKind::Try {
                        body,
                        message: message_id,
                        stack: stack_id,
                        catch,
                    },
                    ty,
                    is_async,
                ))
            }
            ExprKind::Match { scrutinee, arms } => {
                let scrutinee = self.node(scrutinee)?;
                let Type::Variant(cases) = scrutinee.ty.clone() else {
                    return Err(TypeError::new(format!(
                        "match scrutinee must be a Variant, got {}",
                        scrutinee.ty
                    )));
                };
                let mut analyzed: Vec<AArm> = Vec::with_capacity(arms.len());
                let mut ty = Type::Never;
                let mut is_async = scrutinee.is_async;
                for arm in arms {
                    let Some((_, case_ty)) =
                        cases.iter().find(|(name, _)| *name == arm.case)
                    else {
                        return Err(TypeError::new(format!(
                            "match arm {} is not a case of {}",
                            arm.case, scrutinee.ty
                        )));
                    };
                    if analyzed.iter().any(|a| a.case == arm.case) {
                        return Err(TypeError::new(format!(
                            "duplicate match arm {}",
                            arm.case
                        )));
                    }
                    self.frame().blocks.push(Vec::new());
                    let binding = self.declare(&arm.binding, case_ty.clone());
                    let body = self.node(&arm.body);
                    self.frame().blocks.pop();
                    let body = body?;
                    ty = union(&ty, &body.ty).map_err(|e| e.push("match arms"))?;
                    is_async = is_async || body.is_async;
                    analyzed.push(AArm {
                        case: arm.case.clone(),
                        binding,
                        body,
                    });
                }
                for (name, _) in &cases {
                    if !analyzed.iter().any(|a| a.case == *name) {
                        return Err(TypeError::new(format!(
                            "match is not exhaustive: missing case {name}"
                        )));
                    }
                }
                Ok(out(
                    AKind::Match {
                        scrutinee,
                        arms: analyzed,
                    },
                    ty,
                    is_async,
                ))
            }
            ExprKind::Call { callee, arguments } => {
                let callee = self.node(callee)?;
                let (inputs, output, platforms, callee_async) = match &callee.ty {
                    Type::Function {
                        inputs,
                        output,
                        platforms,
                    } => (inputs.clone(), output.as_ref().clone(), platforms.clone(), false),
                    Type::AsyncFunction {
                        inputs,
                        output,
                        platforms,
                    } => (inputs.clone(), output.as_ref().clone(), platforms.clone(), true),
                    other => {
                        return Err(TypeError::new(format!(
                            "call target must be a function, got {other}"
                        )));
                    }
                };
                if arguments.len() != inputs.len() {
                    return Err(TypeError::new(format!(
                        "function takes {} arguments, got {}",
                        inputs.len(),
                        arguments.len()
                    )));
                }
                let mut analyzed = Vec::with_capacity(arguments.len());
                let mut is_async = callee.is_async || callee_async;
                for (i, (argument, input)) in
                    arguments.iter().zip(inputs.iter()).enumerate()
                {
                    let argument = self.node(argument)?;
                    if !subtype(&argument.ty, input) {
                        return Err(TypeError::new(format!(
                            "argument {i} has type {}, expected {input}",
                            argument.ty
                        )));
                    }
                    is_async = is_async || argument.is_async;
                    analyzed.push(argument);
                }
                self.touch_platforms(&platforms);
                Ok(out(
                    AKind::Call {
                        callee,
                        arguments: analyzed,
                    },
                    output,
                    is_async,
                ))
            }
            ExprKind::Platform { name, arguments } => {
                let Some(declared) = self.platforms.get(name) else {
                    return Err(TypeError::new(format!(
                        "platform function {name} is not declared"
                    )));
                };
                let inputs = declared.inputs.clone();
                let output = declared.output.clone();
                let platform_async = declared.is_async();
                if arguments.len() != inputs.len() {
                    return Err(TypeError::new(format!(
                        "platform function {name} takes {} arguments, got {}",
                        inputs.len(),
                        arguments.len()
                    )));
                }
                let mut analyzed = Vec::with_capacity(arguments.len());
                let mut is_async = platform_async;
                for (i, (argument, input)) in
                    arguments.iter().zip(inputs.iter()).enumerate()
                {
                    let argument = self.node(argument)?;
                    if !subtype(&argument.ty, input) {
                        return Err(TypeError::new(format!(
                            "platform {name} argument {i} has type {}, expected {input}",
                            argument.ty
                        )));
                    }
                    is_async = is_async || argument.is_async;
                    analyzed.push(argument);
                }
                self.frame().platforms.insert(name.clone());
                Ok(out(
                    AKind::Platform {
                        name: name.clone(),
                        arguments: analyzed,
                    },
                    output,
                    is_async,
                ))
            }
            ExprKind::Builtin {
                name,
                type_args,
                arguments,
            } => {
                let Some(builtin) = east_runtime::lookup(name) else {
                    return Err(TypeError::new(format!("unknown builtin {name}")));
                };
                let (inputs, output) = builtin.signature(type_args)?;
                if arguments.len() != inputs.len() {
                    return Err(TypeError::new(format!(
                        "builtin {name} takes {} arguments, got {}",
                        inputs.len(),
                        arguments.len()
                    )));
                }
                let mut analyzed = Vec::with_capacity(arguments.len());
                let mut is_async = false;
                for (i, (argument, input)) in
                    arguments.iter().zip(inputs.iter()).enumerate()
                {
                    let argument = self.node(argument)?;
                    if !subtype_relaxed(&argument.ty, input) {
                        return Err(TypeError::new(format!(
                            "builtin {name} argument {i} has type {}, expected {input}",
                            argument.ty
                        )));
                    }
                    is_async = is_async || argument.is_async;
                    analyzed.push(argument);
                }
                Ok(out(
                    AKind::Builtin {
                        name: name.clone(),
                        type_args: type_args.clone(),
                        arguments: analyzed,
                    },
                    output,
                    is_async,
                ))
            }
            ExprKind::Function {
                is_async: declared_async,
                inputs,
                output,
                captures,
                body,
            } => self.function(expr, *declared_async, inputs, output, captures, body, out),
            ExprKind::NewArray { element, items } => {
                let ty = Type::array(element.clone())?;
                let (analyzed, is_async) =
                    self.elements(items, element, "array element")?;
                Ok(out(AKind::NewArray { items: analyzed }, ty, is_async))
            }
            ExprKind::NewSet { key, items } => {
                let ty = Type::set(key.clone())?;
                let (analyzed, is_async) = self.elements(items, key, "set key")?;
                Ok(out(AKind::NewSet { items: analyzed }, ty, is_async))
            }
            ExprKind::NewDict { key, value, pairs } => {
                let ty = Type::dict(key.clone(), value.clone())?;
                let mut analyzed = Vec::with_capacity(pairs.len());
                let mut is_async = false;
                for (k, v) in pairs {
                    let k = self.node(k)?;
                    if !subtype(&k.ty, key) {
                        return Err(TypeError::new(format!(
                            "dict key has type {}, expected {key}",
                            k.ty
                        )));
                    }
                    let v = self.node(v)?;
                    if !subtype(&v.ty, value) {
                        return Err(TypeError::new(format!(
                            "dict value has type {}, expected {value}",
                            v.ty
                        )));
                    }
                    is_async = is_async || k.is_async || v.is_async;
                    analyzed.push((k, v));
                }
                Ok(out(AKind::NewDict { pairs: analyzed }, ty, is_async))
            }
            ExprKind::NewRef { inner, value } => {
                let ty = Type::reference(inner.clone())?;
                let value = self.node(value)?;
                if !subtype(&value.ty, inner) {
                    return Err(TypeError::new(format!(
                        "ref value has type {}, expected {inner}",
                        value.ty
                    )));
                }
                let is_async = value.is_async;
                Ok(out(AKind::NewRef { value }, ty, is_async))
            }
            ExprKind::Struct { ty, fields } => {
                let Type::Struct(field_types) = ty else {
                    return Err(TypeError::new(format!(
                        "struct constructor needs a Struct type, got {ty}"
                    )));
                };
                // Re-run the checked constructor to validate names and
                // field data-types.
                Type::structure(field_types.clone())?;
                if fields.len() != field_types.len() {
                    return Err(TypeError::new(format!(
                        "struct {ty} has {} fields, got {}",
                        field_types.len(),
                        fields.len()
                    )));
                }
                let mut analyzed = Vec::with_capacity(fields.len());
                let mut is_async = false;
                for (field, (name, field_ty)) in fields.iter().zip(field_types.iter()) {
                    let field = self.node(field)?;
                    if !subtype(&field.ty, field_ty) {
                        return Err(TypeError::new(format!(
                            "struct field {name} has type {}, expected {field_ty}",
                            field.ty
                        )));
                    }
                    is_async = is_async || field.is_async;
                    analyzed.push(field);
                }
                Ok(out(
                    AKind::Struct { fields: analyzed },
                    ty.clone(),
                    is_async,
                ))
            }
            ExprKind::Variant { ty, case, value } => {
                let Type::Variant(cases) = ty else {
                    return Err(TypeError::new(format!(
                        "variant constructor needs a Variant type, got {ty}"
                    )));
                };
                let Some((_, case_ty)) = cases.iter().find(|(name, _)| name == case) else {
                    return Err(TypeError::new(format!(
                        "variant {ty} has no case {case}"
                    )));
                };
                let value = self.node(value)?;
                if !subtype(&value.ty, case_ty) {
                    return Err(TypeError::new(format!(
                        "variant case {case} has type {}, expected {case_ty}",
                        value.ty
                    )));
                }
                let is_async = value.is_async;
                Ok(out(
                    AKind::Variant {
                        case: case.clone(),
                        value,
                    },
                    ty.clone(),
                    is_async,
                ))
            }
            ExprKind::WrapRecursive { ty, value } => {
                let Some(unfolded) = ty.unfold() else {
                    return Err(TypeError::new(format!(
                        "wrap target must be a Recursive type, got {ty}"
                    )));
                };
                let value = self.node(value)?;
                if !subtype(&value.ty, &unfolded) {
                    return Err(TypeError::new(format!(
                        "wrapped value has type {}, expected {unfolded}",
                        value.ty
                    )));
                }
                let is_async = value.is_async;
                Ok(out(AKind::WrapRecursive { value }, ty.clone(), is_async))
            }
            ExprKind::UnwrapRecursive { value } => {
                let value = self.node(value)?;
                let Some(unfolded) = value.ty.unfold() else {
                    return Err(TypeError::new(format!(
                        "unwrap source must be a Recursive type, got {}",
                        value.ty
                    )));
                };
                let is_async = value.is_async;
                Ok(out(AKind::UnwrapRecursive { value }, unfolded, is_async))
            }
            ExprKind::Reference { name } => {
                let (binding, ty) = self.resolve_or_explain(name)?;
                Ok(out(AKind::Reference { binding }, ty, false))
            }
        }
    }

    fn check_loop_label(
        &self,
        label: &Option<String>,
        what: &str,
    ) -> Result<(), TypeError> {
        let frame = self.frames.last().expect("analyzer frame stack empty");
        match label {
            None if frame.loops.is_empty() => {
                Err(TypeError::new(format!("{what} outside a loop")))
            }
            None => Ok(()),
            Some(label) => {
                if frame.loops.iter().any(|l| l.as_deref() == Some(label)) {
                    Ok(())
                } else {
                    Err(TypeError::new(format!(
                        "{what} label {label} does not name an enclosing loop"
                    )))
                }
            }
        }
    }

    fn elements(
        &mut self,
        items: &[Rc<Expr>],
        expected: &Type,
        what: &str,
    ) -> Result<(Vec<Rc<AExpr>>, bool), TypeError> {
        let mut analyzed = Vec::with_capacity(items.len());
        let mut is_async = false;
        for item in items {
            let item = self.node(item)?;
            if !subtype(&item.ty, expected) {
                return Err(TypeError::new(format!(
                    "{what} has type {}, expected {expected}",
                    item.ty
                )));
            }
            is_async = is_async || item.is_async;
            analyzed.push(item);
        }
        Ok((analyzed, is_async))
    }

    #[allow(clippy::too_many_arguments)]
    fn function(
        &mut self,
        source: &Rc<Expr>,
        declared_async: bool,
        inputs: &[(String, Type)],
        output: &Type,
        captures: &[String],
        body: &Rc<Expr>,
        out: impl Fn(AKind, Type, bool) -> Rc<AExpr>,
    ) -> Result<Rc<AExpr>, TypeError> {
        // Resolve captures in the enclosing frame before entering the
        // function's own frame.
        let mut capture_pairs = Vec::with_capacity(captures.len());
        let mut capture_types = Vec::with_capacity(captures.len());
        for name in captures {
            let (outer, ty) = self.resolve_or_explain(name)?;
            capture_pairs.push((name.clone(), outer));
            capture_types.push(ty);
        }

        self.frames.push(Frame::new(Some(output.clone())));
        let mut captures_resolved = Vec::with_capacity(captures.len());
        for ((name, outer), ty) in capture_pairs.into_iter().zip(capture_types) {
            let inner = self.declare(&name, ty);
            captures_resolved.push((outer, inner));
        }
        let mut input_ids = Vec::with_capacity(inputs.len());
        for (name, ty) in inputs {
            input_ids.push((self.declare(name, ty.clone()), ty.clone()));
        }

        let body = self.node(body);
        let frame = self.frames.pop().expect("function frame");
        let body = body?;

        if !subtype(&body.ty, output) {
            return Err(TypeError::new(format!(
                "function body has type {}, output is {output}",
                body.ty
            )));
        }

        let platforms = frame.platforms;
        let touches_async = platforms.iter().any(|name| self.platforms.is_async(name));
        if declared_async && !touches_async {
            return Err(TypeError::new(
                "async function touches no async platform".to_string(),
            ));
        }
        if !declared_async && touches_async {
            let name = platforms
                .iter()
                .find(|name| self.platforms.is_async(name))
                .cloned()
                .unwrap_or_default();
            return Err(TypeError::new(format!(
                "function body touches async platform {name}; declare it async"
            )));
        }

        // The closure's platform requirements are visible to whoever
        // holds the closure.
        self.touch_platforms(&platforms);

        let input_types: Vec<Type> = inputs.iter().map(|(_, ty)| ty.clone()).collect();
        let ty = if declared_async {
            Type::async_function(input_types, output.clone(), platforms.clone())
        } else {
            Type::function(input_types, output.clone(), platforms.clone())
        };
        debug!(ty = %ty, captures = captures.len(), "analyzed function literal");
        Ok(out(
            AKind::Function(Rc::new(AFunction {
                is_async: declared_async,
                inputs: input_ids,
                output: output.clone(),
                captures: captures_resolved,
                platforms,
                body,
                source: source.clone(),
            })),
            ty,
            // Creating a closure is synchronous.
            false,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformFunction, Platforms};

    fn no_platforms() -> Platforms {
        Platforms::new(vec![]).unwrap()
    }

    fn sync_double() -> Platforms {
        Platforms::new(vec![PlatformFunction::sync(
            "double",
            vec![Type::Integer],
            Type::Integer,
            |args| east_runtime::operands::integer(&args[0]).map(|n| Value::Integer(n * 2)),
        )])
        .unwrap()
    }

    fn identity_fn(body: Rc<Expr>) -> Rc<Expr> {
        Expr::function(
            vec![("x".to_string(), Type::Integer)],
            Type::Integer,
            vec![],
            body,
        )
    }

    #[test]
    fn test_reference_resolution() {
        let f = identity_fn(Expr::reference("x"));
        let analyzed = analyze(&f, &no_platforms()).unwrap();
        assert!(!analyzed.is_async);
        assert!(matches!(analyzed.ty, Type::Function { .. }));
    }

    #[test]
    fn test_out_of_scope_reference() {
        let f = identity_fn(Expr::reference("y"));
        let err = analyze(&f, &no_platforms()).unwrap_err();
        assert!(err.to_string().contains("not in scope"));
    }

    #[test]
    fn test_cross_frame_reference_requires_capture() {
        let inner = Expr::function(vec![], Type::Integer, vec![], Expr::reference("x"));
        let outer = identity_fn(Expr::block(
            vec![],
            Expr::call(inner, vec![]),
        ));
        let err = analyze(&outer, &no_platforms()).unwrap_err();
        assert!(err.to_string().contains("capture list"));
    }

    #[test]
    fn test_platform_resolution_and_asyncness() {
        let body = Expr::platform("double", vec![Expr::reference("x")]);
        let analyzed = analyze(&identity_fn(body.clone()), &sync_double()).unwrap();
        let AKind::Function(f) = &analyzed.kind else {
            panic!("expected function");
        };
        assert!(!f.body.is_async);
        assert!(f.platforms.contains("double"));

        let err = analyze(&identity_fn(body), &no_platforms()).unwrap_err();
        assert!(err.to_string().contains("not declared"));
    }

    #[test]
    fn test_match_exhaustiveness() {
        let vt = Type::variant(vec![
            ("a".to_string(), Type::Null),
            ("b".to_string(), Type::Integer),
        ])
        .unwrap();
        let scrutinee = Expr::variant(vt, "a", Expr::null());
        let partial = Expr::match_(
            scrutinee,
            vec![east_core::MatchArm {
                case: "a".to_string(),
                binding: "v".to_string(),
                body: Expr::integer(1),
            }],
        );
        let f = Expr::function(vec![], Type::Integer, vec![], partial);
        let err = analyze(&f, &no_platforms()).unwrap_err();
        assert!(err.to_string().contains("missing case b"));
    }

    #[test]
    fn test_break_label_checking() {
        let body = Expr::while_(
            Some("outer".to_string()),
            Expr::boolean(true),
            Expr::break_(Some("wrong".to_string())),
        );
        let f = Expr::function(vec![], Type::Null, vec![], Expr::block(vec![body], Expr::null()));
        let err = analyze(&f, &no_platforms()).unwrap_err();
        assert!(err.to_string().contains("does not name an enclosing loop"));
    }

    #[test]
    fn test_builtin_signature_checked() {
        let bad = Expr::builtin(
            "IntegerAdd",
            vec![],
            vec![Expr::integer(1), Expr::string("two")],
        );
        let f = Expr::function(vec![], Type::Integer, vec![], bad);
        let err = analyze(&f, &no_platforms()).unwrap_err();
        assert!(err.to_string().contains("IntegerAdd argument 1"));
    }
}
