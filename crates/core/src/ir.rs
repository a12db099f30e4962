//! Intermediate representation for East programs
//!
//! An [`Expr`] is an immutable tree of expression nodes with optional
//! source locations. Hosts construct IR through the builder functions
//! here, the analyzer resolves names and types, and the compilers lower
//! the analyzed tree to closures. Nodes never change after construction;
//! children sit behind `Rc` so function values can retain their
//! originating subtree for serialization.

use crate::error::TypeError;
use crate::types::Type;
use crate::value::{Value, is_value_of};
use std::fmt;
use std::rc::Rc;

/// Source position attached to IR nodes and propagated into the
/// synthetic stacks of runtime errors.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Self {
        Location {
            file: None,
            line,
            column,
        }
    }

    pub fn in_file(file: impl Into<String>, line: u32, column: u32) -> Self {
        Location {
            file: Some(file.into()),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}:{}", self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

/// One arm of a `Match` node: the case name, the name bound to the case
/// payload, and the arm body.
#[derive(Debug, Clone)]
pub struct MatchArm {
    pub case: String,
    pub binding: String,
    pub body: Rc<Expr>,
}

/// An IR node.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Option<Location>,
}

/// The closed set of IR node kinds.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A literal value of a declared type.
    Value { ty: Type, value: Value },
    /// Statements evaluated in order; the result expression's value and
    /// type are the block's.
    Block {
        statements: Vec<Rc<Expr>>,
        result: Rc<Expr>,
    },
    /// Introduce a mutable binding visible in the remainder of the
    /// enclosing block.
    Let { name: String, value: Rc<Expr> },
    /// Re-assign a binding introduced by `Let`.
    Assign { name: String, value: Rc<Expr> },
    /// Sequential predicate chain; the node's type is the union of all
    /// branch types (and `Null` when the else branch is absent).
    If {
        branches: Vec<(Rc<Expr>, Rc<Expr>)>,
        otherwise: Option<Rc<Expr>>,
    },
    While {
        label: Option<String>,
        predicate: Rc<Expr>,
        body: Rc<Expr>,
    },
    /// Iterate an `Array`, `Set`, or `Dict`. `item` binds the element
    /// (array item, set key, dict value); `key` optionally binds the
    /// array index or dict key.
    For {
        label: Option<String>,
        collection: Rc<Expr>,
        item: String,
        key: Option<String>,
        body: Rc<Expr>,
    },
    /// Non-local exit from the enclosing function. Typed `Never`.
    Return { value: Rc<Expr> },
    Break { label: Option<String> },
    Continue { label: Option<String> },
    /// Raise an East error. Typed `Never`.
    Error { message: Rc<Expr> },
    /// Catch East errors raised in `body`; the catch body sees the
    /// message and the synthetic location stack.
    Try {
        body: Rc<Expr>,
        message: String,
        stack: String,
        catch: Rc<Expr>,
    },
    /// Exhaustive dispatch on a `Variant` scrutinee.
    Match {
        scrutinee: Rc<Expr>,
        arms: Vec<MatchArm>,
    },
    /// Apply a user function value.
    Call {
        callee: Rc<Expr>,
        arguments: Vec<Rc<Expr>>,
    },
    /// Apply a declared platform function.
    Platform {
        name: String,
        arguments: Vec<Rc<Expr>>,
    },
    /// Apply a kernel operation from the builtin registry.
    Builtin {
        name: String,
        type_args: Vec<Type>,
        arguments: Vec<Rc<Expr>>,
    },
    /// Introduce a closure. A serializable function is free: its capture
    /// list is empty.
    Function {
        is_async: bool,
        inputs: Vec<(String, Type)>,
        output: Type,
        captures: Vec<String>,
        body: Rc<Expr>,
    },
    NewArray {
        element: Type,
        items: Vec<Rc<Expr>>,
    },
    NewSet {
        key: Type,
        items: Vec<Rc<Expr>>,
    },
    NewDict {
        key: Type,
        value: Type,
        pairs: Vec<(Rc<Expr>, Rc<Expr>)>,
    },
    NewRef {
        inner: Type,
        value: Rc<Expr>,
    },
    /// Construct a struct value; `ty` must be a `Struct` and the field
    /// expressions follow its declared order.
    Struct {
        ty: Type,
        fields: Vec<Rc<Expr>>,
    },
    /// Construct a variant value of the declared variant type.
    Variant {
        ty: Type,
        case: String,
        value: Rc<Expr>,
    },
    /// Coerce a value of the unfolded type into the recursive type.
    WrapRecursive {
        ty: Type,
        value: Rc<Expr>,
    },
    /// Coerce a recursive value to its unfolded type.
    UnwrapRecursive { value: Rc<Expr> },
    /// Use a binding introduced in the scope chain.
    Reference { name: String },
}

fn node(kind: ExprKind) -> Rc<Expr> {
    Rc::new(Expr {
        kind,
        location: None,
    })
}

impl Expr {
    /// Literal node. The value is validated against the declared type at
    /// construction time; this is the point where host values cross into
    /// IR.
    pub fn value(ty: Type, value: Value) -> Result<Rc<Expr>, TypeError> {
        if !is_value_of(&value, &ty) {
            return Err(TypeError::new(format!("value is not of type {ty}")));
        }
        Ok(node(ExprKind::Value { ty, value }))
    }

    /// Literal `Null`.
    pub fn null() -> Rc<Expr> {
        node(ExprKind::Value {
            ty: Type::Null,
            value: Value::Null,
        })
    }

    pub fn boolean(value: bool) -> Rc<Expr> {
        node(ExprKind::Value {
            ty: Type::Boolean,
            value: Value::Boolean(value),
        })
    }

    pub fn integer(value: i64) -> Rc<Expr> {
        node(ExprKind::Value {
            ty: Type::Integer,
            value: Value::Integer(value),
        })
    }

    pub fn float(value: f64) -> Rc<Expr> {
        node(ExprKind::Value {
            ty: Type::Float,
            value: Value::Float(value),
        })
    }

    pub fn string(value: impl Into<Rc<str>>) -> Rc<Expr> {
        node(ExprKind::Value {
            ty: Type::String,
            value: Value::String(value.into()),
        })
    }

    pub fn block(statements: Vec<Rc<Expr>>, result: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::Block { statements, result })
    }

    pub fn let_(name: impl Into<String>, value: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::Let {
            name: name.into(),
            value,
        })
    }

    pub fn assign(name: impl Into<String>, value: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::Assign {
            name: name.into(),
            value,
        })
    }

    pub fn if_(branches: Vec<(Rc<Expr>, Rc<Expr>)>, otherwise: Option<Rc<Expr>>) -> Rc<Expr> {
        node(ExprKind::If {
            branches,
            otherwise,
        })
    }

    pub fn while_(label: Option<String>, predicate: Rc<Expr>, body: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::While {
            label,
            predicate,
            body,
        })
    }

    pub fn for_(
        label: Option<String>,
        collection: Rc<Expr>,
        item: impl Into<String>,
        key: Option<String>,
        body: Rc<Expr>,
    ) -> Rc<Expr> {
        node(ExprKind::For {
            label,
            collection,
            item: item.into(),
            key,
            body,
        })
    }

    pub fn return_(value: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::Return { value })
    }

    pub fn break_(label: Option<String>) -> Rc<Expr> {
        node(ExprKind::Break { label })
    }

    pub fn continue_(label: Option<String>) -> Rc<Expr> {
        node(ExprKind::Continue { label })
    }

    pub fn error(message: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::Error { message })
    }

    pub fn try_(
        body: Rc<Expr>,
        message: impl Into<String>,
        stack: impl Into<String>,
        catch: Rc<Expr>,
    ) -> Rc<Expr> {
        node(ExprKind::Try {
            body,
            message: message.into(),
            stack: stack.into(),
            catch,
        })
    }

    pub fn match_(scrutinee: Rc<Expr>, arms: Vec<MatchArm>) -> Rc<Expr> {
        node(ExprKind::Match { scrutinee, arms })
    }

    pub fn call(callee: Rc<Expr>, arguments: Vec<Rc<Expr>>) -> Rc<Expr> {
        node(ExprKind::Call { callee, arguments })
    }

    pub fn platform(name: impl Into<String>, arguments: Vec<Rc<Expr>>) -> Rc<Expr> {
        node(ExprKind::Platform {
            name: name.into(),
            arguments,
        })
    }

    pub fn builtin(
        name: impl Into<String>,
        type_args: Vec<Type>,
        arguments: Vec<Rc<Expr>>,
    ) -> Rc<Expr> {
        node(ExprKind::Builtin {
            name: name.into(),
            type_args,
            arguments,
        })
    }

    pub fn function(
        inputs: Vec<(String, Type)>,
        output: Type,
        captures: Vec<String>,
        body: Rc<Expr>,
    ) -> Rc<Expr> {
        node(ExprKind::Function {
            is_async: false,
            inputs,
            output,
            captures,
            body,
        })
    }

    pub fn async_function(
        inputs: Vec<(String, Type)>,
        output: Type,
        captures: Vec<String>,
        body: Rc<Expr>,
    ) -> Rc<Expr> {
        node(ExprKind::Function {
            is_async: true,
            inputs,
            output,
            captures,
            body,
        })
    }

    pub fn new_array(element: Type, items: Vec<Rc<Expr>>) -> Rc<Expr> {
        node(ExprKind::NewArray { element, items })
    }

    pub fn new_set(key: Type, items: Vec<Rc<Expr>>) -> Rc<Expr> {
        node(ExprKind::NewSet { key, items })
    }

    pub fn new_dict(key: Type, value: Type, pairs: Vec<(Rc<Expr>, Rc<Expr>)>) -> Rc<Expr> {
        node(ExprKind::NewDict { key, value, pairs })
    }

    pub fn new_ref(inner: Type, value: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::NewRef { inner, value })
    }

    pub fn structure(ty: Type, fields: Vec<Rc<Expr>>) -> Rc<Expr> {
        node(ExprKind::Struct { ty, fields })
    }

    pub fn variant(ty: Type, case: impl Into<String>, value: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::Variant {
            ty,
            case: case.into(),
            value,
        })
    }

    pub fn wrap_recursive(ty: Type, value: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::WrapRecursive { ty, value })
    }

    pub fn unwrap_recursive(value: Rc<Expr>) -> Rc<Expr> {
        node(ExprKind::UnwrapRecursive { value })
    }

    pub fn reference(name: impl Into<String>) -> Rc<Expr> {
        node(ExprKind::Reference { name: name.into() })
    }

    /// The same node with a source location attached.
    pub fn with_location(expr: &Rc<Expr>, location: Location) -> Rc<Expr> {
        Rc::new(Expr {
            kind: expr.kind.clone(),
            location: Some(location),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_node_validates_literal() {
        assert!(Expr::value(Type::Integer, Value::Integer(4)).is_ok());
        let err = Expr::value(Type::Integer, Value::string("four")).unwrap_err();
        assert!(err.to_string().contains("not of type Integer"));
    }

    #[test]
    fn test_location_display() {
        assert_eq!(Location::new(3, 9).to_string(), "3:9");
        assert_eq!(
            Location::in_file("main.east", 3, 9).to_string(),
            "main.east:3:9"
        );
    }
}
