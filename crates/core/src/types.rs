//! Semantic types for East
//!
//! A [`Type`] is a closed tagged variant: primitives, mutable containers,
//! composites, and the two abstraction forms (recursive self-reference and
//! functions). Types are plain immutable trees; the only shared node is the
//! inner body of a `Recursive`, which sits behind an `Rc` so cycle-tolerant
//! comparisons can key memo tables by node address.

use crate::error::TypeError;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// The set of East types.
///
/// `Struct` fields keep their declared order; `Variant` cases are kept
/// sorted by case name, which is the canonical order used everywhere the
/// variant is observed (printing, match arms, BEAST2 tag indices).
#[derive(Debug, Clone)]
pub enum Type {
    /// The empty type: subtype of everything, identity of `union`.
    Never,
    Null,
    Boolean,
    /// Signed 64-bit integer.
    Integer,
    /// IEEE-754 binary64.
    Float,
    /// Unicode text.
    String,
    /// Naive UTC instant at millisecond resolution.
    DateTime,
    /// Immutable byte sequence.
    Blob,
    /// Mutable sequence with identity.
    Array(Box<Type>),
    /// Mutable key set with identity. Keys must be immutable data types.
    Set(Box<Type>),
    /// Mutable key/value map with identity. Keys must be immutable data types.
    Dict(Box<Type>, Box<Type>),
    /// Mutable single-value cell with identity.
    Ref(Box<Type>),
    /// Fixed-shape record; field order is the declared order.
    Struct(Vec<(String, Type)>),
    /// Tagged union; cases sorted by name.
    Variant(Vec<(String, Type)>),
    /// Self-referential type; the inner body refers back to this node
    /// through [`Type::RecursiveRef`].
    Recursive(Rc<Type>),
    /// Back-reference to the n-th enclosing `Recursive` (1-based).
    RecursiveRef(u32),
    Function {
        inputs: Vec<Type>,
        output: Box<Type>,
        platforms: BTreeSet<String>,
    },
    AsyncFunction {
        inputs: Vec<Type>,
        output: Box<Type>,
        platforms: BTreeSet<String>,
    },
}

impl Type {
    /// Checked `Array` constructor: the element must be a data type.
    pub fn array(element: Type) -> Result<Type, TypeError> {
        if !is_data_type(&element) {
            return Err(TypeError::new("array element must be a data type").push("array element"));
        }
        Ok(Type::Array(Box::new(element)))
    }

    /// Checked `Set` constructor: the key must be an immutable data type.
    pub fn set(key: Type) -> Result<Type, TypeError> {
        if !is_immutable_type(&key) {
            return Err(TypeError::new("set key must be an immutable data type").push("set key"));
        }
        Ok(Type::Set(Box::new(key)))
    }

    /// Checked `Dict` constructor: immutable key, data-type value.
    pub fn dict(key: Type, value: Type) -> Result<Type, TypeError> {
        if !is_immutable_type(&key) {
            return Err(TypeError::new("dict key must be an immutable data type").push("dict key"));
        }
        if !is_data_type(&value) {
            return Err(TypeError::new("dict value must be a data type").push("dict value"));
        }
        Ok(Type::Dict(Box::new(key), Box::new(value)))
    }

    /// Checked `Ref` constructor: the inner type must be a data type.
    pub fn reference(inner: Type) -> Result<Type, TypeError> {
        if !is_data_type(&inner) {
            return Err(TypeError::new("ref inner must be a data type").push("ref"));
        }
        Ok(Type::Ref(Box::new(inner)))
    }

    /// Checked `Struct` constructor: unique field names, data-type fields,
    /// declared order preserved.
    pub fn structure(fields: Vec<(String, Type)>) -> Result<Type, TypeError> {
        for (i, (name, ty)) in fields.iter().enumerate() {
            if !is_data_type(ty) {
                return Err(TypeError::new("struct field must be a data type")
                    .push(format!("struct field {name}")));
            }
            if fields[..i].iter().any(|(other, _)| other == name) {
                return Err(TypeError::new(format!("duplicate struct field {name}")));
            }
        }
        Ok(Type::Struct(fields))
    }

    /// Checked `Variant` constructor: unique case names, data-type cases.
    /// Cases are sorted by name into the canonical order.
    pub fn variant(mut cases: Vec<(String, Type)>) -> Result<Type, TypeError> {
        for (i, (name, ty)) in cases.iter().enumerate() {
            if !is_data_type(ty) {
                return Err(TypeError::new("variant case must be a data type")
                    .push(format!("variant case {name}")));
            }
            if cases[..i].iter().any(|(other, _)| other == name) {
                return Err(TypeError::new(format!("duplicate variant case {name}")));
            }
        }
        cases.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(Type::Variant(cases))
    }

    /// Checked `Recursive` constructor: every back-reference inside must
    /// resolve to an enclosing `Recursive`.
    pub fn recursive(inner: Type) -> Result<Type, TypeError> {
        fn check(ty: &Type, depth: u32) -> Result<(), TypeError> {
            match ty {
                Type::RecursiveRef(d) => {
                    if *d == 0 || *d > depth {
                        Err(TypeError::new(format!(
                            "recursive back-reference {d} has no enclosing Recursive"
                        )))
                    } else {
                        Ok(())
                    }
                }
                Type::Recursive(inner) => check(inner, depth + 1),
                _ => {
                    for child in child_types(ty) {
                        check(child, depth)?;
                    }
                    Ok(())
                }
            }
        }
        check(&inner, 1)?;
        Ok(Type::Recursive(Rc::new(inner)))
    }

    pub fn function(inputs: Vec<Type>, output: Type, platforms: BTreeSet<String>) -> Type {
        Type::Function {
            inputs,
            output: Box::new(output),
            platforms,
        }
    }

    pub fn async_function(inputs: Vec<Type>, output: Type, platforms: BTreeSet<String>) -> Type {
        Type::AsyncFunction {
            inputs,
            output: Box::new(output),
            platforms,
        }
    }

    /// Unfold one level of a `Recursive` type: the inner body with each
    /// back-reference to this node replaced by the node itself.
    pub fn unfold(&self) -> Option<Type> {
        match self {
            Type::Recursive(inner) => Some(substitute(inner, 1, self)),
            _ => None,
        }
    }
}

/// Replace back-references of exactly `depth` inside `ty` with `with`.
fn substitute(ty: &Type, depth: u32, with: &Type) -> Type {
    match ty {
        Type::RecursiveRef(d) if *d == depth => with.clone(),
        Type::RecursiveRef(d) => Type::RecursiveRef(*d),
        Type::Recursive(inner) => Type::Recursive(Rc::new(substitute(inner, depth + 1, with))),
        Type::Array(e) => Type::Array(Box::new(substitute(e, depth, with))),
        Type::Set(k) => Type::Set(Box::new(substitute(k, depth, with))),
        Type::Dict(k, v) => Type::Dict(
            Box::new(substitute(k, depth, with)),
            Box::new(substitute(v, depth, with)),
        ),
        Type::Ref(inner) => Type::Ref(Box::new(substitute(inner, depth, with))),
        Type::Struct(fields) => Type::Struct(
            fields
                .iter()
                .map(|(n, t)| (n.clone(), substitute(t, depth, with)))
                .collect(),
        ),
        Type::Variant(cases) => Type::Variant(
            cases
                .iter()
                .map(|(n, t)| (n.clone(), substitute(t, depth, with)))
                .collect(),
        ),
        Type::Function {
            inputs,
            output,
            platforms,
        } => Type::Function {
            inputs: inputs.iter().map(|t| substitute(t, depth, with)).collect(),
            output: Box::new(substitute(output, depth, with)),
            platforms: platforms.clone(),
        },
        Type::AsyncFunction {
            inputs,
            output,
            platforms,
        } => Type::AsyncFunction {
            inputs: inputs.iter().map(|t| substitute(t, depth, with)).collect(),
            output: Box::new(substitute(output, depth, with)),
            platforms: platforms.clone(),
        },
        other => other.clone(),
    }
}

/// Immediate child types of a node, for generic traversals.
pub(crate) fn child_types(ty: &Type) -> Vec<&Type> {
    match ty {
        Type::Array(e) | Type::Set(e) | Type::Ref(e) => vec![e],
        Type::Dict(k, v) => vec![k, v],
        Type::Struct(fields) | Type::Variant(fields) => fields.iter().map(|(_, t)| t).collect(),
        Type::Recursive(inner) => vec![inner.as_ref()],
        Type::Function { inputs, output, .. } | Type::AsyncFunction { inputs, output, .. } => {
            let mut out: Vec<&Type> = inputs.iter().collect();
            out.push(output);
            out
        }
        _ => Vec::new(),
    }
}

/// True when no `Function`/`AsyncFunction` occurs anywhere inside `ty`,
/// traversing `Recursive` bodies.
pub fn is_data_type(ty: &Type) -> bool {
    match ty {
        Type::Function { .. } | Type::AsyncFunction { .. } => false,
        _ => child_types(ty).into_iter().all(is_data_type),
    }
}

/// True when `ty` is a data type that additionally contains no mutable
/// container (`Array`/`Set`/`Dict`/`Ref`) anywhere inside.
pub fn is_immutable_type(ty: &Type) -> bool {
    match ty {
        Type::Function { .. } | Type::AsyncFunction { .. } => false,
        Type::Array(_) | Type::Set(_) | Type::Dict(_, _) | Type::Ref(_) => false,
        _ => child_types(ty).into_iter().all(is_immutable_type),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Never => write!(f, "Never"),
            Type::Null => write!(f, "Null"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Integer => write!(f, "Integer"),
            Type::Float => write!(f, "Float"),
            Type::String => write!(f, "String"),
            Type::DateTime => write!(f, "DateTime"),
            Type::Blob => write!(f, "Blob"),
            Type::Array(e) => write!(f, "Array<{e}>"),
            Type::Set(k) => write!(f, "Set<{k}>"),
            Type::Dict(k, v) => write!(f, "Dict<{k}, {v}>"),
            Type::Ref(inner) => write!(f, "Ref<{inner}>"),
            Type::Struct(fields) => {
                write!(f, "Struct{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            Type::Variant(cases) => {
                write!(f, "Variant{{")?;
                for (i, (name, ty)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            Type::Recursive(inner) => write!(f, "Recursive<{inner}>"),
            Type::RecursiveRef(d) => write!(f, "Rec<{d}>"),
            Type::Function {
                inputs,
                output,
                platforms,
            } => write_function(f, "Function", inputs, output, platforms),
            Type::AsyncFunction {
                inputs,
                output,
                platforms,
            } => write_function(f, "AsyncFunction", inputs, output, platforms),
        }
    }
}

fn write_function(
    f: &mut fmt::Formatter<'_>,
    head: &str,
    inputs: &[Type],
    output: &Type,
    platforms: &BTreeSet<String>,
) -> fmt::Result {
    write!(f, "{head}<[")?;
    for (i, input) in inputs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{input}")?;
    }
    write!(f, "], {output}")?;
    if !platforms.is_empty() {
        write!(f, ", {{")?;
        for (i, name) in platforms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "}}")?;
    }
    write!(f, ">")
}

/// Printable textual form, round-tripped by [`crate::parse::parse_type`].
pub fn print_type(ty: &Type) -> String {
    ty.to_string()
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        crate::type_ops::type_equal(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> Type {
        Type::Integer
    }

    #[test]
    fn test_data_type_excludes_functions_transitively() {
        let f = Type::function(vec![int()], int(), BTreeSet::new());
        assert!(!is_data_type(&f));
        let arr = Type::Array(Box::new(f));
        assert!(!is_data_type(&arr));
        let rec = Type::Recursive(Rc::new(Type::Struct(vec![
            ("next".to_string(), Type::RecursiveRef(1)),
            (
                "op".to_string(),
                Type::Function {
                    inputs: vec![],
                    output: Box::new(Type::Null),
                    platforms: BTreeSet::new(),
                },
            ),
        ])));
        assert!(!is_data_type(&rec));
    }

    #[test]
    fn test_immutable_excludes_containers() {
        assert!(is_immutable_type(&Type::String));
        assert!(!is_immutable_type(&Type::Array(Box::new(int()))));
        assert!(!is_immutable_type(&Type::Struct(vec![(
            "a".to_string(),
            Type::Ref(Box::new(int())),
        )])));
        assert!(is_immutable_type(&Type::Struct(vec![(
            "a".to_string(),
            Type::DateTime,
        )])));
    }

    #[test]
    fn test_checked_constructors_reject_invalid() {
        let f = Type::function(vec![], Type::Null, BTreeSet::new());
        assert!(Type::array(f.clone()).is_err());
        assert!(Type::set(Type::Array(Box::new(int()))).is_err());
        assert!(Type::dict(Type::Ref(Box::new(int())), int()).is_err());
        assert!(
            Type::structure(vec![("a".to_string(), int()), ("a".to_string(), int())]).is_err()
        );
    }

    #[test]
    fn test_variant_cases_sorted() {
        let v = Type::variant(vec![
            ("b".to_string(), int()),
            ("a".to_string(), Type::Null),
        ])
        .unwrap();
        match v {
            Type::Variant(cases) => {
                assert_eq!(cases[0].0, "a");
                assert_eq!(cases[1].0, "b");
            }
            _ => panic!("expected variant"),
        }
    }

    #[test]
    fn test_recursive_backref_must_resolve() {
        assert!(Type::recursive(Type::RecursiveRef(2)).is_err());
        assert!(
            Type::recursive(Type::Variant(vec![
                ("leaf".to_string(), Type::Null),
                (
                    "node".to_string(),
                    Type::Array(Box::new(Type::RecursiveRef(1))),
                ),
            ]))
            .is_ok()
        );
    }

    #[test]
    fn test_unfold_substitutes_self() {
        let rec = Type::recursive(Type::Variant(vec![
            ("leaf".to_string(), Type::Null),
            (
                "node".to_string(),
                Type::Array(Box::new(Type::RecursiveRef(1))),
            ),
        ]))
        .unwrap();
        let unfolded = rec.unfold().unwrap();
        match unfolded {
            Type::Variant(cases) => match &cases[1].1 {
                Type::Array(e) => assert!(matches!(e.as_ref(), Type::Recursive(_))),
                _ => panic!("expected array"),
            },
            _ => panic!("expected variant"),
        }
    }

    #[test]
    fn test_print_type_shapes() {
        assert_eq!(
            Type::Dict(Box::new(Type::String), Box::new(int())).to_string(),
            "Dict<String, Integer>"
        );
        assert_eq!(
            Type::Struct(vec![("a".to_string(), int())]).to_string(),
            "Struct{a: Integer}"
        );
        let f = Type::function(
            vec![int()],
            int(),
            ["double".to_string()].into_iter().collect(),
        );
        assert_eq!(f.to_string(), "Function<[Integer], Integer, {double}>");
    }
}
