//! Builtin registry
//!
//! Every kernel operation is a [`BuiltinDef`]: an uppercase name, its
//! type parameters, input patterns that may reference those parameters,
//! an output pattern, and the implementation. The registry is a
//! precomputed table assembled once from the per-family modules; the
//! entries are statically known and dispatch is a plain map lookup.

use east_core::{EastError, Type, TypeError, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// What a type parameter may be instantiated with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    /// Any type, functions included.
    Any,
    /// A data type (no functions anywhere inside).
    Data,
    /// An immutable data type (valid set/dict key).
    Immutable,
}

/// Input/output type pattern. `Param(i)` references the i-th type
/// parameter of the builtin.
#[derive(Debug, Clone)]
pub enum TPat {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    DateTime,
    Blob,
    Param(usize),
    Array(Box<TPat>),
    Set(Box<TPat>),
    Dict(Box<TPat>, Box<TPat>),
    Ref(Box<TPat>),
    Struct(Vec<(&'static str, TPat)>),
    /// Cases must be listed in sorted order.
    Variant(Vec<(&'static str, TPat)>),
    /// A sync function; the platform set is unconstrained (argument
    /// checking uses the relaxed subtype).
    Func(Vec<TPat>, Box<TPat>),
}

impl TPat {
    pub fn instantiate(&self, args: &[Type]) -> Type {
        match self {
            TPat::Null => Type::Null,
            TPat::Boolean => Type::Boolean,
            TPat::Integer => Type::Integer,
            TPat::Float => Type::Float,
            TPat::String => Type::String,
            TPat::DateTime => Type::DateTime,
            TPat::Blob => Type::Blob,
            TPat::Param(i) => args[*i].clone(),
            TPat::Array(elem) => Type::Array(Box::new(elem.instantiate(args))),
            TPat::Set(key) => Type::Set(Box::new(key.instantiate(args))),
            TPat::Dict(key, value) => Type::Dict(
                Box::new(key.instantiate(args)),
                Box::new(value.instantiate(args)),
            ),
            TPat::Ref(inner) => Type::Ref(Box::new(inner.instantiate(args))),
            TPat::Struct(fields) => Type::Struct(
                fields
                    .iter()
                    .map(|(name, pat)| (name.to_string(), pat.instantiate(args)))
                    .collect(),
            ),
            TPat::Variant(cases) => Type::Variant(
                cases
                    .iter()
                    .map(|(name, pat)| (name.to_string(), pat.instantiate(args)))
                    .collect(),
            ),
            TPat::Func(inputs, output) => Type::Function {
                inputs: inputs.iter().map(|pat| pat.instantiate(args)).collect(),
                output: Box::new(output.instantiate(args)),
                platforms: Default::default(),
            },
        }
    }
}

/// Implementation entry point: instantiated type arguments plus the
/// evaluated operand values, strictly left-to-right.
pub type Run = fn(&[Type], Vec<Value>) -> Result<Value, EastError>;

pub struct BuiltinDef {
    pub name: &'static str,
    pub params: Vec<ParamKind>,
    pub inputs: Vec<TPat>,
    pub output: TPat,
    pub run: Run,
}

impl BuiltinDef {
    /// Instantiate the signature with concrete type arguments, checking
    /// arity and parameter kinds.
    pub fn signature(&self, type_args: &[Type]) -> Result<(Vec<Type>, Type), TypeError> {
        if type_args.len() != self.params.len() {
            return Err(TypeError::new(format!(
                "builtin {} takes {} type parameters, got {}",
                self.name,
                self.params.len(),
                type_args.len()
            )));
        }
        for (i, (kind, ty)) in self.params.iter().zip(type_args.iter()).enumerate() {
            let ok = match kind {
                ParamKind::Any => true,
                ParamKind::Data => east_core::is_data_type(ty),
                ParamKind::Immutable => east_core::is_immutable_type(ty),
            };
            if !ok {
                return Err(TypeError::new(format!(
                    "builtin {} type parameter {i} must be {}, got {ty}",
                    self.name,
                    match kind {
                        ParamKind::Any => "any type",
                        ParamKind::Data => "a data type",
                        ParamKind::Immutable => "an immutable data type",
                    }
                )));
            }
        }
        let inputs = self
            .inputs
            .iter()
            .map(|pat| pat.instantiate(type_args))
            .collect();
        Ok((inputs, self.output.instantiate(type_args)))
    }
}

/// Look up a builtin by its registry name.
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    registry().get(name)
}

/// All registered builtin names, for diagnostics.
pub fn names() -> impl Iterator<Item = &'static str> {
    registry().keys().copied()
}

fn registry() -> &'static HashMap<&'static str, BuiltinDef> {
    static REGISTRY: OnceLock<HashMap<&'static str, BuiltinDef>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut defs: Vec<BuiltinDef> = Vec::new();
        crate::compare_ops::install(&mut defs);
        crate::boolean_ops::install(&mut defs);
        crate::integer_ops::install(&mut defs);
        crate::float_ops::install(&mut defs);
        crate::string_ops::install(&mut defs);
        crate::time_ops::install(&mut defs);
        crate::blob_ops::install(&mut defs);
        crate::ref_ops::install(&mut defs);
        crate::array_ops::install(&mut defs);
        crate::set_ops::install(&mut defs);
        crate::dict_ops::install(&mut defs);
        crate::struct_ops::install(&mut defs);
        let mut map = HashMap::with_capacity(defs.len());
        for def in defs {
            let existing = map.insert(def.name, def);
            debug_assert!(existing.is_none(), "duplicate builtin registration");
        }
        map
    })
}

/// Shorthand used by the per-family modules.
pub(crate) fn def(
    name: &'static str,
    params: Vec<ParamKind>,
    inputs: Vec<TPat>,
    output: TPat,
    run: Run,
) -> BuiltinDef {
    BuiltinDef {
        name,
        params,
        inputs,
        output,
        run,
    }
}

/// `Variant{none: Null, some: P(i)}`, the option shape used by tryGet,
/// filterMap, and firstMap.
pub(crate) fn option_pat(i: usize) -> TPat {
    TPat::Variant(vec![("none", TPat::Null), ("some", TPat::Param(i))])
}

pub(crate) fn some_value(value: Value) -> Value {
    Value::variant("some", value)
}

pub(crate) fn none_value() -> Value {
    Value::variant("none", Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_signature() {
        let def = lookup("IntegerAdd").expect("IntegerAdd registered");
        let (inputs, output) = def.signature(&[]).unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(matches!(output, Type::Integer));
    }

    #[test]
    fn test_param_kind_enforced() {
        let def = lookup("ArrayToSet").expect("ArrayToSet registered");
        let err = def
            .signature(&[Type::Array(Box::new(Type::Integer))])
            .unwrap_err();
        assert!(err.to_string().contains("immutable"));
        assert!(def.signature(&[Type::Integer]).is_ok());
    }

    #[test]
    fn test_generic_instantiation() {
        let def = lookup("ArrayMap").expect("ArrayMap registered");
        let (inputs, output) = def.signature(&[Type::Integer, Type::String]).unwrap();
        assert!(east_core::type_equal(
            &inputs[0],
            &Type::Array(Box::new(Type::Integer))
        ));
        assert!(east_core::type_equal(
            &output,
            &Type::Array(Box::new(Type::String))
        ));
    }

    #[test]
    fn test_registry_names_unique_and_uppercase() {
        for name in names() {
            assert!(name.chars().next().unwrap().is_ascii_uppercase(), "{name}");
        }
    }
}
