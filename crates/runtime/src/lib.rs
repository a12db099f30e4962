//! East runtime kernel: the builtin operations on primitives and
//! containers
//!
//! Key design principles:
//! - every operation is a [`registry::BuiltinDef`] in a precomputed,
//!   statically-known table keyed by an uppercase name
//! - signatures are data: type-parameter patterns the analyzer
//!   instantiates and checks before a node ever compiles
//! - mutation respects the per-container iteration guard; walking
//!   operations hold the guard so callbacks cannot mutate the container
//!   they are walking

pub mod array_ops;
pub mod blob_ops;
pub mod boolean_ops;
pub mod compare_ops;
pub mod dict_ops;
pub mod float_ops;
pub mod integer_ops;
pub mod operands;
pub mod ref_ops;
pub mod registry;
pub mod set_ops;
pub mod string_ops;
pub mod struct_ops;
pub mod time_ops;

pub use registry::{BuiltinDef, ParamKind, TPat, lookup, names};
