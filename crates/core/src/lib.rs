//! East core: the data model of the East expression language
//!
//! Key design principles:
//! - `Type`: the closed set of semantic types with structural
//!   compatibility rules (`type_ops`)
//! - `Value`: runtime representation, scalars by-value and containers
//!   with identity
//! - `Expr`: the immutable IR tree hosts build and the compilers lower
//! - canonical printing and parsing round-trip every data type

pub mod datetime;
pub mod error;
pub mod ir;
pub mod parse;
pub mod print;
pub mod type_ops;
pub mod types;
pub mod value;

pub use error::{EastError, TypeError};
pub use ir::{Expr, ExprKind, Location, MatchArm};
pub use parse::{ParseError, parse_type, parse_value};
pub use print::print_value;
pub use type_ops::{equal_refine, intersect, subtype, subtype_relaxed, type_equal, union};
pub use types::{Type, is_data_type, is_immutable_type, print_type};
pub use value::{
    ArrayData, AsyncCallable, Callable, DictData, FunctionData, IterGuard, Key, RefData, SetData,
    SyncCallable, Value, ValueFuture, VariantData, check_mutable, cmp_values, default_value,
    deep_copy, is_identical, is_value_of, values_equal,
};
