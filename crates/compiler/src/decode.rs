//! Function-aware BEAST2 decoding
//!
//! `east-codec` decodes function values with an unlinked callable; this
//! module re-runs analysis and the appropriate compiler path against a
//! fresh platform list so the decoded value is callable again. The
//! recompiled value carries its IR, so decode-encode-decode is a fixed
//! point.

use crate::analyzer::analyze;
use crate::compile::{CompileError, compile_function_value};
use crate::platform::Platforms;
use east_codec::CodecError;
use east_core::{Callable, Type, TypeError, Value};
use std::fmt;
use tracing::debug;

#[derive(Debug)]
pub enum LinkError {
    Codec(CodecError),
    Type(TypeError),
    Compile(CompileError),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Codec(e) => write!(f, "{e}"),
            LinkError::Type(e) => write!(f, "{e}"),
            LinkError::Compile(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<CodecError> for LinkError {
    fn from(e: CodecError) -> Self {
        LinkError::Codec(e)
    }
}

impl From<TypeError> for LinkError {
    fn from(e: TypeError) -> Self {
        LinkError::Type(e)
    }
}

impl From<CompileError> for LinkError {
    fn from(e: CompileError) -> Self {
        LinkError::Compile(e)
    }
}

/// Decode a stream of the expected type and re-compile any embedded
/// function against `platforms`.
pub fn decode_beast2_linked(
    expected: &Type,
    platforms: &Platforms,
    bytes: &[u8],
) -> Result<Value, LinkError> {
    let value = east_codec::decode_beast2_for(expected, bytes)?;
    link(value, platforms)
}

/// Decode a self-describing stream and re-compile any embedded function
/// against `platforms`.
pub fn decode_beast2_anonymous_linked(
    platforms: &Platforms,
    bytes: &[u8],
) -> Result<(Type, Value), LinkError> {
    let (ty, value) = east_codec::decode_beast2(bytes)?;
    Ok((ty, link(value, platforms)?))
}

/// Functions are never data types, so an unlinked callable can only sit
/// at the top of a decoded value.
fn link(value: Value, platforms: &Platforms) -> Result<Value, LinkError> {
    match &value {
        Value::Function(data) if matches!(data.callable, Callable::Unlinked) => {
            let Some(ir) = &data.ir else {
                return Err(LinkError::Codec(CodecError::Unsupported(
                    "decoded function has no IR".into(),
                )));
            };
            debug!("relinking decoded function");
            let analyzed = analyze(ir, platforms)?;
            Ok(compile_function_value(&analyzed, platforms)?)
        }
        _ => Ok(value),
    }
}
