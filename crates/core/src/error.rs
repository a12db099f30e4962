//! Error types shared across the engine
//!
//! Three distinct varieties, matching who may observe them:
//!
//! - [`TypeError`] — construction/analysis-time faults (malformed types,
//!   failed subtype relations, unresolved names). Never catchable from
//!   within an East program.
//! - [`EastError`] — runtime faults raised by `Error` nodes, builtins, and
//!   platform implementations. Catchable by `Try`.
//! - Serialization faults live in `east-codec` and are likewise host-only.

use crate::ir::Location;
use std::fmt;

/// A construction-time or analysis-time type fault.
///
/// The `path` records the nesting at which the mismatch occurred, outermost
/// first, so composition operators can report e.g.
/// `array element: variant case b is not present in both variants`.
#[derive(Debug, Clone)]
pub struct TypeError {
    pub path: Vec<String>,
    pub message: String,
}

impl TypeError {
    pub fn new(message: impl Into<String>) -> Self {
        TypeError {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Prepend a path segment while unwinding out of a nested check.
    pub fn push(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.path {
            write!(f, "{segment}: ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TypeError {}

/// The single runtime error variety observable from inside an East program.
///
/// The stack is a synthetic list of IR locations, pushed by each frame
/// boundary as the error propagates outward.
#[derive(Debug, Clone, PartialEq)]
pub struct EastError {
    pub message: String,
    pub stack: Vec<Location>,
}

impl EastError {
    pub fn new(message: impl Into<String>) -> Self {
        EastError {
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Push a frame location onto the stack, innermost first.
    pub fn at(mut self, location: Option<&Location>) -> Self {
        if let Some(location) = location {
            self.stack.push(location.clone());
        }
        self
    }
}

impl fmt::Display for EastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for location in &self.stack {
            write!(f, "\n  at {location}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EastError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_error_path_prefixes() {
        let err = TypeError::new("variant case b is not present in both variants")
            .push("dict value")
            .push("array element");
        assert_eq!(
            err.to_string(),
            "array element: dict value: variant case b is not present in both variants"
        );
    }

    #[test]
    fn test_east_error_stack_display() {
        let err = EastError::new("boom").at(Some(&Location::new(3, 7)));
        assert_eq!(err.to_string(), "boom\n  at 3:7");
    }
}
