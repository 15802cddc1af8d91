#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Error taxonomy for the AQL engine.
//!
//! Four kinds surface to callers: syntax errors from the parser, compile
//! errors from the planner, population errors from the row materializer, and
//! execution errors wrapping the storage layer. All of them propagate; the
//! engine never retries or silently recovers.

use std::fmt;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, AqlError>;

/// Top-level error type returned by the engine facade.
#[derive(Debug, Error)]
pub enum AqlError {
    /// The query text did not match the grammar.
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    /// The parsed query referenced unknown or illegal catalog entries.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// A result row could not be converted into typed field values.
    #[error(transparent)]
    Population(#[from] PopulationError),
    /// The storage layer failed while running the plan.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl AqlError {
    /// True when the failure was caused by the caller's query text, so REST
    /// collaborators can map it to a client error response.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AqlError::Syntax(_) | AqlError::Compile(_))
    }
}

/// Parse failure carrying the deepest offset reached and the literals or
/// token classes that were expected there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct SyntaxError {
    /// Byte offset of the deepest failed match.
    pub offset: usize,
    /// Expected terminals at that offset, deduplicated and sorted.
    pub expected: Vec<String>,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error at offset {}: expected ", self.offset)?;
        match self.expected.as_slice() {
            [] => write!(f, "end of input"),
            [one] => write!(f, "{one}"),
            many => {
                write!(f, "one of ")?;
                for (i, token) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{token}")?;
                }
                Ok(())
            }
        }
    }
}

/// Structured errors emitted while compiling a parsed query into a plan.
///
/// Every variant names the offending domain, field, or edge so callers can
/// report a precise diagnostic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Domain keyword is absent from the registry.
    #[error("unknown domain '{name}'")]
    UnknownDomain { name: String },
    /// Field name is not registered on the domain it was bound to.
    #[error("unknown field '{field}' on domain '{domain}'")]
    UnknownField { domain: String, field: String },
    /// Operator is not legal for the field's kind.
    #[error("operator '{op}' is not legal for {kind} field '{field}'")]
    IllegalOperator {
        op: String,
        field: String,
        kind: String,
    },
    /// Criterion value cannot be interpreted for the field's kind.
    #[error("illegal value for field '{field}': {detail}")]
    IllegalValue { field: String, detail: String },
    /// No registered traversal edge connects the two domains.
    #[error("no traversal from domain '{from}' to domain '{to}'")]
    NoTraversal { from: String, to: String },
    /// Criteria tree nesting exceeds the configured budget.
    #[error("criteria tree exceeds depth {max} (got {depth})")]
    CriteriaTooDeep { depth: usize, max: usize },
    /// A trailer argument was malformed (e.g. dryRun wants "true"/"false").
    #[error("invalid argument for '{trailer}': {detail}")]
    InvalidTrailer {
        trailer: &'static str,
        detail: String,
    },
}

impl CompileError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::UnknownDomain { .. } => "UnknownDomain",
            CompileError::UnknownField { .. } => "UnknownField",
            CompileError::IllegalOperator { .. } => "IllegalOperator",
            CompileError::IllegalValue { .. } => "IllegalValue",
            CompileError::NoTraversal { .. } => "NoTraversal",
            CompileError::CriteriaTooDeep { .. } => "CriteriaTooDeep",
            CompileError::InvalidTrailer { .. } => "InvalidTrailer",
        }
    }
}

/// Row materialization failure. Indicates a schema/registry mismatch and is
/// non-recoverable: the query fails rather than returning a corrupt row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PopulationError {
    /// Stored item-type ordinal is outside the known range.
    #[error("unknown item type ordinal {ordinal} in column '{column}'")]
    UnknownItemType { column: String, ordinal: i64 },
    /// Raw storage class contradicts the field's declared kind.
    #[error("column '{column}' holds {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    /// Stored timestamp cannot be represented as a calendar date.
    #[error("column '{column}' timestamp {millis} is out of range")]
    DateOutOfRange { column: String, millis: i64 },
}

/// Storage-layer failure, with the original cause preserved.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Underlying SQLite error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_lists_expected_tokens() {
        let err = SyntaxError {
            offset: 12,
            expected: vec!["'}'".into(), "','".into()],
        };
        let text = err.to_string();
        assert!(text.contains("offset 12"));
        assert!(text.contains("'}'"));
        assert!(text.contains("','"));
    }

    #[test]
    fn client_errors_are_distinguished() {
        let syntax: AqlError = SyntaxError {
            offset: 0,
            expected: vec![],
        }
        .into();
        assert!(syntax.is_client_error());

        let pop: AqlError = PopulationError::UnknownItemType {
            column: "items.type".into(),
            ordinal: 9,
        }
        .into();
        assert!(!pop.is_client_error());
    }

    #[test]
    fn compile_error_codes_are_stable() {
        let err = CompileError::UnknownField {
            domain: "items".into(),
            field: "bogus".into(),
        };
        assert_eq!(err.code(), "UnknownField");
        assert!(err.to_string().contains("bogus"));
        assert!(err.to_string().contains("items"));
    }
}
