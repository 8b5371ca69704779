//! Planner error types
//!
//! Error codes:
//! - PLAN_UNSUPPORTED_PUSHDOWN (user query shape an operator cannot absorb)
//! - PLAN_UNSUPPORTED_QUERY (named limitation of the planner)
//! - PLAN_INVARIANT_VIOLATION (planner bug, never the user's fault)
//! - PLAN_UNKNOWN_TABLE (semantic lookup failed)
//! - PLAN_INVALID_CONFIG (configuration rejected at load time)
//!
//! No error is retryable: planning is deterministic.

use std::fmt;

use thiserror::Error;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// The query cannot be planned as written
    UserInput,
    /// The planner broke its own contract
    PlannerBug,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::UserInput => write!(f, "REJECT"),
            Category::PlannerBug => write!(f, "BUG"),
        }
    }
}

/// Planner error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Predicate or column cannot be accommodated by the operator
    UnsupportedPushDown,
    /// A specific, named query shape the planner does not handle
    UnsupportedQueryShape,
    /// Offsets or arities disagree with what the caller predicted
    InvariantViolation,
    /// Table identifier has no semantic information
    UnknownTable,
    /// Configuration could not be read or validated
    InvalidConfig,
}

impl PlannerErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::UnsupportedPushDown => "PLAN_UNSUPPORTED_PUSHDOWN",
            PlannerErrorCode::UnsupportedQueryShape => "PLAN_UNSUPPORTED_QUERY",
            PlannerErrorCode::InvariantViolation => "PLAN_INVARIANT_VIOLATION",
            PlannerErrorCode::UnknownTable => "PLAN_UNKNOWN_TABLE",
            PlannerErrorCode::InvalidConfig => "PLAN_INVALID_CONFIG",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            PlannerErrorCode::InvariantViolation => Category::PlannerBug,
            _ => Category::UserInput,
        }
    }

    /// True when the error reveals a planner contract breach
    pub fn is_planner_bug(&self) -> bool {
        self.category() == Category::PlannerBug
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error with its code and a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{}] {code}: {message}", .code.category())]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
    /// Set once the error has been logged and counted
    reported: bool,
}

impl PlannerError {
    pub fn new(code: PlannerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reported: false,
        }
    }

    /// Create an unsupported push-down error
    pub fn unsupported_push_down(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::UnsupportedPushDown, reason)
    }

    /// Create an unsupported query shape error
    pub fn unsupported_query(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::UnsupportedQueryShape, reason)
    }

    /// Create an invariant violation error
    pub fn invariant_violation(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::InvariantViolation, reason)
    }

    /// Wrong number of inputs handed to a fixed-arity operator
    pub fn arity(operator: &str, expected: usize, got: usize) -> Self {
        Self::invariant_violation(format!(
            "unexpected number of inputs for {}: want {}, got {}",
            operator, expected, got
        ))
    }

    /// Create an unknown table error
    pub fn unknown_table(table: impl fmt::Display) -> Self {
        Self::new(
            PlannerErrorCode::UnknownTable,
            format!("no table info for {}", table),
        )
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::InvalidConfig, reason)
    }

    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_planner_bug(&self) -> bool {
        self.code.is_planner_bug()
    }

    /// True once a planning context has logged and counted this error
    pub fn is_reported(&self) -> bool {
        self.reported
    }

    pub(crate) fn mark_reported(mut self) -> Self {
        self.reported = true;
        self
    }
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
