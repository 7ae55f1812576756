//! Error types for runs, requests and custom policies.

use thiserror::Error;

/// Errors that can occur while driving a simulation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The environment has been dropped and is no longer accessible.
    #[error("Simulation has been shut down")]
    SimulationShutdown,
    /// A wake-up was requested with a negative, non-finite or out of range delay.
    #[error("Invalid delay: {0}ms")]
    InvalidDelay(f64),
    /// The simulation is in an invalid state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),
    /// The run processed more wake-ups than its configured budget allows.
    #[error("Event budget exhausted after {0} events")]
    EventBudgetExhausted(u64),
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Errors raised while decoding or validating a simulation request.
///
/// These are reported as a top-level error response; the run never starts.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request line is not valid JSON or does not match the request shape.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A numeric field is outside its allowed range.
    #[error("invalid {field}: {reason}")]
    OutOfRange {
        /// Dotted path of the offending field.
        field: String,
        /// Human readable constraint that was violated.
        reason: String,
    },
}

impl RequestError {
    pub(crate) fn out_of_range(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RequestError::OutOfRange {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the policy script compiler and evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// The script text does not parse.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset into the script.
        offset: usize,
        /// What the parser expected.
        message: String,
    },
    /// The script assigns to something other than an output.
    #[error("cannot assign to `{0}`")]
    InvalidTarget(String),
    /// A variable or function name is not defined.
    #[error("unknown name `{0}`")]
    UnknownName(String),
    /// An operator or function was applied to values of the wrong type.
    #[error("type error: {0}")]
    Type(String),
    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// A custom policy fault. The block falls back to the parametric model for the item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// The policy script failed to compile or evaluate.
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
    /// The policy callback reported an error.
    #[error("policy failed: {0}")]
    Failed(String),
    /// The policy callback panicked.
    #[error("policy panicked: {0}")]
    Panicked(String),
    /// The policy returned a processing time that cannot be scheduled: negative,
    /// not finite, or too large.
    #[error("invalid processing time: {0}ms")]
    InvalidDuration(f64),
}
