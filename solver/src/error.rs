//! Error taxonomy for policy computation and queries.

use std::fmt;

/// Failure modes surfaced by the solver and query surface.
///
/// `InvalidInput` and `NotReady` carry messages meant for the caller
/// verbatim; `Numeric` is deliberately opaque (it indicates a catalogue or
/// solver bug, not a user mistake).
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// A request field failed validation. No cache mutation has happened.
    InvalidInput {
        field: &'static str,
        message: String,
    },
    /// No policy can reach the target: the λ bracket never went negative,
    /// or the target exceeds the best attainable score.
    UnreachableTarget {
        target_score: f64,
        max_attainable: f64,
    },
    /// A non-finite value appeared in the value function.
    Numeric,
    /// The compute observed its cancellation token and stopped. No entry
    /// was left in the cache.
    Cancelled,
    /// A query arrived before the corresponding policy was computed.
    NotReady,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveError::InvalidInput { field, message } => {
                write!(f, "invalid input for {field}: {message}")
            }
            SolveError::UnreachableTarget {
                target_score,
                max_attainable,
            } => write!(
                f,
                "target score {target_score} is unreachable \
                 (best attainable is {max_attainable}); expected cost is infinite"
            ),
            SolveError::Numeric => write!(f, "internal numeric error in value function"),
            SolveError::Cancelled => write!(f, "computation was cancelled"),
            SolveError::NotReady => {
                write!(f, "no computed policy in memory; compute a policy first")
            }
        }
    }
}

impl std::error::Error for SolveError {}

impl SolveError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        SolveError::InvalidInput {
            field,
            message: message.into(),
        }
    }
}
