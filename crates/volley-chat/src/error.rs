//! Error types for volley-chat

use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using volley-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Which store operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Lookup,
    Create,
    Save,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreOp::Lookup => "lookup",
            StoreOp::Create => "create",
            StoreOp::Save => "save",
        })
    }
}

/// Errors produced by sessions and the completion orchestrator
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed message, model, or generation config
    #[error("Validation error: {0}")]
    Validation(String),

    /// The session cannot hold the message even after eviction
    #[error("Token budget exceeded: need {required} tokens, model capacity is {capacity}")]
    BudgetExceeded { required: u32, capacity: u32 },

    /// The session store failed
    #[error("Store {op} failed: {source}")]
    Store {
        op: StoreOp,
        #[source]
        source: StoreError,
    },

    /// The streaming client failed to open or deliver the stream
    #[error("Stream error: {0}")]
    Stream(#[from] volley_ai::Error),

    /// The output sink was closed by its consumer
    #[error("Output sink closed")]
    SinkClosed,

    /// The call was cancelled
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn store(op: StoreOp, source: StoreError) -> Self {
        Self::Store { op, source }
    }

    /// Check if this error came from a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Stage of one `execute` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Looking up or creating the session
    Resolve,
    /// Appending the user message
    Append,
    /// Opening and consuming the completion stream
    Stream,
    /// Appending the assistant message
    Finalize,
    /// Saving the session
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Resolve => "resolve",
            Stage::Append => "append",
            Stage::Stream => "stream",
            Stage::Finalize => "finalize",
            Stage::Persist => "persist",
        })
    }
}

/// A failed `execute` call, tagged with the stage that failed
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct ExecuteError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl ExecuteError {
    pub(crate) fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }

    /// Whether the user message had been accepted in memory before the
    /// failure. When true the answer was lost; the store still holds the
    /// state of the last successful persist, without this turn.
    pub fn user_turn_accepted(&self) -> bool {
        matches!(self.stage, Stage::Stream | Stage::Finalize | Stage::Persist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_error_display_names_stage() {
        let err = ExecuteError::new(
            Stage::Persist,
            Error::store(StoreOp::Save, StoreError::Backend("disk full".into())),
        );
        assert_eq!(err.to_string(), "persist failed: Store save failed: disk full");
    }

    #[test]
    fn test_user_turn_accepted_by_stage() {
        let early = ExecuteError::new(Stage::Append, Error::validation("content is empty"));
        assert!(!early.user_turn_accepted());

        let late = ExecuteError::new(Stage::Stream, Error::Cancelled);
        assert!(late.user_turn_accepted());
        assert!(late.source.is_cancelled());
    }

    #[test]
    fn test_budget_error_message() {
        let err = Error::BudgetExceeded {
            required: 130,
            capacity: 100,
        };
        assert!(err.to_string().contains("need 130 tokens"));
    }
}
