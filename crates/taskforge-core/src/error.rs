//! Typed errors for the store, the engines, and the oracle boundary.
//!
//! Tool failures are not errors: handlers report them as `ToolResult` values.

use thiserror::Error;

use crate::session::SessionStatus;

/// Session store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Failed to write session snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize session snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Engine-level failures (as opposed to a session ending in `FAILED`)
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Cannot move session from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session {0} has no tool call awaiting confirmation")]
    NoPendingConfirmation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Decision oracle failures. Every variant ends the session in `FAILED`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Transport(String),

    #[error("Oracle returned an error: {0}")]
    Service(String),

    #[error("Oracle response was malformed: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_display() {
        let err = StoreError::NotFound("abc".to_string());
        assert_eq!(err.to_string(), "Session not found: abc");
    }

    #[test]
    fn engine_error_wraps_store_error() {
        let err: EngineError = StoreError::NotFound("abc".to_string()).into();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
        assert_eq!(err.to_string(), "Session not found: abc");
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = EngineError::InvalidTransition {
            from: SessionStatus::Completed,
            to: SessionStatus::Executing,
        };
        assert_eq!(err.to_string(), "Cannot move session from COMPLETED to EXECUTING");
    }
}
