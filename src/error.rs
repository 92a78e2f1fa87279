//! Error types for bk
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad input, unknown task, uninitialized store)
//! - 3: Rejected transition (status state machine violation)
//! - 4: Operation failed (I/O, lock contention, corrupt store)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the bk CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const TRANSITION_REJECTED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for backlog operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("No backlog store found at {0}")]
    StoreNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // Rejected transitions (exit code 3)
    #[error("Invalid status transition: {from} -> {to} ({reason})")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::StoreNotFound(_)
            | Error::InvalidConfig(_)
            | Error::Validation(_)
            | Error::TaskNotFound(_) => exit_codes::USER_ERROR,

            // Rejected transitions
            Error::InvalidTransition { .. } => exit_codes::TRANSITION_REJECTED,

            // Operation failures
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error envelopes
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InvalidTransition { from, to, reason } => Some(serde_json::json!({
                "from": from,
                "to": to,
                "reason": reason,
            })),
            Error::TaskNotFound(id) => Some(serde_json::json!({ "task_id": id })),
            _ => None,
        }
    }
}

/// Result type alias for backlog operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_error_classes() {
        assert_eq!(
            Error::Validation("bad".to_string()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            Error::TaskNotFound("TASK-999".to_string()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            Error::InvalidTransition {
                from: "completed".to_string(),
                to: "blocked".to_string(),
                reason: "not an allowed edge".to_string(),
            }
            .exit_code(),
            exit_codes::TRANSITION_REJECTED
        );
        assert_eq!(
            Error::LockFailed(PathBuf::from("/tmp/store.lock")).exit_code(),
            exit_codes::OPERATION_FAILED
        );
    }

    #[test]
    fn transition_details_include_edge() {
        let err = Error::InvalidTransition {
            from: "not-started".to_string(),
            to: "completed".to_string(),
            reason: "task was never started".to_string(),
        };
        let details = err.details().expect("details");
        assert_eq!(details["from"], "not-started");
        assert_eq!(details["to"], "completed");
    }
}
