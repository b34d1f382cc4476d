//! Error types for benchrun
//!
//! Exit codes:
//! - 0: Success
//! - 2: User or precondition error (bad config, missing agent, bad task file)
//! - 3: Write-once conflict (a result record already exists)
//! - 4: Operation failed (I/O, parse, git error)
//!
//! Per-task failures never surface here; the runner records them as
//! `errored` results and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the benchrun CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const CONFLICT: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for benchrun operations
#[derive(Error, Debug)]
pub enum Error {
    // User / precondition errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid task id '{id}': {reason}")]
    InvalidTaskId { id: String, reason: String },

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    // Write-once conflicts (exit code 3)
    #[error("Result already exists for task {0}")]
    RecordExists(String),

    // Operation failures (exit code 4)
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Agent invocation failed: {0}")]
    AgentFailed(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::InvalidTaskId { .. }
            | Error::DuplicateTask(_)
            | Error::Precondition(_)
            | Error::DirectoryNotFound(_) => exit_codes::USER_ERROR,

            Error::RecordExists(_) => exit_codes::CONFLICT,

            Error::Git(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::Walk(_)
            | Error::LockFailed(_)
            | Error::AgentFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for variants that carry more than a message
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InvalidTaskId { id, reason } => Some(serde_json::json!({
                "task_id": id,
                "reason": reason,
            })),
            Error::DuplicateTask(id) | Error::RecordExists(id) => {
                Some(serde_json::json!({ "task_id": id }))
            }
            Error::DirectoryNotFound(path) | Error::LockFailed(path) => {
                Some(serde_json::json!({ "path": path }))
            }
            Error::InvalidConfig(message) | Error::Precondition(message) => {
                Some(serde_json::json!({ "message": message }))
            }
            _ => None,
        }
    }
}

/// Result type alias for benchrun operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
