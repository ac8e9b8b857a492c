//! Error types for Scout.
//!
//! Resolution absence is never an error: a target that matches no product
//! simply resolves to `None`. Errors cover command execution failures,
//! metadata that cannot be interpreted unambiguously, and plumbing (I/O,
//! JSON). Execution failures carry the offending command and whatever
//! output was captured so a parser can decide whether the loss is fatal
//! to its own result or merely yields partial data.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Scout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Deployment metadata errors (conflicting or malformed entries).
    Metadata,
    /// Command execution errors (spawn, exit status, timeout).
    Execution,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Metadata => write!(f, "metadata"),
            ErrorCategory::Execution => write!(f, "execution"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for Scout.
#[derive(Debug, Error)]
pub enum Error {
    #[error("command exited with status {code}: {command}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },

    #[error("failed to spawn command '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("malformed command string: {0}")]
    BadCommand(String),

    #[error("no captured output for command: {command}")]
    NotCaptured { command: String },

    #[error(
        "system entry '{system_id}' carries conflicting role fields: \
         role={role:?}, type={node_type:?}"
    )]
    RoleConflict {
        system_id: String,
        role: String,
        node_type: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::CommandFailed { .. }
            | Error::Timeout { .. }
            | Error::Spawn { .. }
            | Error::BadCommand(_)
            | Error::NotCaptured { .. } => ErrorCategory::Execution,

            Error::RoleConflict { .. } => ErrorCategory::Metadata,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable by the caller.
    ///
    /// A collection driver may retry a failed or timed-out command; it cannot
    /// retry its way around metadata that contradicts itself or a command an
    /// archive never captured.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::CommandFailed { .. } => true,
            Error::Timeout { .. } => true,
            Error::Io(_) => true,

            Error::Spawn { .. } => false,
            Error::BadCommand(_) => false,
            Error::NotCaptured { .. } => false,
            Error::RoleConflict { .. } => false,
            Error::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_grouping() {
        let failed = Error::CommandFailed {
            command: "uname -a".into(),
            code: 1,
            output: String::new(),
        };
        assert_eq!(failed.category(), ErrorCategory::Execution);

        let conflict = Error::RoleConflict {
            system_id: "node1".into(),
            role: "host".into(),
            node_type: "Manager".into(),
        };
        assert_eq!(conflict.category(), ErrorCategory::Metadata);

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_recoverability() {
        let timeout = Error::Timeout {
            command: "sleep 60".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_recoverable());

        let missing = Error::NotCaptured {
            command: "lsmod".into(),
        };
        assert!(!missing.is_recoverable());
    }

    #[test]
    fn test_display_carries_command() {
        let err = Error::Timeout {
            command: "hostname -f".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("hostname -f"));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Execution.to_string(), "execution");
        assert_eq!(ErrorCategory::Metadata.to_string(), "metadata");
    }
}
