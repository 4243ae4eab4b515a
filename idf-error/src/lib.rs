//! Unified error handling for idracfan
//!
//! A single error type shared by the core library, the daemon and the CLI.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias using IdracfanError
pub type Result<T> = std::result::Result<T, IdracfanError>;

/// Unified error type for all idracfan operations
#[derive(thiserror::Error, Debug)]
pub enum IdracfanError {
    // ============================================================================
    // I/O and Process Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Required tool not found: {tool} (install it with: dnf/apt install ipmitool)")]
    ToolNotFound {
        tool: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: io::Error,
    },

    #[error("Command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout:?}")]
    Timeout {
        command: String,
        timeout: Duration,
    },

    // ============================================================================
    // Validation Errors
    // ============================================================================
    #[error("Invalid duty cycle: {value} (must be 0-100)")]
    InvalidDutyCycle {
        value: i64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl IdracfanError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_command() {
        let err = IdracfanError::Timeout {
            command: "ipmitool sdr type fan".to_string(),
            timeout: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("ipmitool sdr type fan"));
        assert!(msg.contains("5s"));
    }

    #[test]
    fn test_tool_not_found_names_tool() {
        let err = IdracfanError::ToolNotFound { tool: "ipmitool".into() };
        assert!(err.to_string().contains("ipmitool"));
    }

    #[test]
    fn test_helpers_build_expected_variants() {
        assert!(matches!(IdracfanError::generic("boom"), IdracfanError::Generic(ref m) if m == "boom"));
        assert!(matches!(IdracfanError::config("bad"), IdracfanError::Config(ref m) if m == "bad"));
    }
}
