//! Error types for tasksmith modules using thiserror.

use std::fmt;

use thiserror::Error;

/// A failure reported by the upstream model client.
///
/// The only assumption made about upstream failures is that they carry a
/// message and, sometimes, a structured status code (HTTP or gRPC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub message: String,
    pub status: Option<u16>,
}

impl UpstreamError {
    /// Error with a textual message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Error carrying a structured status code.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Coarse error kind, used by callers that map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    Validation,
    RateLimited,
    Upstream,
}

/// Errors from task invocations (text, code, classification).
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),

    #[error("Rate limited by upstream model after {attempts} attempt(s): {last}")]
    RateLimited {
        attempts: u32,
        #[source]
        last: UpstreamError,
    },

    #[error("Upstream model call failed after {attempts} attempt(s): {last}")]
    Upstream {
        attempts: u32,
        #[source]
        last: UpstreamError,
    },
}

impl TaskError {
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::Validation(_) => TaskErrorKind::Validation,
            TaskError::RateLimited { .. } => TaskErrorKind::RateLimited,
            TaskError::Upstream { .. } => TaskErrorKind::Upstream,
        }
    }

    /// The last upstream error, if the failure came from the model.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            TaskError::Validation(_) => None,
            TaskError::RateLimited { last, .. } | TaskError::Upstream { last, .. } => Some(last),
        }
    }
}

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("GOOGLE_API_KEY is not set. Export it or add it to your environment before starting")]
    MissingApiKey,

    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}
