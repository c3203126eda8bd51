//! Error taxonomy.
//!
//! Every error surfaced by the library carries a machine-readable
//! [`ErrorCode`] and, where it matters for callers, a retryability flag.
//! The library itself never retries; callers use [`Error::is_retryable`]
//! and friends to decide.

use std::fmt;

use thiserror::Error;

use crate::backend::BackendId;

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidModel,
    InvalidApiKey,
    RateLimited,
    UnsupportedFeature,
    UnsupportedTool,
    ToolUnavailable,
    ToolExecutionFailed,
    InvalidRequest,
    ProviderUnavailable,
    Timeout,
    StreamInterrupted,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidModel => "INVALID_MODEL",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::RateLimited => "RATE_LIMITED",
            Self::UnsupportedFeature => "UNSUPPORTED_FEATURE",
            Self::UnsupportedTool => "UNSUPPORTED_TOOL",
            Self::ToolUnavailable => "TOOL_UNAVAILABLE",
            Self::ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::StreamInterrupted => "STREAM_INTERRUPTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Model validation or availability failure.
    #[error("model '{model}' for backend '{backend}': {reason}")]
    Model {
        code: ErrorCode,
        model: String,
        backend: BackendId,
        reason: String,
    },

    /// Request parameter validation failure.
    #[error("validation failed for '{field}' (value: {value}): {reason}")]
    Validation {
        code: ErrorCode,
        field: String,
        value: serde_json::Value,
        reason: String,
    },

    /// Tool availability or translation failure.
    #[error("tool '{tool}' error for model '{model}' ({backend}): {reason}")]
    Tool {
        code: ErrorCode,
        tool: String,
        backend: BackendId,
        model: String,
        reason: String,
        retryable: bool,
    },

    /// Error reported by the upstream backend API.
    #[error("backend '{backend}' error (status {status_code}): {message}")]
    Backend {
        code: ErrorCode,
        backend: BackendId,
        status_code: u16,
        message: String,
        retryable: bool,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by a backend mid-stream, after events already flowed.
    #[error("backend '{backend}' stream error: {message}")]
    Stream { backend: BackendId, message: String },

    /// The caller's cancellation signal fired.
    #[error("request cancelled by caller")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    /// Internal invariant violation. Seeing one of these is a library bug,
    /// not a caller mistake.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify an HTTP status from a backend into a typed error.
    pub fn from_status(backend: BackendId, status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let (code, retryable, message) = match status_code {
            401 | 403 => (ErrorCode::InvalidApiKey, false, message),
            404 => (ErrorCode::InvalidModel, false, message),
            408 => (ErrorCode::Timeout, true, message),
            429 => (ErrorCode::RateLimited, true, message),
            402 => (
                ErrorCode::ProviderUnavailable,
                false,
                format!("insufficient credits: {message}"),
            ),
            502 | 503 | 504 => (ErrorCode::ProviderUnavailable, true, message),
            _ => (ErrorCode::ProviderUnavailable, false, message),
        };
        Self::Backend {
            code,
            backend,
            status_code,
            message,
            retryable,
        }
    }

    pub fn invalid_model(backend: BackendId, model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Model {
            code: ErrorCode::InvalidModel,
            model: model.into(),
            backend,
            reason: reason.into(),
        }
    }

    pub fn unsupported_feature(
        backend: BackendId,
        model: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Model {
            code: ErrorCode::UnsupportedFeature,
            model: model.into(),
            backend,
            reason: reason.into(),
        }
    }

    pub fn missing_api_key(backend: BackendId) -> Self {
        Self::Backend {
            code: ErrorCode::InvalidApiKey,
            backend,
            status_code: 401,
            message: "missing API key".to_string(),
            retryable: false,
        }
    }

    pub fn invalid_request(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::InvalidRequest,
            field: field.into(),
            value: serde_json::Value::Null,
            reason: reason.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            code: ErrorCode::InvalidRequest,
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The machine-readable category of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Model { code, .. }
            | Self::Validation { code, .. }
            | Self::Tool { code, .. }
            | Self::Backend { code, .. } => *code,
            Self::Http(e) if e.is_timeout() => ErrorCode::Timeout,
            Self::Http(_) => ErrorCode::ProviderUnavailable,
            Self::Json(_) | Self::Yaml(_) | Self::Io(_) => ErrorCode::InvalidRequest,
            Self::Stream { .. } | Self::Cancelled => ErrorCode::StreamInterrupted,
            Self::Timeout => ErrorCode::Timeout,
            Self::Internal(_) => ErrorCode::ProviderUnavailable,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// True for rate limits, temporary unavailability, timeouts (including
    /// transport-layer cancellation due to a deadline), and any typed error
    /// carrying a `retryable` flag.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Http(e) => e.is_timeout(),
            Self::Backend { retryable, .. } | Self::Tool { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Whether this error indicates invalid request parameters.
    /// These are never retryable without changing the request.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidRequest
                | ErrorCode::InvalidModel
                | ErrorCode::UnsupportedFeature
                | ErrorCode::UnsupportedTool
        )
    }

    /// Whether this error is related to authentication.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Self::Backend {
                code, status_code, ..
            } => *code == ErrorCode::InvalidApiKey || *status_code == 401 || *status_code == 403,
            _ => self.code() == ErrorCode::InvalidApiKey,
        }
    }
}
