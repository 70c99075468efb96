//! Error Taxonomy
//!
//! Every operation in the core returns [`GenerationError`]. The error is
//! `Clone` because a single credential issuance is shared between every
//! caller waiting on it, and each waiter receives its own copy of the result.
//!
//! # Propagation
//!
//! - [`ErrorKind::Parse`] is swallowed per stream frame and never surfaces
//!   from a stage.
//! - Every other kind aborts the current stage; the orchestrator records it
//!   in the pipeline trace and stops.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of characters of a provider body carried in an error
const MAX_DETAIL_CHARS: usize = 200;

/// Coarse classification of a [`GenerationError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or blank required input, rejected before any network call
    Validation,
    /// Missing or blank configuration value
    Configuration,
    /// Non-success HTTP status or connection failure
    Transport,
    /// Provider answered but reported a failure of its own
    Provider,
    /// Polling exceeded the configured bound
    Timeout,
    /// A single stream frame could not be decoded
    Parse,
    /// Credential acquisition failed
    TokenIssuance,
    /// The caller stopped consuming the live stream
    Cancelled,
}

impl ErrorKind {
    /// Stable lowercase label (used in logs and job records)
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Provider => "provider",
            Self::Timeout => "timeout",
            Self::Parse => "parse",
            Self::TokenIssuance => "token_issuance",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors produced by providers, the poller, the broker and the pipeline
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GenerationError {
    /// Required input missing or blank
    #[error("invalid request: {0}")]
    Validation(String),

    /// Configuration key missing or blank
    #[error("configuration value `{key}` is not set or blank")]
    Configuration {
        /// The key that was looked up
        key: String,
    },

    /// HTTP status was not a success
    #[error("{operation} failed with HTTP status {status}")]
    HttpStatus {
        /// Provider operation that was attempted
        operation: String,
        /// HTTP status code returned
        status: u16,
    },

    /// Connection, body read or decode failure below the provider contract
    #[error("{operation} transport error: {message}")]
    Transport {
        /// Provider operation that was attempted
        operation: String,
        /// Underlying error description
        message: String,
    },

    /// Provider reported a failure (non-zero code, failed task, error frame)
    #[error("{operation} rejected by provider: {message}")]
    Provider {
        /// Provider operation that was attempted
        operation: String,
        /// Message reported by the provider
        message: String,
    },

    /// Async task did not reach a terminal state within the bound
    #[error("task {handle} still running after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout {
        /// Provider task identifier (left running remotely)
        handle: String,
        /// Elapsed time when the poller gave up
        elapsed_ms: u64,
        /// Configured bound
        timeout_ms: u64,
    },

    /// A single stream frame was not decodable
    #[error("malformed frame: {0}")]
    Parse(String),

    /// Credential issuance failed upstream
    #[error("token issuance for `{principal}` failed: {message}")]
    TokenIssuance {
        /// Principal the token was requested for
        principal: String,
        /// Underlying failure
        message: String,
    },

    /// Live stream consumer went away
    #[error("stream cancelled by caller")]
    Cancelled,
}

impl GenerationError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::HttpStatus { .. } | Self::Transport { .. } => ErrorKind::Transport,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Parse(_) => ErrorKind::Parse,
            Self::TokenIssuance { .. } => ErrorKind::TokenIssuance,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Build a provider error for an operation
    pub fn provider(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: truncate_detail(&message.into()),
        }
    }

    /// Build a transport error for an operation
    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: truncate_detail(&message.to_string()),
        }
    }

    /// Build a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap any error raised while issuing a credential
    #[must_use]
    pub fn into_token_issuance(self, principal: &str) -> Self {
        match self {
            already @ Self::TokenIssuance { .. } => already,
            other => Self::TokenIssuance {
                principal: principal.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Whether the error is recoverable at frame level
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Map a reqwest error onto the transport taxonomy
pub(crate) fn map_http_error(operation: &str, error: &reqwest::Error) -> GenerationError {
    if let Some(status) = error.status() {
        return GenerationError::HttpStatus {
            operation: operation.to_string(),
            status: status.as_u16(),
        };
    }
    GenerationError::transport(operation, error)
}

/// Cap provider-supplied text so raw payloads never leak wholesale
fn truncate_detail(detail: &str) -> String {
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        return detail.to_string();
    }
    let mut cut: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            GenerationError::validation("empty").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            GenerationError::HttpStatus {
                operation: "poll".into(),
                status: 502
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            GenerationError::provider("generatePptx", "quota").kind(),
            ErrorKind::Provider
        );
        assert_eq!(GenerationError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_provider_detail_is_truncated() {
        let long = "x".repeat(1000);
        let err = GenerationError::provider("submit", long);
        match err {
            GenerationError::Provider { message, .. } => {
                assert_eq!(message.chars().count(), MAX_DETAIL_CHARS + 1);
                assert!(message.ends_with('…'));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_token_issuance_wrapping_is_idempotent() {
        let err = GenerationError::provider("createApiToken", "bad key").into_token_issuance("u1");
        assert_eq!(err.kind(), ErrorKind::TokenIssuance);
        let again = err.clone().into_token_issuance("u2");
        assert_eq!(err, again);
    }

    #[test]
    fn test_only_parse_is_recoverable() {
        assert!(GenerationError::Parse("x".into()).is_recoverable());
        assert!(!GenerationError::Cancelled.is_recoverable());
    }
}
