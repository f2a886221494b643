//! Error types for oaift.
//!
//! Taxonomy:
//! - Expected failures: bad config, name collisions, missing datasets
//! - Infrastructure failures: network, timeout, remote API, subprocess
//! - Gate failures: the validator reported a dataset unfit for training

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for oaift.
#[derive(Debug, Error)]
pub enum OaiftError {
    // ═══════════════════════════════════════════════════════════════════
    // Expected failures, surfaced before any remote work
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("{kind} '{name}' already exists at {path}; pass --force to overwrite")]
    NamespaceExists {
        kind: &'static str,
        name: String,
        path: PathBuf,
    },

    #[error("Dataset '{name}' has no training set at {path}")]
    DatasetNotFound { name: String, path: PathBuf },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // Remote calls
    // ═══════════════════════════════════════════════════════════════════

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // External validator
    // ═══════════════════════════════════════════════════════════════════

    #[error("Failed to spawn validator '{program}': {source}")]
    ValidatorSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Validator exited with {status}: {stderr}")]
    ValidatorFailed { status: String, stderr: String },

    #[error("Validator did not finish within {0:?}")]
    ValidatorTimeout(Duration),

    #[error(
        "Dataset failed validation ({}); inspect the preview report at {}",
        reasons.join(", "),
        report.display()
    )]
    ValidationGate {
        report: PathBuf,
        reasons: Vec<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Remote API specific errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited by API: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<f64>,
    },

    #[error("API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl OaiftError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if a remote call failing with this error should be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Api(ApiError::RateLimited { .. }) => true,
            Self::Api(ApiError::Status { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided delay hint in seconds, if any.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::Api(ApiError::RateLimited {
                retry_after_secs, ..
            }) => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for oaift.
pub type Result<T> = std::result::Result<T, OaiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(OaiftError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            OaiftError::Api(ApiError::Status {
                status: 503,
                message: "busy".to_string()
            })
            .is_retryable()
        );
        assert!(
            !OaiftError::Api(ApiError::Status {
                status: 400,
                message: "bad".to_string()
            })
            .is_retryable()
        );
        assert!(!OaiftError::Api(ApiError::AuthenticationFailed).is_retryable());
        assert!(!OaiftError::Api(ApiError::NotFound("x".to_string())).is_retryable());
    }

    #[test]
    fn test_retry_after_only_from_rate_limits() {
        let limited = OaiftError::Api(ApiError::RateLimited {
            message: String::new(),
            retry_after_secs: Some(2.5),
        });
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after(), Some(2.5));
        assert_eq!(OaiftError::Timeout(Duration::from_secs(1)).retry_after(), None);
    }

    #[test]
    fn test_gate_message_points_at_report() {
        let err = OaiftError::ValidationGate {
            report: PathBuf::from("projects/p/fine-tunes/ft/ft_preview.json"),
            reasons: vec!["n_missing_system=1".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("n_missing_system=1"));
        assert!(msg.contains("ft_preview.json"));
    }
}
