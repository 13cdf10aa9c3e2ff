//! Error types for PaperForge services
//!
//! Provides a single error enum shared by the diffusion engine and its adapters:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Transient/permanent classification used by retry policies

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidFormat,

    // Resource errors (4xxx)
    PaperNotFound,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    UpstreamError,
    UpstreamTimeout,
    ClassifierError,
    QueueError,

    // Internal errors (9xxx)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::InvalidFormat => 1003,

            // Resources (4xxx)
            ErrorCode::PaperNotFound => 4002,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::UpstreamTimeout => 8002,
            ErrorCode::ClassifierError => 8003,
            ErrorCode::QueueError => 8005,

            // Internal (9xxx)
            ErrorCode::ConfigurationError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Paper not found: {id}")]
    PaperNotFound { id: String },

    // Rate limiting
    #[error("Rate limited by {service}")]
    RateLimited { service: String },

    // External service errors
    #[error("Upstream error from {service} (status {status:?}): {message}")]
    Upstream {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{service} call timed out after {timeout_ms}ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },

    #[error("Relevance classifier error: {message}")]
    Classifier { message: String },

    #[error("Queue error: {message}")]
    QueueError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PaperNotFound { .. } => ErrorCode::PaperNotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::UpstreamTimeout { .. } => ErrorCode::UpstreamTimeout,
            AppError::Classifier { .. } => ErrorCode::ClassifierError,
            AppError::QueueError { .. } => ErrorCode::QueueError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Timeouts, rate limits, 5xx responses and connection failures are transient.
    /// Everything else (bad input, 4xx, unparsable payloads) fails the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::RateLimited { .. } | AppError::UpstreamTimeout { .. } => true,
            AppError::Upstream { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 429,
                None => true,
            },
            AppError::HttpClient(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.is_request()
                    || err.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            AppError::Classifier { .. } => true,
            _ => false,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
