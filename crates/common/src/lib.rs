//! PaperForge Common Library
//!
//! Shared code for PaperForge services including:
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability
//! - Bounded retry policy
//! - SQS queue hand-off

pub mod config;
pub mod errors;
pub mod metrics;
pub mod queue;
pub mod retry;

// Re-export commonly used types
pub use config::{AppConfig, DiffusionConfig};
pub use errors::{AppError, Result};
pub use retry::RetryPolicy;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
