//! Configuration management for PaperForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::errors::{AppError, Result};
use crate::retry::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Diffusion engine tuning
    #[serde(default)]
    pub diffusion: DiffusionConfig,

    /// Bibliographic provider (Semantic Scholar) configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Relevance classifier configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Queue configuration (SQS)
    #[serde(default)]
    pub queue: QueueConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Tuning knobs for a single diffusion run.
///
/// The first six fields are the core contract; the rest refine expansion,
/// scoring and annotation behaviour and all carry defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Validate)]
pub struct DiffusionConfig {
    /// Maximum number of expansion rounds
    #[serde(default = "default_max_stages")]
    #[validate(range(min = 1))]
    pub max_stages: usize,

    /// Corpus size at which diffusion stops and the finalizer truncates
    #[serde(default = "default_max_corpus_size")]
    #[validate(range(min = 1))]
    pub max_corpus_size: usize,

    /// Coverage delta below which a round counts as low-yield
    #[serde(default = "default_saturation_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub saturation_threshold: f64,

    /// Shared-citation evidence needed for structural acceptance
    #[serde(default = "default_co_citation_threshold")]
    #[validate(range(min = 1))]
    pub co_citation_threshold: usize,

    /// Minimum classifier score for semantic acceptance
    #[serde(default = "default_relevance_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub relevance_threshold: f64,

    /// In-flight provider / classifier calls per round
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 256))]
    pub concurrency: usize,

    /// Score assigned to structurally accepted candidates
    #[serde(default = "default_structural_score")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub structural_score: f64,

    /// Weight of bibliographic coupling relative to co-citation
    #[serde(default = "default_coupling_weight")]
    #[validate(range(min = 0.0))]
    pub coupling_weight: f64,

    /// Citations fetched per seed and direction
    #[serde(default = "default_citation_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub citation_limit: usize,

    /// Frontier papers expanded per round
    #[serde(default = "default_max_seeds_per_round")]
    #[validate(range(min = 1))]
    pub max_seeds_per_round: usize,

    /// Candidates per classifier request
    #[serde(default = "default_classifier_batch_size")]
    #[validate(range(min = 1, max = 100))]
    pub classifier_batch_size: usize,

    /// Retries after the first failed classifier call
    #[serde(default = "default_classifier_max_retries")]
    #[validate(range(max = 10))]
    pub classifier_max_retries: u32,

    /// Initial backoff between classifier retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Timeout for each classifier attempt; provider attempts use `provider.timeout_secs`
    #[serde(default = "default_request_timeout_ms")]
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,

    /// Publication-year window considered "recent"
    #[serde(default = "default_recent_window_years")]
    #[validate(range(min = 0, max = 100))]
    pub recent_window_years: i32,

    /// Year used for recency and velocity; current year when unset
    #[serde(default)]
    pub reference_year: Option<i32>,

    /// Size of the seminal / bridging / authority lists
    #[serde(default = "default_summary_top_n")]
    pub summary_top_n: usize,

    /// Graph size above which bridging and cluster annotation is skipped
    #[serde(default = "default_annotation_node_limit")]
    pub annotation_node_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Semantic Scholar Graph API base URL
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// API key (sent as x-api-key)
    pub api_key: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_provider_retries")]
    pub max_retries: u32,

    /// Initial retry backoff in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum retry backoff in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Outbound request budget
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Classifier provider: openai, mock
    #[serde(default = "default_classifier_provider")]
    pub provider: String,

    /// API key for the chat-completions endpoint
    pub api_key: Option<String>,

    /// API base URL (for custom / self-hosted endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    /// Abstract characters included per candidate
    #[serde(default = "default_max_abstract_chars")]
    pub max_abstract_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// SQS queue carrying diffusion jobs
    pub job_queue_url: Option<String>,

    /// SQS queue receiving finalized corpora
    pub result_queue_url: Option<String>,

    /// Dead letter queue URL
    pub dlq_url: Option<String>,

    /// Maximum messages to receive per poll
    #[serde(default = "default_queue_batch_size")]
    pub batch_size: i32,

    /// Long polling timeout in seconds
    #[serde(default = "default_queue_poll_timeout")]
    pub poll_timeout_secs: i32,

    /// Visibility timeout in seconds
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_max_stages() -> usize { 5 }
fn default_max_corpus_size() -> usize { 300 }
fn default_saturation_threshold() -> f64 { 0.1 }
fn default_co_citation_threshold() -> usize { 3 }
fn default_relevance_threshold() -> f64 { 0.6 }
fn default_concurrency() -> usize { 8 }
fn default_structural_score() -> f64 { 0.8 }
fn default_coupling_weight() -> f64 { 1.0 }
fn default_citation_limit() -> usize { 100 }
fn default_max_seeds_per_round() -> usize { 50 }
fn default_classifier_batch_size() -> usize { 10 }
fn default_classifier_max_retries() -> u32 { 2 }
fn default_retry_backoff_ms() -> u64 { 200 }
fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_recent_window_years() -> i32 { 5 }
fn default_summary_top_n() -> usize { 10 }
fn default_annotation_node_limit() -> usize { 5_000 }
fn default_provider_base_url() -> String { "https://api.semanticscholar.org/graph/v1".to_string() }
fn default_provider_timeout() -> u64 { 30 }
fn default_provider_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 8_000 }
fn default_requests_per_second() -> u32 { 1 }
fn default_user_agent() -> String { format!("PaperForge-Diffusion/{}", crate::VERSION) }
fn default_classifier_provider() -> String { "openai".to_string() }
fn default_classifier_model() -> String { "gpt-4o-mini".to_string() }
fn default_classifier_timeout() -> u64 { 60 }
fn default_max_abstract_chars() -> usize { 1_500 }
fn default_queue_batch_size() -> i32 { 1 }
fn default_queue_poll_timeout() -> i32 { 20 }
fn default_visibility_timeout() -> i32 { 900 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "paperforge-diffusion".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__DIFFUSION__MAX_STAGES=4
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }
}

impl DiffusionConfig {
    /// Validate once at run entry. Any failure is fatal to the run.
    pub fn ensure_valid(&self) -> Result<()> {
        self.validate()?;

        let fractions = [
            ("saturation_threshold", self.saturation_threshold),
            ("relevance_threshold", self.relevance_threshold),
            ("structural_score", self.structural_score),
            ("coupling_weight", self.coupling_weight),
        ];
        for (field, value) in fractions {
            if !value.is_finite() {
                return Err(AppError::Configuration {
                    message: format!("{} must be a finite number, got {}", field, value),
                });
            }
        }

        Ok(())
    }

    /// Per-call timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Retry policy for classifier batches
    pub fn classifier_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.classifier_max_retries + 1)
            .with_initial_backoff(Duration::from_millis(self.retry_backoff_ms))
    }
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            max_stages: default_max_stages(),
            max_corpus_size: default_max_corpus_size(),
            saturation_threshold: default_saturation_threshold(),
            co_citation_threshold: default_co_citation_threshold(),
            relevance_threshold: default_relevance_threshold(),
            concurrency: default_concurrency(),
            structural_score: default_structural_score(),
            coupling_weight: default_coupling_weight(),
            citation_limit: default_citation_limit(),
            max_seeds_per_round: default_max_seeds_per_round(),
            classifier_batch_size: default_classifier_batch_size(),
            classifier_max_retries: default_classifier_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            recent_window_years: default_recent_window_years(),
            reference_year: None,
            summary_top_n: default_summary_top_n(),
            annotation_node_limit: default_annotation_node_limit(),
        }
    }
}

impl ProviderConfig {
    /// HTTP timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy injected into the provider adapter
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries + 1)
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            timeout_secs: default_provider_timeout(),
            max_retries: default_provider_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            requests_per_second: default_requests_per_second(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClassifierConfig {
    /// Request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_classifier_provider(),
            api_key: None,
            api_base: None,
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout(),
            max_abstract_chars: default_max_abstract_chars(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            job_queue_url: None,
            result_queue_url: None,
            dlq_url: None,
            batch_size: default_queue_batch_size(),
            poll_timeout_secs: default_queue_poll_timeout(),
            visibility_timeout_secs: default_visibility_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}
