//! Relevance classifier abstraction
//!
//! Given a topic and a batch of candidate papers, a classifier returns one
//! relevance score per candidate, in input order. Implementations:
//! - OpenAI-compatible chat completions (`llm`)
//! - Lexical term overlap (`keyword`), for offline runs

mod keyword;
mod llm;

pub use keyword::KeywordClassifier;
pub use llm::LlmRelevanceClassifier;

use crate::types::PaperStub;
use async_trait::async_trait;
use paperforge_common::config::ClassifierConfig;
use paperforge_common::errors::{AppError, Result};
use std::sync::Arc;

/// Trait for relevance scoring
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    /// Score each candidate against `topic`. Output length must match input.
    async fn score_batch(&self, topic: &str, candidates: &[PaperStub]) -> Result<Vec<f64>>;

    /// Model name used in logs and metrics
    fn model_name(&self) -> &str;
}

/// Create a classifier based on configuration
pub fn create_classifier(config: &ClassifierConfig) -> Result<Arc<dyn RelevanceClassifier>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "classifier.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(LlmRelevanceClassifier::new(api_key, config)?))
        }
        "keyword" => Ok(Arc::new(KeywordClassifier::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown classifier provider: {}", other),
        }),
    }
}
