//! LLM relevance classifier over an OpenAI-compatible chat completions API
//!
//! One request per batch. The model is asked for a JSON object
//! `{"scores": [...]}` with one score in [0, 1] per candidate, in order.

use super::RelevanceClassifier;
use crate::types::PaperStub;
use async_trait::async_trait;
use paperforge_common::config::ClassifierConfig;
use paperforge_common::errors::{AppError, Result};
use paperforge_common::metrics::record_classifier_call;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Instant;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You judge whether academic papers belong in a literature review. \
For each numbered paper, give a relevance score between 0 and 1 for the stated topic, where 1 \
means clearly on-topic and 0 means unrelated. Reply with JSON only: {\"scores\": [..]} with \
exactly one number per paper, in the order given.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ScoreEnvelope {
    scores: Vec<f64>,
}

/// OpenAI-compatible relevance classifier
pub struct LlmRelevanceClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_abstract_chars: usize,
}

impl LlmRelevanceClassifier {
    pub fn new(api_key: String, config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_abstract_chars: config.max_abstract_chars,
        })
    }

    async fn make_request(&self, topic: &str, candidates: &[PaperStub]) -> Result<Vec<f64>> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(topic, candidates, self.max_abstract_chars),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited {
                service: "classifier".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                service: "classifier".to_string(),
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let reply: ChatResponse = response.json().await.map_err(|e| AppError::Classifier {
            message: format!("Failed to parse completion: {}", e),
        })?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Classifier {
                message: "Completion had no content".to_string(),
            })?;

        parse_scores(&content, candidates.len())
    }
}

#[async_trait]
impl RelevanceClassifier for LlmRelevanceClassifier {
    async fn score_batch(&self, topic: &str, candidates: &[PaperStub]) -> Result<Vec<f64>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let result = self.make_request(topic, candidates).await;
        record_classifier_call(
            start.elapsed().as_secs_f64(),
            &self.model,
            candidates.len(),
            result.is_ok(),
        );
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

/// Numbered listing of the candidates under the topic line
pub(crate) fn build_prompt(topic: &str, candidates: &[PaperStub], max_abstract_chars: usize) -> String {
    let mut prompt = format!("Topic: {}\n\nPapers:\n", topic);
    for (i, paper) in candidates.iter().enumerate() {
        let _ = write!(prompt, "{}. {}", i + 1, paper.title.trim());
        if let Some(year) = paper.year {
            let _ = write!(prompt, " ({})", year);
        }
        prompt.push('\n');
        if let Some(abstract_text) = paper.abstract_text.as_deref().filter(|a| !a.trim().is_empty()) {
            let _ = writeln!(
                prompt,
                "   Abstract: {}",
                truncate_chars(abstract_text.trim(), max_abstract_chars)
            );
        }
    }
    let _ = write!(prompt, "\nReturn {} scores.", candidates.len());
    prompt
}

/// Parse the model reply into exactly `expected` scores clamped to [0, 1]
pub(crate) fn parse_scores(content: &str, expected: usize) -> Result<Vec<f64>> {
    let body = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let envelope: ScoreEnvelope = serde_json::from_str(body).map_err(|e| AppError::Classifier {
        message: format!("Reply is not a score object: {}", e),
    })?;

    if envelope.scores.len() != expected {
        return Err(AppError::Classifier {
            message: format!(
                "Expected {} scores, got {}",
                expected,
                envelope.scores.len()
            ),
        });
    }

    Ok(envelope.scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect())
}
