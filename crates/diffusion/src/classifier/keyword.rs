//! Lexical relevance scorer: share of topic terms found in title and abstract

use super::RelevanceClassifier;
use crate::types::PaperStub;
use async_trait::async_trait;
use paperforge_common::errors::Result;
use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "by", "for", "from", "in", "into", "is", "of", "on",
    "or", "the", "to", "with",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Deterministic classifier that needs no network access
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn score(topic_terms: &HashSet<String>, paper: &PaperStub) -> f64 {
        if topic_terms.is_empty() {
            return 0.0;
        }
        let mut text = paper.title.clone();
        if let Some(abstract_text) = &paper.abstract_text {
            text.push(' ');
            text.push_str(abstract_text);
        }
        let paper_terms = terms(&text);
        let hits = topic_terms.iter().filter(|t| paper_terms.contains(*t)).count();
        hits as f64 / topic_terms.len() as f64
    }
}

#[async_trait]
impl RelevanceClassifier for KeywordClassifier {
    async fn score_batch(&self, topic: &str, candidates: &[PaperStub]) -> Result<Vec<f64>> {
        let topic_terms = terms(topic);
        Ok(candidates
            .iter()
            .map(|paper| Self::score(&topic_terms, paper))
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-overlap"
    }
}
