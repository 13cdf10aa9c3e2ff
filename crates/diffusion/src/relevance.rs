//! Two-pass relevance evaluation
//!
//! 1. Structural: a candidate strongly tied to the current corpus by
//!    co-citation and bibliographic coupling is accepted without asking the
//!    classifier.
//! 2. Semantic: remaining candidates are scored by the classifier in batches.
//!    A failed batch is retried per candidate; anything still unscored is
//!    rejected and counted as a classifier failure.

use crate::classifier::RelevanceClassifier;
use crate::corpus::Corpus;
use crate::graph::CitationGraph;
use crate::types::{PaperId, PaperRecord, PaperStub};
use futures::stream::{self, StreamExt};
use paperforge_common::config::DiffusionConfig;
use paperforge_common::errors::{AppError, Result};
use paperforge_common::metrics::record_classifier_rejections;
use paperforge_common::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Which pass decided a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictMethod {
    Structural,
    Semantic,
    ScoringFailed,
}

/// Accept/reject decision for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceVerdict {
    pub id: PaperId,
    pub accepted: bool,
    pub score: f64,
    pub method: VerdictMethod,
}

impl RelevanceVerdict {
    fn failed(id: PaperId) -> Self {
        Self {
            id,
            accepted: false,
            score: 0.0,
            method: VerdictMethod::ScoringFailed,
        }
    }
}

/// Strongest structural tie between a candidate and the corpus
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralEvidence {
    pub partner: PaperId,
    pub co_citations: usize,
    pub couplings: usize,
    pub strength: f64,
}

#[derive(Debug, Clone)]
pub struct RelevanceSettings {
    pub co_citation_threshold: f64,
    pub coupling_weight: f64,
    pub structural_score: f64,
    pub relevance_threshold: f64,
    pub batch_size: usize,
    pub concurrency: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&DiffusionConfig> for RelevanceSettings {
    fn from(config: &DiffusionConfig) -> Self {
        Self {
            co_citation_threshold: config.co_citation_threshold as f64,
            coupling_weight: config.coupling_weight,
            structural_score: config.structural_score,
            relevance_threshold: config.relevance_threshold,
            batch_size: config.classifier_batch_size.max(1),
            concurrency: config.concurrency.max(1),
            timeout: config.request_timeout(),
            retry: config.classifier_retry_policy(),
        }
    }
}

pub struct RelevanceEngine {
    classifier: Arc<dyn RelevanceClassifier>,
    settings: RelevanceSettings,
}

impl RelevanceEngine {
    pub fn new(classifier: Arc<dyn RelevanceClassifier>, settings: RelevanceSettings) -> Self {
        Self { classifier, settings }
    }

    /// Strongest tie from `candidate` to any corpus paper, if it meets the threshold.
    ///
    /// strength = co-citations + coupling_weight * shared references.
    /// Ties on strength go to the lowest partner id.
    pub fn structural_evidence(
        &self,
        candidate: &str,
        corpus: &Corpus,
        graph: &CitationGraph,
    ) -> Option<StructuralEvidence> {
        let counts = graph.shared_citation_counts(candidate, |id| corpus.contains(id));

        counts
            .into_iter()
            .map(|(partner, (co_citations, couplings))| StructuralEvidence {
                strength: co_citations as f64 + self.settings.coupling_weight * couplings as f64,
                partner,
                co_citations,
                couplings,
            })
            .filter(|e| e.strength >= self.settings.co_citation_threshold)
            .max_by(|a, b| {
                a.strength
                    .partial_cmp(&b.strength)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.partner.cmp(&a.partner))
            })
    }

    /// Evaluate candidates against the corpus. Verdicts are in input order.
    ///
    /// `graph` must already contain this round's edges. Never fails: scoring
    /// errors turn into rejections.
    pub async fn evaluate(
        &self,
        topic: &str,
        candidates: &[PaperRecord],
        corpus: &Corpus,
        graph: &CitationGraph,
        cancel: &CancellationToken,
    ) -> Vec<RelevanceVerdict> {
        let mut verdicts: Vec<Option<RelevanceVerdict>> = vec![None; candidates.len()];
        let mut unresolved: Vec<usize> = Vec::new();

        for (i, candidate) in candidates.iter().enumerate() {
            match self.structural_evidence(&candidate.id, corpus, graph) {
                Some(evidence) => {
                    debug!(
                        paper_id = %candidate.id,
                        partner = %evidence.partner,
                        co_citations = evidence.co_citations,
                        couplings = evidence.couplings,
                        "Structural accept"
                    );
                    verdicts[i] = Some(RelevanceVerdict {
                        id: candidate.id.clone(),
                        accepted: true,
                        score: self.settings.structural_score,
                        method: VerdictMethod::Structural,
                    });
                }
                None => unresolved.push(i),
            }
        }

        let batches: Vec<Vec<usize>> = unresolved
            .chunks(self.settings.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        let scored: Vec<(Vec<usize>, Vec<Option<f64>>)> = stream::iter(batches)
            .map(|indices| async move {
                if cancel.is_cancelled() {
                    let unscored = vec![None; indices.len()];
                    return (indices, unscored);
                }
                let stubs: Vec<PaperStub> = indices.iter().map(|&i| candidates[i].to_stub()).collect();
                let scores = self.score_with_fallback(topic, &stubs).await;
                (indices, scores)
            })
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let mut failures = 0;
        for (indices, scores) in scored {
            for (i, score) in indices.into_iter().zip(scores) {
                let id = candidates[i].id.clone();
                verdicts[i] = Some(match score {
                    Some(score) => RelevanceVerdict {
                        accepted: score >= self.settings.relevance_threshold,
                        id,
                        score,
                        method: VerdictMethod::Semantic,
                    },
                    None => {
                        failures += 1;
                        RelevanceVerdict::failed(id)
                    }
                });
            }
        }

        if failures > 0 {
            warn!(rejected = failures, "Candidates rejected because scoring failed");
            record_classifier_rejections(failures);
        }

        verdicts
            .into_iter()
            .zip(candidates)
            .map(|(verdict, candidate)| {
                verdict.unwrap_or_else(|| RelevanceVerdict::failed(candidate.id.clone()))
            })
            .collect()
    }

    /// Score a batch; on failure fall back to scoring each candidate alone
    async fn score_with_fallback(&self, topic: &str, stubs: &[PaperStub]) -> Vec<Option<f64>> {
        match self.score_batch(topic, stubs).await {
            Ok(scores) => scores.into_iter().map(Some).collect(),
            Err(e) if stubs.len() > 1 => {
                warn!(batch_size = stubs.len(), error = %e, "Classifier batch failed, scoring individually");
                let mut scores = Vec::with_capacity(stubs.len());
                for single in stubs.chunks(1) {
                    match self.score_batch(topic, single).await {
                        Ok(mut s) => scores.push(s.pop()),
                        Err(e) => {
                            warn!(paper_id = %single[0].id, error = %e, "Classifier failed for candidate");
                            scores.push(None);
                        }
                    }
                }
                scores
            }
            Err(e) => {
                warn!(paper_id = %stubs[0].id, error = %e, "Classifier failed for candidate");
                vec![None]
            }
        }
    }

    /// One batch with per-attempt timeout and bounded retries
    async fn score_batch(&self, topic: &str, stubs: &[PaperStub]) -> Result<Vec<f64>> {
        let timeout = self.settings.timeout;
        let classifier = &self.classifier;

        let scores = self
            .settings
            .retry
            .run("classifier.score_batch", || async move {
                tokio::time::timeout(timeout, classifier.score_batch(topic, stubs))
                    .await
                    .map_err(|_| AppError::UpstreamTimeout {
                        service: classifier.model_name().to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })?
            })
            .await?;

        validate_scores(scores, stubs.len())
    }
}

fn validate_scores(scores: Vec<f64>, expected: usize) -> Result<Vec<f64>> {
    if scores.len() != expected {
        return Err(AppError::Classifier {
            message: format!("Expected {} scores, got {}", expected, scores.len()),
        });
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(AppError::Classifier {
            message: format!("Non-finite score {}", bad),
        });
    }
    Ok(scores.into_iter().map(|s| s.clamp(0.0, 1.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stub, MockClassifier};
    use crate::types::DiscoveryMethod;

    fn settings() -> RelevanceSettings {
        RelevanceSettings {
            co_citation_threshold: 3.0,
            coupling_weight: 1.0,
            structural_score: 0.8,
            relevance_threshold: 0.6,
            batch_size: 2,
            concurrency: 2,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::no_retry(),
        }
    }

    fn candidate(id: &str) -> PaperRecord {
        PaperRecord::candidate(stub(id), 1, DiscoveryMethod::ForwardCitation)
    }

    fn corpus_of(ids: &[&str]) -> Corpus {
        let mut corpus = Corpus::new();
        for id in ids {
            corpus.merge(PaperRecord::seed(stub(id)));
        }
        corpus
    }

    #[tokio::test]
    async fn test_structural_accept_skips_classifier() {
        // c1..c3 each cite both corpus paper "p" and candidate "x"
        let mut graph = CitationGraph::new();
        for citer in ["c1", "c2", "c3"] {
            graph.add_citation(citer, "p");
            graph.add_citation(citer, "x");
        }

        let classifier = Arc::new(MockClassifier::new(0.0));
        let engine = RelevanceEngine::new(classifier.clone(), settings());
        let verdicts = engine
            .evaluate("topic", &[candidate("x")], &corpus_of(&["p"]), &graph, &CancellationToken::new())
            .await;

        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].accepted);
        assert_eq!(verdicts[0].score, 0.8);
        assert_eq!(verdicts[0].method, VerdictMethod::Structural);
        assert_eq!(classifier.batch_count(), 0);
    }

    #[test]
    fn test_coupling_counts_toward_strength() {
        // two co-citations plus one shared reference reach threshold 3
        let mut graph = CitationGraph::new();
        for citer in ["c1", "c2"] {
            graph.add_citation(citer, "p");
            graph.add_citation(citer, "x");
        }
        graph.add_citation("p", "r");
        graph.add_citation("x", "r");

        let engine = RelevanceEngine::new(Arc::new(MockClassifier::new(0.0)), settings());
        let evidence = engine
            .structural_evidence("x", &corpus_of(&["p"]), &graph)
            .unwrap();
        assert_eq!(evidence.partner, "p");
        assert_eq!(evidence.co_citations, 2);
        assert_eq!(evidence.couplings, 1);
        assert_eq!(evidence.strength, 3.0);

        let mut weak = settings();
        weak.coupling_weight = 0.5;
        let engine = RelevanceEngine::new(Arc::new(MockClassifier::new(0.0)), weak);
        assert!(engine.structural_evidence("x", &corpus_of(&["p"]), &graph).is_none());
    }

    #[tokio::test]
    async fn test_semantic_threshold_and_order() {
        let classifier = Arc::new(
            MockClassifier::new(0.0)
                .score("a", 0.9)
                .score("b", 0.6)
                .score("c", 0.59),
        );
        let engine = RelevanceEngine::new(classifier.clone(), settings());
        let candidates = vec![candidate("a"), candidate("b"), candidate("c")];

        let verdicts = engine
            .evaluate("topic", &candidates, &Corpus::new(), &CitationGraph::new(), &CancellationToken::new())
            .await;

        let ids: Vec<&str> = verdicts.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            verdicts.iter().map(|v| v.accepted).collect::<Vec<_>>(),
            vec![true, true, false]
        );
        assert!(verdicts.iter().all(|v| v.method == VerdictMethod::Semantic));
        // batch size 2 over three candidates
        assert_eq!(classifier.batch_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_falls_back_to_singles() {
        let classifier = Arc::new(MockClassifier::new(0.9).poison("bad"));
        let engine = RelevanceEngine::new(classifier.clone(), settings());
        let candidates = vec![candidate("good"), candidate("bad")];

        let verdicts = engine
            .evaluate("topic", &candidates, &Corpus::new(), &CitationGraph::new(), &CancellationToken::new())
            .await;

        assert!(verdicts[0].accepted);
        assert_eq!(verdicts[0].method, VerdictMethod::Semantic);
        assert!(!verdicts[1].accepted);
        assert_eq!(verdicts[1].method, VerdictMethod::ScoringFailed);
        // one failed pair, then two singles
        assert_eq!(classifier.batch_count(), 3);
    }

    #[tokio::test]
    async fn test_total_classifier_failure_rejects_all() {
        let classifier = Arc::new(MockClassifier::failing());
        let engine = RelevanceEngine::new(classifier, settings());
        let candidates = vec![candidate("a"), candidate("b"), candidate("c")];

        let verdicts = engine
            .evaluate("topic", &candidates, &Corpus::new(), &CitationGraph::new(), &CancellationToken::new())
            .await;

        assert_eq!(verdicts.len(), 3);
        assert!(verdicts.iter().all(|v| !v.accepted && v.method == VerdictMethod::ScoringFailed));
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let classifier = Arc::new(MockClassifier::new(1.0));
        let engine = RelevanceEngine::new(classifier.clone(), settings());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let verdicts = engine
            .evaluate("topic", &[candidate("a")], &Corpus::new(), &CitationGraph::new(), &cancel)
            .await;

        assert!(!verdicts[0].accepted);
        assert_eq!(classifier.batch_count(), 0);
    }

    #[test]
    fn test_validate_scores() {
        assert_eq!(validate_scores(vec![1.5, -1.0], 2).unwrap(), vec![1.0, 0.0]);
        assert!(validate_scores(vec![f64::NAN], 1).is_err());
        assert!(validate_scores(vec![0.5], 2).is_err());
    }
}
