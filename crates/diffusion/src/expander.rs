//! Stage expansion
//!
//! Fetches forward and backward citations for each seed with bounded
//! concurrency, validates the returned stubs, records every observed edge,
//! and emits only papers that are neither in the corpus nor seen before.
//!
//! Seeds are fetched concurrently, at most `concurrency` provider requests at
//! a time, but results are folded in seed order, so the same inputs always
//! produce the same candidate list. Per-attempt timeouts and retries belong
//! to the provider adapter.

use crate::corpus::{Corpus, SeenSet};
use crate::graph::CitationEdge;
use crate::provider::BibliographicProvider;
use crate::types::{canonical_id, DiscoveryMethod, PaperId, PaperRecord, PaperStub};
use futures::stream::{self, StreamExt};
use paperforge_common::config::DiffusionConfig;
use paperforge_common::errors::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExpansionSettings {
    pub citation_limit: usize,
    pub concurrency: usize,
}

impl From<&DiffusionConfig> for ExpansionSettings {
    fn from(config: &DiffusionConfig) -> Self {
        Self {
            citation_limit: config.citation_limit,
            concurrency: config.concurrency.max(1),
        }
    }
}

/// Output of one expansion stage
#[derive(Debug, Default)]
pub struct Expansion {
    /// New papers, in discovery order
    pub candidates: Vec<PaperRecord>,
    /// Every valid citation edge observed, including edges to known papers
    pub edges: Vec<CitationEdge>,
    /// Metadata for every valid paper observed
    pub papers: Vec<PaperStub>,
    /// Seen set with this stage's candidates added
    pub seen: SeenSet,
    pub failed_seeds: Vec<PaperId>,
    /// Seeds not fetched because the run was cancelled
    pub skipped_seeds: Vec<PaperId>,
    /// Stubs dropped for a malformed id or missing metadata
    pub dropped: usize,
}

enum SeedFetch {
    Fetched {
        seed: PaperId,
        forward: Vec<PaperStub>,
        backward: Vec<PaperStub>,
    },
    Failed {
        seed: PaperId,
        error: AppError,
    },
    Skipped {
        seed: PaperId,
    },
}

/// A validated stub together with the seed and direction it came from
struct Observed {
    stub: PaperStub,
    seed: PaperId,
    method: DiscoveryMethod,
}

pub struct StageExpander {
    provider: Arc<dyn BibliographicProvider>,
    settings: ExpansionSettings,
}

impl StageExpander {
    pub fn new(provider: Arc<dyn BibliographicProvider>, settings: ExpansionSettings) -> Self {
        Self { provider, settings }
    }

    /// Expand `seeds` into candidates for `stage`.
    ///
    /// Takes ownership of the seen set and hands it back inside the result.
    pub async fn expand(
        &self,
        stage: usize,
        seeds: &[PaperId],
        corpus: &Corpus,
        mut seen: SeenSet,
        cancel: &CancellationToken,
    ) -> Expansion {
        let fetches: Vec<SeedFetch> = stream::iter(seeds.iter().cloned())
            .map(|seed| self.fetch_seed(seed, cancel))
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        let mut expansion = Expansion::default();
        let mut observed = Vec::new();

        for fetch in fetches {
            match fetch {
                SeedFetch::Fetched { seed, forward, backward } => {
                    let directed = forward
                        .into_iter()
                        .map(|s| (s, DiscoveryMethod::ForwardCitation))
                        .chain(backward.into_iter().map(|s| (s, DiscoveryMethod::BackwardCitation)));

                    for (raw, method) in directed {
                        let Some(id) = canonical_id(&raw.id) else {
                            debug!(seed = %seed, raw_id = %raw.id, "Dropping stub with malformed id");
                            expansion.dropped += 1;
                            continue;
                        };
                        if id == seed {
                            continue;
                        }
                        observed.push(Observed {
                            stub: PaperStub { id, ..raw },
                            seed: seed.clone(),
                            method,
                        });
                    }
                }
                SeedFetch::Failed { seed, error } => {
                    warn!(seed = %seed, error = %error, "Seed expansion failed, skipping");
                    expansion.failed_seeds.push(seed);
                }
                SeedFetch::Skipped { seed } => {
                    expansion.skipped_seeds.push(seed);
                }
            }
        }

        let lookups = self.hydrate(&observed, corpus, &seen).await;

        for Observed { mut stub, seed, method } in observed {
            match method {
                DiscoveryMethod::ForwardCitation => {
                    expansion.edges.push(CitationEdge::new(stub.id.clone(), seed))
                }
                _ => expansion.edges.push(CitationEdge::new(seed, stub.id.clone())),
            }

            if let Some(found) = lookups.get(&stub.id) {
                stub.absorb(found);
            }
            if stub.has_metadata() {
                expansion.papers.push(stub.clone());
            }

            if corpus.contains(&stub.id) || seen.contains(&stub.id) {
                continue;
            }
            if !stub.has_metadata() {
                debug!(paper_id = %stub.id, "Dropping candidate without metadata");
                expansion.dropped += 1;
                continue;
            }

            seen.insert(&stub.id);
            expansion
                .candidates
                .push(PaperRecord::candidate(stub, stage, method));
        }

        info!(
            stage,
            seeds = seeds.len(),
            candidates = expansion.candidates.len(),
            edges = expansion.edges.len(),
            failed_seeds = expansion.failed_seeds.len(),
            dropped = expansion.dropped,
            "Stage expansion complete"
        );

        expansion.seen = seen;
        expansion
    }

    async fn fetch_seed(&self, seed: PaperId, cancel: &CancellationToken) -> SeedFetch {
        if cancel.is_cancelled() {
            return SeedFetch::Skipped { seed };
        }

        // One request at a time per seed: `concurrency` bounds requests in flight
        let limit = self.settings.citation_limit;
        let forward = match self.provider.forward_citations(&seed, limit).await {
            Ok(stubs) => stubs,
            Err(error) => return SeedFetch::Failed { seed, error },
        };
        match self.provider.backward_citations(&seed, limit).await {
            Ok(backward) => SeedFetch::Fetched { seed, forward, backward },
            Err(error) => SeedFetch::Failed { seed, error },
        }
    }

    /// Look up metadata for new papers the provider returned without it.
    /// A failed lookup leaves them unhydrated.
    async fn hydrate(
        &self,
        observed: &[Observed],
        corpus: &Corpus,
        seen: &SeenSet,
    ) -> HashMap<PaperId, PaperStub> {
        let mut missing: Vec<PaperId> = observed
            .iter()
            .filter(|o| !o.stub.has_metadata())
            .filter(|o| !corpus.contains(&o.stub.id) && !seen.contains(&o.stub.id))
            .map(|o| o.stub.id.clone())
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            return HashMap::new();
        }

        match self.provider.batch_lookup(&missing).await {
            Ok(found) => {
                debug!(requested = missing.len(), found = found.len(), "Hydrated sparse stubs");
                found.into_iter().map(|s| (s.id.clone(), s)).collect()
            }
            Err(e) => {
                warn!(requested = missing.len(), error = %e, "Metadata lookup failed");
                HashMap::new()
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SemanticScholarProvider;
    use crate::testing::{stub, MockProvider, ScriptedResponse, ScriptedServer};
    use paperforge_common::config::ProviderConfig;

    fn settings() -> ExpansionSettings {
        ExpansionSettings {
            citation_limit: 100,
            concurrency: 4,
        }
    }

    fn ids(records: &[PaperRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn corpus_of(ids: &[&str]) -> Corpus {
        let mut corpus = Corpus::new();
        for id in ids {
            corpus.merge(PaperRecord::seed(stub(id)));
        }
        corpus
    }

    #[tokio::test]
    async fn test_expansion_directions_and_edges() {
        let provider = MockProvider::new()
            .cited_by("10.1000/seed", vec![stub("10.1000/citer")])
            .references("10.1000/seed", vec![stub("10.1000/ref")]);
        let expander = StageExpander::new(Arc::new(provider), settings());

        let expansion = expander
            .expand(
                1,
                &["10.1000/seed".to_string()],
                &corpus_of(&["10.1000/seed"]),
                SeenSet::new(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(ids(&expansion.candidates), vec!["10.1000/citer", "10.1000/ref"]);
        assert_eq!(expansion.candidates[0].discovery_method, DiscoveryMethod::ForwardCitation);
        assert_eq!(expansion.candidates[1].discovery_method, DiscoveryMethod::BackwardCitation);
        assert!(expansion.candidates.iter().all(|c| c.discovery_stage == 1));
        assert!(expansion.edges.contains(&CitationEdge::new("10.1000/citer", "10.1000/seed")));
        assert!(expansion.edges.contains(&CitationEdge::new("10.1000/seed", "10.1000/ref")));
    }

    #[tokio::test]
    async fn test_dedup_against_corpus_seen_and_siblings() {
        let shared = stub("10.1000/shared");
        let provider = MockProvider::new()
            .cited_by("10.1000/s1", vec![shared.clone(), stub("10.1000/known")])
            .cited_by("10.1000/s2", vec![shared.clone(), stub("10.1000/old")]);
        let expander = StageExpander::new(Arc::new(provider), settings());

        let mut seen = SeenSet::new();
        seen.insert("10.1000/old");

        let expansion = expander
            .expand(
                2,
                &["10.1000/s1".to_string(), "10.1000/s2".to_string()],
                &corpus_of(&["10.1000/s1", "10.1000/s2", "10.1000/known"]),
                seen,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(ids(&expansion.candidates), vec!["10.1000/shared"]);
        // Edges are kept for deduplicated papers too
        assert!(expansion.edges.contains(&CitationEdge::new("10.1000/shared", "10.1000/s2")));
        assert!(expansion.edges.contains(&CitationEdge::new("10.1000/known", "10.1000/s1")));
        assert!(expansion.seen.contains("10.1000/shared"));
    }

    #[tokio::test]
    async fn test_failed_seed_contributes_nothing() {
        let provider = MockProvider::new()
            .cited_by("10.1000/good", vec![stub("10.1000/a")])
            .cited_by("10.1000/bad", vec![stub("10.1000/b")])
            .failing("10.1000/bad");
        let expander = StageExpander::new(Arc::new(provider), settings());

        let expansion = expander
            .expand(
                1,
                &["10.1000/good".to_string(), "10.1000/bad".to_string()],
                &Corpus::new(),
                SeenSet::new(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(ids(&expansion.candidates), vec!["10.1000/a"]);
        assert_eq!(expansion.failed_seeds, vec!["10.1000/bad".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_and_sparse_stubs() {
        let provider = MockProvider::new()
            .cited_by(
                "10.1000/seed",
                vec![
                    PaperStub::new("", "No id"),
                    PaperStub::new("not a doi", "Bad id"),
                    PaperStub::new("10.1000/sparse", ""),
                    PaperStub::new("10.1000/ghost", ""),
                    PaperStub::new("DOI:10.1000/UPPER", "Upper"),
                ],
            )
            .with_metadata(PaperStub::new("10.1000/sparse", "Now hydrated").with_year(2020));
        let provider = Arc::new(provider);
        let expander = StageExpander::new(provider.clone(), settings());

        let expansion = expander
            .expand(
                1,
                &["10.1000/seed".to_string()],
                &Corpus::new(),
                SeenSet::new(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(ids(&expansion.candidates), vec!["10.1000/sparse", "10.1000/upper"]);
        assert_eq!(expansion.candidates[0].title, "Now hydrated");
        assert_eq!(expansion.candidates[0].year, Some(2020));
        assert_eq!(expansion.dropped, 3);
        assert_eq!(provider.lookup_count(), 1);
        // The unhydrated paper still contributes its edge
        assert!(expansion.edges.contains(&CitationEdge::new("10.1000/ghost", "10.1000/seed")));
        assert!(!expansion.seen.contains("10.1000/ghost"));
    }

    #[tokio::test]
    async fn test_hung_request_is_retried_by_adapter() {
        let citations = r#"{"data": [{"citingPaper": {"paperId": "c1", "externalIds": {"DOI": "10.1000/Citer"}, "title": "Citer"}}]}"#;
        let server = ScriptedServer::start(vec![
            ScriptedResponse::Hang,
            ScriptedResponse::Json(200, citations),
            ScriptedResponse::Json(200, r#"{"data": []}"#),
        ])
        .await;
        let provider = SemanticScholarProvider::new(&ProviderConfig {
            base_url: server.url(),
            timeout_secs: 1,
            max_retries: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            requests_per_second: 100,
            ..Default::default()
        })
        .unwrap();
        let expander = StageExpander::new(Arc::new(provider), settings());

        let expansion = expander
            .expand(
                1,
                &["10.1000/seed".to_string()],
                &Corpus::new(),
                SeenSet::new(),
                &CancellationToken::new(),
            )
            .await;

        assert!(expansion.failed_seeds.is_empty());
        assert_eq!(ids(&expansion.candidates), vec!["10.1000/citer"]);
        // hung forward attempt, its retry, then the reference list
        assert_eq!(server.hits(), 3);
    }

    #[tokio::test]
    async fn test_failed_forward_fetch_skips_references() {
        let provider = Arc::new(
            MockProvider::new()
                .references("10.1000/seed", vec![stub("10.1000/ref")])
                .failing("10.1000/seed"),
        );
        let expander = StageExpander::new(provider.clone(), settings());

        let expansion = expander
            .expand(
                1,
                &["10.1000/seed".to_string()],
                &Corpus::new(),
                SeenSet::new(),
                &CancellationToken::new(),
            )
            .await;

        assert!(expansion.candidates.is_empty());
        assert_eq!(expansion.failed_seeds, vec!["10.1000/seed".to_string()]);
        assert_eq!(provider.calls_for("10.1000/seed"), 1);
    }

    #[tokio::test]
    async fn test_cancelled_seeds_are_skipped() {
        let provider = Arc::new(MockProvider::new().cited_by("10.1000/seed", vec![stub("10.1000/a")]));
        let expander = StageExpander::new(provider.clone(), settings());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let expansion = expander
            .expand(1, &["10.1000/seed".to_string()], &Corpus::new(), SeenSet::new(), &cancel)
            .await;

        assert!(expansion.candidates.is_empty());
        assert_eq!(expansion.skipped_seeds.len(), 1);
        assert_eq!(provider.calls_for("10.1000/seed"), 0);
    }
}
