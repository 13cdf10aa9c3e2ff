//! PaperForge Diffusion Engine
//!
//! Grows a literature-review corpus outward from a handful of seed papers by
//! following citations in both directions, keeping candidates that are
//! structurally close to the corpus or judged relevant by a classifier, and
//! stopping once new rounds stop adding much.
//!
//! A run is a sequence of rounds: seeds, then expansion, then relevance
//! filtering, then merging, then a saturation check. When the run ends the
//! corpus is finalized: ranked, capped and annotated from the citation graph.

pub mod classifier;
pub mod controller;
pub mod corpus;
pub mod expander;
pub mod finalizer;
pub mod graph;
pub mod provider;
pub mod relevance;
pub mod round;
pub mod seeds;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testing;

pub use classifier::{create_classifier, RelevanceClassifier};
pub use controller::{DiffusionController, DiffusionOutcome, DiffusionPhase, TerminationReason};
pub use graph::{CitationGraph, GraphSummary};
pub use provider::{create_provider, BibliographicProvider};
pub use round::DiffusionRound;
pub use types::{DiscoveryMethod, PaperId, PaperRecord, PaperStub};

use paperforge_common::config::DiffusionConfig;
use paperforge_common::errors::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run one diffusion from `seeds` to termination with the given collaborators
pub async fn run_diffusion(
    topic: &str,
    seeds: Vec<PaperStub>,
    config: DiffusionConfig,
    provider: Arc<dyn BibliographicProvider>,
    classifier: Arc<dyn RelevanceClassifier>,
    cancel: &CancellationToken,
) -> Result<DiffusionOutcome> {
    DiffusionController::new(config, provider, classifier)?
        .run(topic, seeds, cancel)
        .await
}
