//! Diffusion controller
//!
//! Drives a run through its phases:
//!
//! ```text
//! Idle -> Expanding -> Scoring -> Merging -> CheckingSaturation -+-> Expanding
//!                                                                 +-> Finalized
//! ```
//!
//! Shared state (corpus, graph, frontier) is only written during Merging.
//! Expansion and scoring read it and work on their own outputs, so a round
//! either merges completely or not at all.

use crate::classifier::RelevanceClassifier;
use crate::corpus::{Corpus, MergeOutcome, SeenSet};
use crate::expander::{ExpansionSettings, StageExpander};
use crate::finalizer::CorpusFinalizer;
use crate::graph::{CitationGraph, GraphSummary};
use crate::provider::BibliographicProvider;
use crate::relevance::{RelevanceEngine, RelevanceSettings, VerdictMethod};
use crate::round::{DiffusionRound, OpenRound, RoundTally};
use crate::seeds::SeedSelector;
use crate::types::{canonical_id, DiscoveryMethod, PaperId, PaperRecord, PaperStub};
use chrono::{Datelike, Utc};
use paperforge_common::config::DiffusionConfig;
use paperforge_common::errors::{AppError, Result};
use paperforge_common::metrics::record_run;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Rounds in a row below the saturation threshold before the run stops
const SATURATION_STREAK: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffusionPhase {
    Idle,
    Expanding,
    Scoring,
    Merging,
    CheckingSaturation,
    Finalized,
}

impl DiffusionPhase {
    pub fn can_transition_to(self, next: DiffusionPhase) -> bool {
        use DiffusionPhase::*;
        matches!(
            (self, next),
            (Idle, Expanding)
                | (Expanding, Scoring)
                | (Scoring, Merging)
                | (Merging, CheckingSaturation)
                | (CheckingSaturation, Expanding)
                | (Idle, Finalized)
                | (CheckingSaturation, Finalized)
        )
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Two consecutive rounds below the saturation threshold
    Saturated,
    StageLimit,
    CorpusLimit,
    /// No unexpanded accepted papers left to use as seeds
    FrontierExhausted,
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saturated => "saturated",
            Self::StageLimit => "stage_limit",
            Self::CorpusLimit => "corpus_limit",
            Self::FrontierExhausted => "frontier_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Mutable state of one run, owned by the controller
#[derive(Debug)]
pub struct DiffusionState {
    pub corpus: Corpus,
    pub graph: CitationGraph,
    pub rounds: Vec<DiffusionRound>,
    pub current_stage: usize,
    pub max_stages: usize,
    pub saturation_threshold: f64,
    pub max_corpus_size: usize,
    pub is_saturated: bool,
    pub phase: DiffusionPhase,
    /// Every id seeded or emitted as a candidate
    pub seen: SeenSet,
    /// Papers whose citations have been fetched
    pub expanded: HashSet<PaperId>,
    /// Accepted papers waiting to be expanded
    pub frontier: Vec<PaperId>,
    low_yield_streak: usize,
}

impl DiffusionState {
    pub fn new(config: &DiffusionConfig) -> Self {
        Self {
            corpus: Corpus::new(),
            graph: CitationGraph::new(),
            rounds: Vec::new(),
            current_stage: 0,
            max_stages: config.max_stages,
            saturation_threshold: config.saturation_threshold,
            max_corpus_size: config.max_corpus_size,
            is_saturated: false,
            phase: DiffusionPhase::Idle,
            seen: SeenSet::new(),
            expanded: HashSet::new(),
            frontier: Vec::new(),
            low_yield_streak: 0,
        }
    }

    fn transition(&mut self, next: DiffusionPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal phase transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(from = ?self.phase, to = ?next, stage = self.current_stage, "Phase transition");
        self.phase = next;
    }

    /// Record the latest round's yield and decide whether the run is over
    fn check_termination(&mut self) -> Option<TerminationReason> {
        let delta = self.rounds.last().map_or(0.0, |r| r.coverage_delta);
        if delta < self.saturation_threshold {
            self.low_yield_streak += 1;
        } else {
            self.low_yield_streak = 0;
        }

        if self.low_yield_streak >= SATURATION_STREAK {
            self.is_saturated = true;
            return Some(TerminationReason::Saturated);
        }
        if self.current_stage >= self.max_stages {
            return Some(TerminationReason::StageLimit);
        }
        if self.corpus.len() >= self.max_corpus_size {
            return Some(TerminationReason::CorpusLimit);
        }
        if self.frontier.iter().all(|id| self.expanded.contains(id)) {
            return Some(TerminationReason::FrontierExhausted);
        }
        None
    }
}

/// Everything a finished run hands back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffusionOutcome {
    pub final_corpus: Vec<PaperRecord>,
    pub graph_summary: GraphSummary,
    pub rounds: Vec<DiffusionRound>,
    pub termination: TerminationReason,
}

pub struct DiffusionController {
    config: DiffusionConfig,
    expander: StageExpander,
    relevance: RelevanceEngine,
    selector: SeedSelector,
    finalizer: CorpusFinalizer,
}

impl DiffusionController {
    /// Validate the configuration and wire the stages together
    pub fn new(
        config: DiffusionConfig,
        provider: Arc<dyn BibliographicProvider>,
        classifier: Arc<dyn RelevanceClassifier>,
    ) -> Result<Self> {
        config.ensure_valid()?;
        let reference_year = config.reference_year.unwrap_or_else(|| Utc::now().year());

        Ok(Self {
            expander: StageExpander::new(provider, ExpansionSettings::from(&config)),
            relevance: RelevanceEngine::new(classifier, RelevanceSettings::from(&config)),
            selector: SeedSelector::from_config(&config, reference_year),
            finalizer: CorpusFinalizer::new(&config, reference_year),
            config,
        })
    }

    /// Run diffusion from `seeds` to termination.
    ///
    /// Only an empty topic is an error here; provider and classifier failures
    /// degrade the run instead of aborting it.
    #[instrument(skip(self, seeds, cancel))]
    pub async fn run(
        &self,
        topic: &str,
        seeds: Vec<PaperStub>,
        cancel: &CancellationToken,
    ) -> Result<DiffusionOutcome> {
        if topic.trim().is_empty() {
            return Err(AppError::Configuration {
                message: "topic must not be empty".to_string(),
            });
        }

        info!(
            topic,
            seeds = seeds.len(),
            max_stages = self.config.max_stages,
            max_corpus_size = self.config.max_corpus_size,
            "Starting diffusion run"
        );

        let mut state = self.seed_state(seeds);

        let termination = if state.frontier.is_empty() {
            warn!("No valid seeds, nothing to expand");
            TerminationReason::FrontierExhausted
        } else {
            loop {
                if cancel.is_cancelled() {
                    info!(stage = state.current_stage, "Diffusion cancelled");
                    break TerminationReason::Cancelled;
                }
                if let Some(reason) = self.run_round(topic, &mut state, cancel).await {
                    break reason;
                }
            }
        };

        Ok(self.finish(state, termination))
    }

    /// Idle phase: canonicalize seeds and place them in the corpus at stage 0
    fn seed_state(&self, seeds: Vec<PaperStub>) -> DiffusionState {
        let mut state = DiffusionState::new(&self.config);

        for seed in seeds {
            let Some(id) = canonical_id(&seed.id) else {
                warn!(raw_id = %seed.id, "Ignoring seed with malformed id");
                continue;
            };
            let stub = PaperStub { id, ..seed };
            state.graph.add_stub(&stub);
            state.seen.insert(&stub.id);
            if state.corpus.merge(PaperRecord::seed(stub.clone())) == MergeOutcome::Inserted {
                state.frontier.push(stub.id);
            }
        }

        state
    }

    /// One round, from seed selection through the termination check
    async fn run_round(
        &self,
        topic: &str,
        state: &mut DiffusionState,
        cancel: &CancellationToken,
    ) -> Option<TerminationReason> {
        let selection = self
            .selector
            .select(&state.frontier, &state.corpus, &state.graph, &state.expanded);
        if selection.seeds.is_empty() {
            return Some(TerminationReason::FrontierExhausted);
        }
        state.frontier = selection.deferred;
        state.current_stage += 1;
        let stage = state.current_stage;
        let round = OpenRound::new(stage, selection.seeds);

        // Expanding
        state.transition(DiffusionPhase::Expanding);
        let seen = std::mem::take(&mut state.seen);
        let expansion = self
            .expander
            .expand(stage, round.seed_ids(), &state.corpus, seen, cancel)
            .await;
        state.seen = expansion.seen;

        // Scoring against a scratch graph carrying this round's edges
        state.transition(DiffusionPhase::Scoring);
        let scratch = state.graph.with_edges(&expansion.papers, &expansion.edges);
        let verdicts = self
            .relevance
            .evaluate(topic, &expansion.candidates, &state.corpus, &scratch, cancel)
            .await;

        // Merging
        state.transition(DiffusionPhase::Merging);
        state.graph = scratch;

        let mut tally = RoundTally {
            candidate_count: expansion.candidates.len(),
            failed_seeds: expansion.failed_seeds,
            ..Default::default()
        };

        for (mut record, verdict) in expansion.candidates.into_iter().zip(verdicts) {
            if !verdict.accepted {
                if verdict.method == VerdictMethod::ScoringFailed {
                    tally.classifier_failures += 1;
                }
                continue;
            }

            record.relevance_score = Some(verdict.score);
            if verdict.method == VerdictMethod::Structural {
                record.discovery_method = DiscoveryMethod::CocitationStructural;
                tally.structural_accepts += 1;
            } else {
                tally.semantic_accepts += 1;
            }

            let id = record.id.clone();
            if state.corpus.merge(record) == MergeOutcome::Inserted {
                state.frontier.push(id);
            }
        }

        let skipped: HashSet<&PaperId> = expansion.skipped_seeds.iter().collect();
        for seed in round.seed_ids() {
            if !skipped.contains(seed) {
                state.expanded.insert(seed.clone());
            }
        }
        state.frontier.extend(expansion.skipped_seeds.iter().cloned());

        state.rounds.push(round.close(tally));

        // CheckingSaturation
        state.transition(DiffusionPhase::CheckingSaturation);
        state.check_termination()
    }

    /// Finalized phase: rank, cap and annotate
    fn finish(&self, mut state: DiffusionState, termination: TerminationReason) -> DiffusionOutcome {
        state.transition(DiffusionPhase::Finalized);
        let (final_corpus, graph_summary) = self.finalizer.finalize_with_summary(&state);

        record_run(termination.as_str(), final_corpus.len());
        info!(
            termination = termination.as_str(),
            rounds = state.rounds.len(),
            accepted = state.corpus.len(),
            final_corpus = final_corpus.len(),
            "Diffusion run finished"
        );

        DiffusionOutcome {
            final_corpus,
            graph_summary,
            rounds: state.rounds,
            termination,
        }
    }
}
