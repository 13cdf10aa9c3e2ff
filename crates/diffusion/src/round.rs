//! Per-round accounting

use crate::types::PaperId;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Closed record of one diffusion round. Never modified once closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionRound {
    pub stage_number: usize,
    pub seed_ids: Vec<PaperId>,
    pub candidate_count: usize,
    pub accepted_count: usize,
    /// accepted / max(1, candidates)
    pub coverage_delta: f64,
    pub failed_seeds: Vec<PaperId>,
    pub structural_accepts: usize,
    pub semantic_accepts: usize,
    /// Candidates rejected because the classifier never produced a score
    pub classifier_failures: usize,
    pub duration_ms: u64,
}

/// Counts gathered while a round is in flight
#[derive(Debug, Clone, Default)]
pub struct RoundTally {
    pub candidate_count: usize,
    pub structural_accepts: usize,
    pub semantic_accepts: usize,
    pub classifier_failures: usize,
    pub failed_seeds: Vec<PaperId>,
}

impl RoundTally {
    pub fn accepted(&self) -> usize {
        self.structural_accepts + self.semantic_accepts
    }
}

/// A round that has been opened but not yet closed
#[derive(Debug)]
pub struct OpenRound {
    stage_number: usize,
    seed_ids: Vec<PaperId>,
    started: Instant,
}

impl OpenRound {
    pub fn new(stage_number: usize, seed_ids: Vec<PaperId>) -> Self {
        info!(stage = stage_number, seeds = seed_ids.len(), "Opening diffusion round");
        Self {
            stage_number,
            seed_ids,
            started: Instant::now(),
        }
    }

    pub fn stage_number(&self) -> usize {
        self.stage_number
    }

    pub fn seed_ids(&self) -> &[PaperId] {
        &self.seed_ids
    }

    /// Freeze the round and compute its coverage delta
    pub fn close(self, tally: RoundTally) -> DiffusionRound {
        let accepted_count = tally.accepted();
        let round = DiffusionRound {
            stage_number: self.stage_number,
            seed_ids: self.seed_ids,
            candidate_count: tally.candidate_count,
            accepted_count,
            coverage_delta: coverage_delta(accepted_count, tally.candidate_count),
            failed_seeds: tally.failed_seeds,
            structural_accepts: tally.structural_accepts,
            semantic_accepts: tally.semantic_accepts,
            classifier_failures: tally.classifier_failures,
            duration_ms: self.started.elapsed().as_millis() as u64,
        };

        paperforge_common::metrics::record_round(
            round.candidate_count,
            round.structural_accepts,
            round.semantic_accepts,
            round.coverage_delta,
        );

        info!(
            stage = round.stage_number,
            candidates = round.candidate_count,
            accepted = round.accepted_count,
            structural = round.structural_accepts,
            semantic = round.semantic_accepts,
            failed_seeds = round.failed_seeds.len(),
            coverage_delta = round.coverage_delta,
            duration_ms = round.duration_ms,
            "Closed diffusion round"
        );

        round
    }
}

/// Share of candidates accepted in a round; 0 when there were none
pub fn coverage_delta(accepted: usize, candidates: usize) -> f64 {
    accepted as f64 / candidates.max(1) as f64
}
