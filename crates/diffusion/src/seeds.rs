//! Seed selection for the next round
//!
//! The frontier holds papers accepted but not yet expanded. Each round takes
//! the most promising of them, ordered by:
//! 1. in-degree within the graph
//! 2. citation velocity, for papers inside the recency window
//! 3. number of incident edges to papers not yet expanded
//! 4. earlier discovery stage, then id
//!
//! Anything past the per-round cap stays on the frontier.

use crate::corpus::Corpus;
use crate::graph::{CitationGraph, RecencyWindow};
use crate::types::PaperId;
use paperforge_common::config::DiffusionConfig;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
struct SeedPriority {
    id: PaperId,
    in_degree: usize,
    velocity: f64,
    unexpanded: usize,
    stage: usize,
}

impl SeedPriority {
    fn compare(&self, other: &Self) -> Ordering {
        other
            .in_degree
            .cmp(&self.in_degree)
            .then_with(|| {
                other
                    .velocity
                    .partial_cmp(&self.velocity)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| other.unexpanded.cmp(&self.unexpanded))
            .then_with(|| self.stage.cmp(&other.stage))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Chosen seeds and the frontier left over for later rounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedSelection {
    pub seeds: Vec<PaperId>,
    pub deferred: Vec<PaperId>,
}

#[derive(Debug, Clone)]
pub struct SeedSelector {
    max_seeds: usize,
    window: RecencyWindow,
}

impl SeedSelector {
    pub fn new(max_seeds: usize, window: RecencyWindow) -> Self {
        Self {
            max_seeds: max_seeds.max(1),
            window,
        }
    }

    pub fn from_config(config: &DiffusionConfig, reference_year: i32) -> Self {
        Self::new(
            config.max_seeds_per_round,
            RecencyWindow::new(reference_year, config.recent_window_years),
        )
    }

    pub fn select(
        &self,
        frontier: &[PaperId],
        corpus: &Corpus,
        graph: &CitationGraph,
        expanded: &HashSet<PaperId>,
    ) -> SeedSelection {
        let mut ranked: Vec<SeedPriority> = frontier
            .iter()
            .filter(|id| !expanded.contains(*id))
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|id| SeedPriority {
                id: id.clone(),
                in_degree: graph.in_degree(id),
                velocity: graph
                    .year(id)
                    .filter(|year| self.window.contains(*year))
                    .and_then(|_| graph.citation_velocity(id, self.window))
                    .unwrap_or(0.0),
                unexpanded: graph.unexpanded_neighbours(id, expanded),
                stage: corpus.get(id).map_or(usize::MAX, |r| r.discovery_stage),
            })
            .collect();

        ranked.sort_by(SeedPriority::compare);

        let split = ranked.len().min(self.max_seeds);
        let deferred: Vec<PaperId> = ranked.split_off(split).into_iter().map(|p| p.id).collect();
        let seeds: Vec<PaperId> = ranked.into_iter().map(|p| p.id).collect();

        debug!(selected = seeds.len(), deferred = deferred.len(), "Selected seeds");
        SeedSelection { seeds, deferred }
    }
}
