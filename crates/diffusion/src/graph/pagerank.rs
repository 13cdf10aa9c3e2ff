//! PageRank-based authority scoring
//!
//! Implements a simplified PageRank over the citation graph. Mass held by
//! papers with no known references is spread uniformly, so scores stay
//! comparable across graphs with many placeholder leaves.

use super::CitationGraph;
use crate::types::PaperId;
use std::collections::HashMap;

/// PageRank configuration
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    /// Damping factor (typically 0.85)
    pub damping: f64,

    /// Maximum iterations
    pub max_iterations: usize,

    /// Convergence threshold
    pub epsilon: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            epsilon: 1e-9,
        }
    }
}

/// PageRank scorer for papers
#[derive(Debug, Clone, Default)]
pub struct PageRankScorer {
    config: PageRankConfig,
}

impl PageRankScorer {
    pub fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    /// Compute scores for all papers, normalized so the maximum is 1.0
    pub fn compute(&self, graph: &CitationGraph) -> HashMap<PaperId, f64> {
        let nodes = graph.node_ids();
        let n = nodes.len();
        if n == 0 {
            return HashMap::new();
        }

        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let citers: Vec<Vec<usize>> = nodes
            .iter()
            .map(|id| {
                graph
                    .citations(id)
                    .filter_map(|c| index.get(c.as_str()).copied())
                    .collect()
            })
            .collect();
        let out_counts: Vec<usize> = nodes.iter().map(|id| graph.out_degree(id)).collect();

        let n_f64 = n as f64;
        let damping = self.config.damping;
        let mut scores = vec![1.0 / n_f64; n];

        for _ in 0..self.config.max_iterations {
            let dangling: f64 = scores
                .iter()
                .zip(&out_counts)
                .filter(|(_, out)| **out == 0)
                .map(|(score, _)| score)
                .sum();
            let base = (1.0 - damping) / n_f64 + damping * dangling / n_f64;

            let mut max_diff: f64 = 0.0;
            let new_scores: Vec<f64> = (0..n)
                .map(|node| {
                    let citation_sum: f64 = citers[node]
                        .iter()
                        .map(|&citing| scores[citing] / out_counts[citing] as f64)
                        .sum();
                    let score = base + damping * citation_sum;
                    max_diff = max_diff.max((score - scores[node]).abs());
                    score
                })
                .collect();

            scores = new_scores;

            if max_diff < self.config.epsilon {
                break;
            }
        }

        let max_score = scores.iter().cloned().fold(0.0f64, f64::max);
        if max_score > 0.0 {
            for score in scores.iter_mut() {
                *score /= max_score;
            }
        }

        nodes.into_iter().zip(scores).collect()
    }

    /// Top `limit` papers by authority, highest first. Ties break on id.
    pub fn rank(&self, graph: &CitationGraph, limit: usize) -> Vec<(PaperId, f64)> {
        let mut ranked: Vec<(PaperId, f64)> = self.compute(graph).into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);
        ranked
    }
}
