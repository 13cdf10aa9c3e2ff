//! Citation graph and its analytics
//!
//! The graph is built incrementally as rounds merge; the analytics here
//! (seminal, recent-impactful, bridging, clusters, authority) are read-only
//! queries run at selection and finalization time.

mod centrality;
mod citation;
mod community;
mod pagerank;
mod projection;

pub use centrality::betweenness;
pub use citation::{CitationEdge, CitationGraph, PaperNode};
pub use community::louvain;
pub use pagerank::{PageRankConfig, PageRankScorer};
pub use projection::CoCitationProjection;

use crate::types::PaperId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

/// Window used by the recent-impactful query
#[derive(Debug, Clone, Copy)]
pub struct RecencyWindow {
    pub reference_year: i32,
    pub years: i32,
}

impl RecencyWindow {
    pub fn new(reference_year: i32, years: i32) -> Self {
        Self { reference_year, years }
    }

    pub fn contains(&self, year: i32) -> bool {
        year <= self.reference_year && self.reference_year - year < self.years
    }

    /// Years since publication, counting the publication year as one
    pub fn age(&self, year: i32) -> i32 {
        (self.reference_year - year + 1).max(1)
    }
}

fn by_score_then_id(a: &(PaperId, f64), b: &(PaperId, f64)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

fn top_ids(mut scored: Vec<(PaperId, f64)>, top_n: usize) -> Vec<PaperId> {
    scored.sort_by(by_score_then_id);
    scored.truncate(top_n);
    scored.into_iter().map(|(id, _)| id).collect()
}

impl CitationGraph {
    /// Most-cited papers within the graph (in-degree), ties by id
    pub fn seminal_papers(&self, top_n: usize) -> Vec<PaperId> {
        let scored = self
            .node_ids()
            .into_iter()
            .filter_map(|id| {
                let degree = self.in_degree(&id);
                (degree > 0).then_some((id, degree as f64))
            })
            .collect();
        top_ids(scored, top_n)
    }

    /// Citations per year of age for a paper with a known year
    pub fn citation_velocity(&self, id: &str, window: RecencyWindow) -> Option<f64> {
        let year = self.year(id)?;
        Some(self.in_degree(id) as f64 / window.age(year) as f64)
    }

    /// Papers published inside the window, ranked by citation velocity
    pub fn recent_impactful(&self, top_n: usize, window: RecencyWindow) -> Vec<PaperId> {
        let scored = self
            .node_ids()
            .into_iter()
            .filter_map(|id| {
                let year = self.year(&id)?;
                if !window.contains(year) || self.in_degree(&id) == 0 {
                    return None;
                }
                let velocity = self.citation_velocity(&id, window)?;
                Some((id, velocity))
            })
            .collect();
        top_ids(scored, top_n)
    }

    /// Highest-betweenness papers in the co-citation projection
    pub fn bridging_papers(&self, top_n: usize) -> Vec<PaperId> {
        let projection = CoCitationProjection::build(self);
        let scores = betweenness(&projection);
        let scored = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .map(|(i, score)| (projection.id(i).to_string(), score))
            .collect();
        top_ids(scored, top_n)
    }

    /// Co-citation communities as sorted id lists, largest first
    pub fn clusters(&self) -> Vec<Vec<PaperId>> {
        let projection = CoCitationProjection::build(self);
        louvain(&projection)
            .into_iter()
            .map(|members| {
                let mut ids: Vec<PaperId> =
                    members.into_iter().map(|i| projection.id(i).to_string()).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    /// PageRank authority, top `top_n`
    pub fn authority_scores(&self, top_n: usize) -> Vec<(PaperId, f64)> {
        PageRankScorer::default().rank(self, top_n)
    }
}

/// Snapshot of the graph returned alongside the final corpus
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub seminal: Vec<PaperId>,
    pub recent_impactful: Vec<PaperId>,
    pub bridging: Vec<PaperId>,
    pub clusters: Vec<Vec<PaperId>>,
    pub authority: Vec<(PaperId, f64)>,
    /// Set when bridging and clusters were skipped for graph size
    pub structure_skipped: bool,
}

impl GraphSummary {
    /// Summarize `graph`. Projection-based analytics are skipped above `node_limit`.
    pub fn build(
        graph: &CitationGraph,
        top_n: usize,
        window: RecencyWindow,
        node_limit: usize,
    ) -> Self {
        let structure_skipped = graph.node_count() > node_limit;
        let (bridging, clusters) = if structure_skipped {
            warn!(
                nodes = graph.node_count(),
                limit = node_limit,
                "Graph too large, skipping bridging and cluster analysis"
            );
            (Vec::new(), Vec::new())
        } else {
            (graph.bridging_papers(top_n), graph.clusters())
        };

        Self {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            seminal: graph.seminal_papers(top_n),
            recent_impactful: graph.recent_impactful(top_n, window),
            bridging,
            clusters,
            authority: graph.authority_scores(top_n),
            structure_skipped,
        }
    }

    /// Cluster index for a paper, if it was placed in one
    pub fn cluster_of(&self, id: &str) -> Option<usize> {
        self.clusters
            .iter()
            .position(|members| members.binary_search_by(|m| m.as_str().cmp(id)).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaperStub;

    fn sample_graph() -> CitationGraph {
        let mut graph = CitationGraph::new();
        graph.add_stub(&PaperStub::new("old", "Old").with_year(1990));
        graph.add_stub(&PaperStub::new("new", "New").with_year(2023));
        graph.add_stub(&PaperStub::new("mid", "Mid").with_year(2021));
        for citer in ["p1", "p2", "p3", "p4"] {
            graph.add_citation(citer, "old");
        }
        for citer in ["p1", "p2"] {
            graph.add_citation(citer, "new");
        }
        graph.add_citation("p3", "mid");
        graph
    }

    #[test]
    fn test_recency_window() {
        let window = RecencyWindow::new(2024, 5);
        assert!(window.contains(2024));
        assert!(window.contains(2020));
        assert!(!window.contains(2019));
        assert!(!window.contains(2025));
        assert_eq!(window.age(2024), 1);
        assert_eq!(window.age(2030), 1);
    }

    #[test]
    fn test_seminal_papers() {
        let graph = sample_graph();
        assert_eq!(graph.seminal_papers(2), vec!["old".to_string(), "new".to_string()]);
    }

    #[test]
    fn test_recent_impactful_uses_velocity() {
        let graph = sample_graph();
        let window = RecencyWindow::new(2024, 5);

        // new: 2 citations / 2 years; mid: 1 / 4; old is outside the window
        assert_eq!(
            graph.recent_impactful(10, window),
            vec!["new".to_string(), "mid".to_string()]
        );
        assert_eq!(graph.citation_velocity("new", window), Some(1.0));
        assert_eq!(graph.citation_velocity("p1", window), None);
    }

    #[test]
    fn test_summary_and_cluster_lookup() {
        let graph = sample_graph();
        let summary = GraphSummary::build(&graph, 5, RecencyWindow::new(2024, 5), 1000);

        assert_eq!(summary.node_count, graph.node_count());
        assert_eq!(summary.edge_count, 7);
        assert!(!summary.structure_skipped);
        // old and new are co-cited by p1 and p2
        let old_cluster = summary.cluster_of("old");
        assert!(old_cluster.is_some());
        assert_eq!(old_cluster, summary.cluster_of("new"));
        assert_eq!(summary.cluster_of("p1"), None);
    }

    #[test]
    fn test_summary_skips_structure_for_large_graphs() {
        let graph = sample_graph();
        let summary = GraphSummary::build(&graph, 5, RecencyWindow::new(2024, 5), 3);

        assert!(summary.structure_skipped);
        assert!(summary.bridging.is_empty());
        assert!(summary.clusters.is_empty());
        assert!(!summary.seminal.is_empty());
    }
}
