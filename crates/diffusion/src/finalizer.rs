//! Corpus finalization
//!
//! Ranks the accepted papers, enforces the corpus size cap, and attaches
//! graph annotations (seminal, bridging, cluster) to the survivors.

use crate::controller::DiffusionState;
use crate::graph::{GraphSummary, RecencyWindow};
use crate::types::PaperRecord;
use paperforge_common::config::DiffusionConfig;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::info;

/// Final ordering: score descending (unscored last), then stage, then id
pub fn rank_order(a: &PaperRecord, b: &PaperRecord) -> Ordering {
    match (a.relevance_score, b.relevance_score) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.discovery_stage.cmp(&b.discovery_stage))
    .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone)]
pub struct CorpusFinalizer {
    max_corpus_size: usize,
    top_n: usize,
    node_limit: usize,
    window: RecencyWindow,
}

impl CorpusFinalizer {
    pub fn new(config: &DiffusionConfig, reference_year: i32) -> Self {
        Self {
            max_corpus_size: config.max_corpus_size,
            top_n: config.summary_top_n,
            node_limit: config.annotation_node_limit,
            window: RecencyWindow::new(reference_year, config.recent_window_years),
        }
    }

    /// Ranked, capped and annotated corpus
    pub fn finalize(&self, state: &DiffusionState) -> Vec<PaperRecord> {
        self.finalize_with_summary(state).0
    }

    /// Same as `finalize`, also returning the graph summary used for annotation
    pub fn finalize_with_summary(&self, state: &DiffusionState) -> (Vec<PaperRecord>, GraphSummary) {
        let mut papers: Vec<PaperRecord> = state.corpus.records().cloned().collect();
        papers.sort_by(rank_order);

        if papers.len() > self.max_corpus_size {
            let cutoff_score = papers[self.max_corpus_size - 1].relevance_score;
            info!(
                accepted = papers.len(),
                kept = self.max_corpus_size,
                cutoff_score = ?cutoff_score,
                "Truncating corpus to size limit"
            );
            papers.truncate(self.max_corpus_size);
        }

        let summary = GraphSummary::build(&state.graph, self.top_n, self.window, self.node_limit);
        let seminal: HashSet<&str> = summary.seminal.iter().map(String::as_str).collect();
        let bridging: HashSet<&str> = summary.bridging.iter().map(String::as_str).collect();

        for paper in papers.iter_mut() {
            paper.annotations.seminal = seminal.contains(paper.id.as_str());
            paper.annotations.bridging = bridging.contains(paper.id.as_str());
            paper.annotations.cluster = summary.cluster_of(&paper.id);
        }

        info!(
            papers = papers.len(),
            nodes = summary.node_count,
            edges = summary.edge_count,
            clusters = summary.clusters.len(),
            "Corpus finalized"
        );

        (papers, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stub;
    use crate::types::DiscoveryMethod;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn config(max_corpus_size: usize) -> DiffusionConfig {
        DiffusionConfig {
            max_corpus_size,
            ..Default::default()
        }
    }

    fn scored(id: &str, score: f64, stage: usize) -> PaperRecord {
        let mut record = PaperRecord::candidate(stub(id), stage, DiscoveryMethod::BackwardCitation);
        record.relevance_score = Some(score);
        record
    }

    #[test]
    fn test_truncates_to_top_scores() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut records: Vec<PaperRecord> = (0..500)
            .map(|i| scored(&format!("10.1000/p{:03}", i), rng.gen_range(0.6..1.0), 1 + i % 3))
            .collect();
        records.shuffle(&mut rng);

        let mut expected = records.clone();
        expected.sort_by(rank_order);
        let expected_ids: Vec<String> = expected.iter().take(300).map(|r| r.id.clone()).collect();

        let mut state = DiffusionState::new(&config(300));
        for record in records {
            state.corpus.merge(record);
        }

        let finalizer = CorpusFinalizer::new(&config(300), 2024);
        let papers = finalizer.finalize(&state);

        assert_eq!(papers.len(), 300);
        assert_eq!(papers.iter().map(|p| p.id.clone()).collect::<Vec<_>>(), expected_ids);
        for pair in papers.windows(2) {
            assert!(pair[0].relevance_score >= pair[1].relevance_score);
        }
    }

    #[test]
    fn test_rank_order_tie_breaks() {
        let mut records = vec![
            scored("10.1000/b", 0.9, 2),
            scored("10.1000/c", 0.9, 1),
            scored("10.1000/a", 0.9, 2),
            PaperRecord::candidate(stub("10.1000/unscored"), 1, DiscoveryMethod::ForwardCitation),
            scored("10.1000/top", 0.95, 3),
        ];
        records.sort_by(rank_order);

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["10.1000/top", "10.1000/c", "10.1000/a", "10.1000/b", "10.1000/unscored"]
        );
    }

    #[test]
    fn test_annotations_from_graph() {
        let mut state = DiffusionState::new(&config(10));
        for id in ["hub", "peer", "loner"] {
            state.corpus.merge(scored(id, 0.9, 1));
        }
        for citer in ["x", "y"] {
            state.graph.add_citation(citer, "hub");
            state.graph.add_citation(citer, "peer");
        }

        let papers = CorpusFinalizer::new(&config(10), 2024).finalize(&state);
        let by_id = |id: &str| papers.iter().find(|p| p.id == id).unwrap().clone();

        assert!(by_id("hub").annotations.seminal);
        assert!(by_id("hub").annotations.cluster.is_some());
        assert_eq!(by_id("hub").annotations.cluster, by_id("peer").annotations.cluster);
        assert!(!by_id("loner").annotations.seminal);
        assert_eq!(by_id("loner").annotations.cluster, None);
    }
}
