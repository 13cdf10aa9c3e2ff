//! Accepted-paper corpus and the seen-id set

use crate::types::{PaperId, PaperRecord};
use std::collections::{HashMap, HashSet};

/// Result of merging a record into the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New paper
    Inserted,
    /// Already present; its score was raised
    Refreshed,
    /// Already present with an equal or higher score
    Unchanged,
}

/// Papers accepted so far, keyed by canonical id.
///
/// The first record for an id fixes its identity (stage, method, metadata);
/// later merges can only raise the relevance score.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    papers: HashMap<PaperId, PaperRecord>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.papers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&PaperRecord> {
        self.papers.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &PaperRecord> {
        self.papers.values()
    }

    pub fn merge(&mut self, record: PaperRecord) -> MergeOutcome {
        match self.papers.get_mut(&record.id) {
            Some(existing) => {
                if existing.refresh_score(record.relevance_score) {
                    MergeOutcome::Refreshed
                } else {
                    MergeOutcome::Unchanged
                }
            }
            None => {
                self.papers.insert(record.id.clone(), record);
                MergeOutcome::Inserted
            }
        }
    }
}

/// Every id ever emitted as a candidate or seeded.
///
/// Persisted across rounds so a paper is scored at most once per run.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: HashSet<PaperId>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark as seen. Returns false if it already was.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiscoveryMethod, PaperStub};

    fn record(id: &str, stage: usize, score: f64) -> PaperRecord {
        let mut record = PaperRecord::candidate(
            PaperStub::new(id, id),
            stage,
            DiscoveryMethod::BackwardCitation,
        );
        record.relevance_score = Some(score);
        record
    }

    #[test]
    fn test_first_writer_wins_identity() {
        let mut corpus = Corpus::new();
        assert_eq!(corpus.merge(record("10.1000/a", 1, 0.7)), MergeOutcome::Inserted);
        assert_eq!(corpus.merge(record("10.1000/a", 3, 0.9)), MergeOutcome::Refreshed);

        let stored = corpus.get("10.1000/a").unwrap();
        assert_eq!(stored.discovery_stage, 1);
        assert_eq!(stored.relevance_score, Some(0.9));
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn test_lower_score_is_ignored() {
        let mut corpus = Corpus::new();
        corpus.merge(record("10.1000/a", 1, 0.9));
        assert_eq!(corpus.merge(record("10.1000/a", 2, 0.5)), MergeOutcome::Unchanged);
        assert_eq!(corpus.get("10.1000/a").unwrap().relevance_score, Some(0.9));
    }

    #[test]
    fn test_seen_set_insert_once() {
        let mut seen = SeenSet::new();
        assert!(seen.insert("10.1000/a"));
        assert!(!seen.insert("10.1000/a"));
        assert!(seen.contains("10.1000/a"));
        assert_eq!(seen.len(), 1);
    }
}
