//! Undirected co-citation projection
//!
//! Two papers are linked when some paper cites both; the link weight is the
//! number of such citing papers. Only papers with at least one link appear.

use super::CitationGraph;
use crate::types::PaperId;
use std::collections::{BTreeMap, HashMap};

/// Weighted undirected graph over dense indices
#[derive(Debug, Clone, Default)]
pub struct CoCitationProjection {
    ids: Vec<PaperId>,
    adjacency: Vec<BTreeMap<usize, f64>>,
}

impl CoCitationProjection {
    pub fn build(graph: &CitationGraph) -> Self {
        let all_ids = graph.node_ids();
        let index: HashMap<&str, usize> = all_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut pair_weights: HashMap<(usize, usize), f64> = HashMap::new();
        for citer in &all_ids {
            let mut refs: Vec<usize> = graph
                .references(citer)
                .filter_map(|r| index.get(r.as_str()).copied())
                .collect();
            refs.sort_unstable();

            for (i, &a) in refs.iter().enumerate() {
                for &b in &refs[i + 1..] {
                    *pair_weights.entry((a, b)).or_insert(0.0) += 1.0;
                }
            }
        }

        let mut used: Vec<usize> = pair_weights.keys().flat_map(|&(a, b)| [a, b]).collect();
        used.sort_unstable();
        used.dedup();

        let remap: HashMap<usize, usize> = used
            .iter()
            .enumerate()
            .map(|(dense, &sparse)| (sparse, dense))
            .collect();

        let ids: Vec<PaperId> = used.iter().map(|&sparse| all_ids[sparse].clone()).collect();
        let mut adjacency = vec![BTreeMap::new(); ids.len()];
        for ((a, b), weight) in pair_weights {
            let (a, b) = (remap[&a], remap[&b]);
            adjacency[a].insert(b, weight);
            adjacency[b].insert(a, weight);
        }

        Self { ids, adjacency }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub fn neighbours(&self, index: usize) -> &BTreeMap<usize, f64> {
        &self.adjacency[index]
    }

    pub fn weight(&self, a: usize, b: usize) -> f64 {
        self.adjacency[a].get(&b).copied().unwrap_or(0.0)
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(BTreeMap::len).sum::<usize>() / 2
    }
}
