//! Citation graph representation
//!
//! Directed graph over canonical paper ids. An edge `citing -> cited` means
//! `citing` lists `cited` in its references. Nodes can exist before their
//! metadata is known (placeholders created by an edge endpoint).

use crate::types::{PaperId, PaperStub};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Edge in the citation graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationEdge {
    /// Citing paper ID
    pub citing: PaperId,

    /// Cited paper ID
    pub cited: PaperId,
}

impl CitationEdge {
    pub fn new(citing: impl Into<PaperId>, cited: impl Into<PaperId>) -> Self {
        Self {
            citing: citing.into(),
            cited: cited.into(),
        }
    }
}

/// Metadata attached to a node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperNode {
    pub title: Option<String>,
    pub year: Option<i32>,
}

impl PaperNode {
    fn is_placeholder(&self) -> bool {
        self.title.is_none() && self.year.is_none()
    }
}

impl From<&PaperStub> for PaperNode {
    fn from(stub: &PaperStub) -> Self {
        Self {
            title: stub.has_metadata().then(|| stub.title.clone()),
            year: stub.year,
        }
    }
}

/// In-memory citation graph
#[derive(Debug, Clone, Default)]
pub struct CitationGraph {
    /// paper_id -> papers it cites
    outgoing: HashMap<PaperId, HashSet<PaperId>>,

    /// paper_id -> papers citing it
    incoming: HashMap<PaperId, HashSet<PaperId>>,

    nodes: HashMap<PaperId, PaperNode>,

    edge_count: usize,
}

impl CitationGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or fill in metadata for a placeholder.
    ///
    /// Returns true if the node did not exist before.
    pub fn add_paper(&mut self, id: &str, node: PaperNode) -> bool {
        match self.nodes.get_mut(id) {
            Some(existing) => {
                if existing.is_placeholder() && !node.is_placeholder() {
                    *existing = node;
                }
                false
            }
            None => {
                self.nodes.insert(id.to_string(), node);
                true
            }
        }
    }

    pub fn add_stub(&mut self, stub: &PaperStub) -> bool {
        self.add_paper(&stub.id, PaperNode::from(stub))
    }

    /// Add `citing -> cited`, creating placeholder endpoints as needed.
    ///
    /// Self-citations are ignored. Returns true if the edge is new.
    pub fn add_citation(&mut self, citing: &str, cited: &str) -> bool {
        if citing == cited {
            debug!(paper_id = citing, "Ignoring self-citation");
            return false;
        }

        self.add_paper(citing, PaperNode::default());
        self.add_paper(cited, PaperNode::default());

        let inserted = self
            .outgoing
            .entry(citing.to_string())
            .or_default()
            .insert(cited.to_string());
        if inserted {
            self.incoming
                .entry(cited.to_string())
                .or_default()
                .insert(citing.to_string());
            self.edge_count += 1;
        }
        inserted
    }

    pub fn add_edge(&mut self, edge: &CitationEdge) -> bool {
        self.add_citation(&edge.citing, &edge.cited)
    }

    /// Copy of this graph with extra papers and edges applied
    pub fn with_edges(&self, papers: &[PaperStub], edges: &[CitationEdge]) -> Self {
        let mut graph = self.clone();
        for stub in papers {
            graph.add_stub(stub);
        }
        for edge in edges {
            graph.add_edge(edge);
        }
        graph
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&PaperNode> {
        self.nodes.get(id)
    }

    pub fn year(&self, id: &str) -> Option<i32> {
        self.nodes.get(id).and_then(|n| n.year)
    }

    /// Papers cited by this paper
    pub fn references<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a PaperId> + 'a {
        self.outgoing.get(id).into_iter().flatten()
    }

    /// Papers citing this paper
    pub fn citations<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a PaperId> + 'a {
        self.incoming.get(id).into_iter().flatten()
    }

    pub fn has_edge(&self, citing: &str, cited: &str) -> bool {
        self.outgoing
            .get(citing)
            .map_or(false, |refs| refs.contains(cited))
    }

    /// Incoming citations
    pub fn in_degree(&self, id: &str) -> usize {
        self.incoming.get(id).map_or(0, HashSet::len)
    }

    /// Outgoing references
    pub fn out_degree(&self, id: &str) -> usize {
        self.outgoing.get(id).map_or(0, HashSet::len)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// All node ids in sorted order
    pub fn node_ids(&self) -> Vec<PaperId> {
        let mut ids: Vec<PaperId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of papers citing both `a` and `b`
    pub fn co_citation_count(&self, a: &str, b: &str) -> usize {
        shared_neighbours(self.incoming.get(a), self.incoming.get(b))
    }

    /// Number of references shared by `a` and `b`
    pub fn coupling_count(&self, a: &str, b: &str) -> usize {
        shared_neighbours(self.outgoing.get(a), self.outgoing.get(b))
    }

    /// Co-citation and coupling counts between `paper` and every paper
    /// accepted by `include` that shares at least one of either.
    ///
    /// Walks the two-hop neighbourhood of `paper` instead of comparing it
    /// against each member individually.
    pub fn shared_citation_counts<F>(&self, paper: &str, include: F) -> HashMap<PaperId, (usize, usize)>
    where
        F: Fn(&str) -> bool,
    {
        let mut counts: HashMap<PaperId, (usize, usize)> = HashMap::new();

        for citer in self.citations(paper) {
            for other in self.references(citer) {
                if other != paper && include(other) {
                    counts.entry(other.clone()).or_default().0 += 1;
                }
            }
        }

        for reference in self.references(paper) {
            for other in self.citations(reference) {
                if other != paper && include(other) {
                    counts.entry(other.clone()).or_default().1 += 1;
                }
            }
        }

        counts
    }

    /// Unexpanded neighbours of `paper`: distinct papers it cites or is
    /// cited by that `expanded` does not contain
    pub fn unexpanded_neighbours(&self, paper: &str, expanded: &HashSet<PaperId>) -> usize {
        self.references(paper)
            .chain(self.citations(paper))
            .filter(|id| !expanded.contains(*id))
            .collect::<HashSet<_>>()
            .len()
    }
}

fn shared_neighbours(a: Option<&HashSet<PaperId>>, b: Option<&HashSet<PaperId>>) -> usize {
    match (a, b) {
        (Some(a), Some(b)) => {
            let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
            small.iter().filter(|id| large.contains(*id)).count()
        }
        _ => 0,
    }
}
