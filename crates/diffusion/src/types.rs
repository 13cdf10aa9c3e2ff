//! Core paper types shared by every diffusion stage
//!
//! Identifiers are canonicalized once, at the boundary where stubs enter the
//! engine, so every map and set downstream can key on plain strings.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Canonical paper identifier: a lower-cased DOI or a `scheme:value` id
pub type PaperId = String;

fn doi_pattern() -> &'static Regex {
    static DOI: OnceLock<Regex> = OnceLock::new();
    DOI.get_or_init(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("static DOI pattern"))
}

fn namespaced_pattern() -> &'static Regex {
    static NAMESPACED: OnceLock<Regex> = OnceLock::new();
    NAMESPACED.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*:\S+$").expect("static id pattern")
    })
}

/// Normalize a raw identifier into its canonical form.
///
/// DOIs (bare, `doi:`-prefixed, or as a doi.org URL) become lower-cased bare
/// DOIs. Other namespaced ids (`s2:…`, `arxiv:…`) keep their value and get a
/// lower-cased scheme. Anything else is malformed and yields `None`.
pub fn canonical_id(raw: &str) -> Option<PaperId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_lowercase();
    let doi_candidate = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lowered.strip_prefix(prefix))
        .unwrap_or(&lowered);

    if doi_pattern().is_match(doi_candidate) {
        return Some(doi_candidate.to_string());
    }

    if namespaced_pattern().is_match(trimmed) {
        let (scheme, value) = trimmed.split_once(':')?;
        return Some(format!("{}:{}", scheme.to_lowercase(), value));
    }

    None
}

/// Minimal paper description as returned by a bibliographic provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperStub {
    pub id: PaperId,

    #[serde(default)]
    pub title: String,

    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Citation count reported by the provider, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
}

impl PaperStub {
    pub fn new(id: impl Into<PaperId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: None,
            year: None,
            citation_count: None,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    /// Whether the stub carries enough metadata to be scored
    pub fn has_metadata(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Fill missing fields from another description of the same paper
    pub fn absorb(&mut self, other: &PaperStub) {
        if !self.has_metadata() && other.has_metadata() {
            self.title = other.title.clone();
        }
        if self.abstract_text.is_none() {
            self.abstract_text = other.abstract_text.clone();
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.citation_count.is_none() {
            self.citation_count = other.citation_count;
        }
    }
}

/// How a paper entered the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Seed,
    ForwardCitation,
    BackwardCitation,
    CocitationStructural,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::ForwardCitation => "forward_citation",
            Self::BackwardCitation => "backward_citation",
            Self::CocitationStructural => "cocitation_structural",
        }
    }
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graph-derived flags attached at finalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperAnnotations {
    /// Among the most cited papers in the graph
    pub seminal: bool,

    /// Among the highest-betweenness papers in the co-citation projection
    pub bridging: bool,

    /// Index of the co-citation community the paper belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<usize>,
}

/// A paper tracked by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: PaperId,
    pub title: String,

    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,

    /// Relevance score in [0, 1]; unset until the paper has been scored
    pub relevance_score: Option<f64>,

    /// Round in which the paper was discovered (seeds are stage 0)
    pub discovery_stage: usize,

    pub discovery_method: DiscoveryMethod,

    #[serde(default)]
    pub annotations: PaperAnnotations,
}

impl PaperRecord {
    /// Candidate produced by expansion, not yet scored
    pub fn candidate(stub: PaperStub, stage: usize, method: DiscoveryMethod) -> Self {
        Self {
            id: stub.id,
            title: stub.title,
            abstract_text: stub.abstract_text,
            year: stub.year,
            citation_count: stub.citation_count,
            relevance_score: None,
            discovery_stage: stage,
            discovery_method: method,
            annotations: PaperAnnotations::default(),
        }
    }

    /// Seed paper: stage 0, full relevance
    pub fn seed(stub: PaperStub) -> Self {
        let mut record = Self::candidate(stub, 0, DiscoveryMethod::Seed);
        record.relevance_score = Some(1.0);
        record
    }

    /// Stub view used when asking the classifier about this paper
    pub fn to_stub(&self) -> PaperStub {
        PaperStub {
            id: self.id.clone(),
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
            year: self.year,
            citation_count: self.citation_count,
        }
    }

    /// Keep the higher of the current and offered score. Returns true if it changed.
    pub fn refresh_score(&mut self, score: Option<f64>) -> bool {
        match (self.relevance_score, score) {
            (_, None) => false,
            (None, Some(new)) => {
                self.relevance_score = Some(new);
                true
            }
            (Some(current), Some(new)) if new > current => {
                self.relevance_score = Some(new);
                true
            }
            _ => false,
        }
    }
}
