//! In-memory provider and classifier doubles for engine tests

use crate::classifier::RelevanceClassifier;
use crate::provider::BibliographicProvider;
use crate::types::{PaperId, PaperStub};
use async_trait::async_trait;
use paperforge_common::errors::{AppError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub fn stub(id: &str) -> PaperStub {
    PaperStub::new(id, format!("Paper {}", id))
}

/// Citation data keyed by paper id
#[derive(Default)]
pub struct MockProvider {
    forward: HashMap<PaperId, Vec<PaperStub>>,
    backward: HashMap<PaperId, Vec<PaperStub>>,
    metadata: HashMap<PaperId, PaperStub>,
    failing: HashSet<PaperId>,
    calls: Mutex<HashMap<PaperId, usize>>,
    lookups: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward citations only, without the mirrored reference
    pub fn cited_by(mut self, paper: &str, citers: Vec<PaperStub>) -> Self {
        self.forward.entry(paper.to_string()).or_default().extend(citers);
        self
    }

    pub fn references(mut self, paper: &str, refs: Vec<PaperStub>) -> Self {
        self.backward.entry(paper.to_string()).or_default().extend(refs);
        self
    }

    pub fn with_metadata(mut self, stub: PaperStub) -> Self {
        self.metadata.insert(stub.id.clone(), stub);
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Number of citation fetches (either direction) for `id`
    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn fetch(&self, id: &str, table: &HashMap<PaperId, Vec<PaperStub>>, limit: usize) -> Result<Vec<PaperStub>> {
        *self.calls.lock().unwrap().entry(id.to_string()).or_default() += 1;
        if self.failing.contains(id) {
            return Err(AppError::Upstream {
                service: "mock".to_string(),
                status: Some(503),
                message: format!("unavailable: {}", id),
            });
        }
        Ok(table
            .get(id)
            .map(|stubs| stubs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl BibliographicProvider for MockProvider {
    async fn forward_citations(&self, id: &str, limit: usize) -> Result<Vec<PaperStub>> {
        self.fetch(id, &self.forward, limit).await
    }

    async fn backward_citations(&self, id: &str, limit: usize) -> Result<Vec<PaperStub>> {
        self.fetch(id, &self.backward, limit).await
    }

    async fn batch_lookup(&self, ids: &[PaperId]) -> Result<Vec<PaperStub>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(ids.iter().filter_map(|id| self.metadata.get(id).cloned()).collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Scores looked up per id, with a default for unknown ids
pub struct MockClassifier {
    scores: HashMap<PaperId, f64>,
    default_score: f64,
    /// Any batch containing one of these ids fails
    poison: HashSet<PaperId>,
    fail_all: bool,
    batches: AtomicUsize,
    scored: Mutex<HashMap<PaperId, usize>>,
}

impl MockClassifier {
    pub fn new(default_score: f64) -> Self {
        Self {
            scores: HashMap::new(),
            default_score,
            poison: HashSet::new(),
            fail_all: false,
            batches: AtomicUsize::new(0),
            scored: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::new(0.0)
        }
    }

    pub fn score(mut self, id: &str, score: f64) -> Self {
        self.scores.insert(id.to_string(), score);
        self
    }

    pub fn poison(mut self, id: &str) -> Self {
        self.poison.insert(id.to_string());
        self
    }

    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// How many times `id` was part of a successfully scored batch
    pub fn times_scored(&self, id: &str) -> usize {
        self.scored.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn was_asked_about(&self, id: &str) -> bool {
        self.times_scored(id) > 0
    }
}

#[async_trait]
impl RelevanceClassifier for MockClassifier {
    async fn score_batch(&self, _topic: &str, candidates: &[PaperStub]) -> Result<Vec<f64>> {
        self.batches.fetch_add(1, Ordering::SeqCst);

        if self.fail_all || candidates.iter().any(|c| self.poison.contains(&c.id)) {
            return Err(AppError::Classifier {
                message: "mock classifier failure".to_string(),
            });
        }

        let mut scored = self.scored.lock().unwrap();
        Ok(candidates
            .iter()
            .map(|c| {
                *scored.entry(c.id.clone()).or_default() += 1;
                self.scores.get(&c.id).copied().unwrap_or(self.default_score)
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-classifier"
    }
}

/// What the scripted server does with one connection
#[derive(Debug, Clone, Copy)]
pub enum ScriptedResponse {
    /// Read the request and never answer
    Hang,
    Json(u16, &'static str),
}

/// Local HTTP server answering connection `n` with script entry `n`.
/// The last entry repeats once the script runs out.
pub struct ScriptedServer {
    addr: std::net::SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl ScriptedServer {
    pub async fn start(script: Vec<ScriptedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let step = script[n.min(script.len() - 1)];
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let _ = socket.read(&mut buf).await;
                    match step {
                        ScriptedResponse::Hang => {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        ScriptedResponse::Json(status, body) => {
                            let response = format!(
                                "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                                status,
                                body.len(),
                                body
                            );
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        }
                    }
                });
            }
        });

        Self { addr, hits }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Connections accepted so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
