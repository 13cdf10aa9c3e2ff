//! Bibliographic provider abstraction
//!
//! The engine only needs three things from a bibliographic source: who cites
//! a paper, what a paper cites, and metadata for a list of ids. Adapters own
//! their transport, rate limiting, per-attempt timeouts and retries; the
//! engine treats any error that comes back as a failed call.

mod semantic_scholar;

pub use semantic_scholar::SemanticScholarProvider;

use crate::types::{PaperId, PaperStub};
use async_trait::async_trait;
use paperforge_common::config::ProviderConfig;
use paperforge_common::errors::Result;
use std::sync::Arc;

/// Trait for citation data sources
#[async_trait]
pub trait BibliographicProvider: Send + Sync {
    /// Papers citing `id` (forward in time), at most `limit`
    async fn forward_citations(&self, id: &str, limit: usize) -> Result<Vec<PaperStub>>;

    /// Papers `id` cites (its reference list), at most `limit`
    async fn backward_citations(&self, id: &str, limit: usize) -> Result<Vec<PaperStub>>;

    /// Metadata for the given ids. Unknown ids are omitted from the result.
    async fn batch_lookup(&self, ids: &[PaperId]) -> Result<Vec<PaperStub>>;

    /// Name used in logs and timeout errors
    fn name(&self) -> &str;
}

/// Create the configured provider
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn BibliographicProvider>> {
    Ok(Arc::new(SemanticScholarProvider::new(config)?))
}
