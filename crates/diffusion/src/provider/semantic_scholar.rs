//! Semantic Scholar Graph API adapter
//!
//! - `GET /paper/{ref}/citations` for forward citations
//! - `GET /paper/{ref}/references` for backward citations
//! - `POST /paper/batch` for metadata lookup
//!
//! Requests pass through a process-wide token bucket before every attempt,
//! including retries. Each attempt has its own timeout, which does not count
//! time spent waiting on the bucket. Timeouts, 429 and 5xx responses are
//! retried by the injected policy; other client errors are permanent, and a
//! 404 on a citation lookup is reported as an unknown paper.

use super::BibliographicProvider;
use crate::types::{canonical_id, PaperId, PaperStub};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use paperforge_common::config::ProviderConfig;
use paperforge_common::errors::{AppError, Result};
use paperforge_common::metrics::record_provider_call;
use paperforge_common::retry::RetryPolicy;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const PAPER_FIELDS: &str = "paperId,externalIds,title,abstract,year,citationCount";
const MAX_PAGE_LIMIT: usize = 1000;
const MAX_BATCH_IDS: usize = 500;
const SERVICE: &str = "semantic_scholar";

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Deserialize)]
struct S2Paper {
    #[serde(rename = "paperId", default)]
    paper_id: Option<String>,

    #[serde(rename = "externalIds", default)]
    external_ids: Option<HashMap<String, serde_json::Value>>,

    #[serde(default)]
    title: Option<String>,

    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,

    #[serde(default)]
    year: Option<i32>,

    #[serde(rename = "citationCount", default)]
    citation_count: Option<u64>,
}

impl S2Paper {
    /// Prefer the DOI as identity; fall back to the Semantic Scholar id
    fn into_stub(self) -> Option<PaperStub> {
        let doi = self
            .external_ids
            .as_ref()
            .and_then(|ids| ids.get("DOI"))
            .and_then(|v| v.as_str())
            .and_then(canonical_id);
        let id = doi.or_else(|| self.paper_id.as_ref().map(|p| format!("s2:{}", p)))?;

        Some(PaperStub {
            id,
            title: self.title.unwrap_or_default(),
            abstract_text: self.abstract_text,
            year: self.year,
            citation_count: self.citation_count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CitationPage {
    #[serde(default)]
    data: Option<Vec<CitationEntry>>,
}

#[derive(Debug, Deserialize)]
struct CitationEntry {
    #[serde(rename = "citingPaper", default)]
    citing_paper: Option<S2Paper>,

    #[serde(rename = "citedPaper", default)]
    cited_paper: Option<S2Paper>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    ids: &'a [String],
}

/// Semantic Scholar client
pub struct SemanticScholarProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<DirectRateLimiter>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl SemanticScholarProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            AppError::Configuration {
                message: "provider.requests_per_second must be at least 1".to_string(),
            }
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            retry: config.retry_policy(),
            attempt_timeout: config.timeout(),
        })
    }

    /// Path reference for a canonical id
    fn paper_ref(id: &str) -> String {
        if let Some(s2) = id.strip_prefix("s2:") {
            return s2.to_string();
        }
        if id.starts_with("10.") {
            return format!("DOI:{}", id);
        }
        match id.split_once(':') {
            Some((scheme, value)) => format!("{}:{}", scheme.to_uppercase(), value),
            None => id.to_string(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    /// Rate-limited, retried request decoded as JSON
    async fn call<T, F>(&self, endpoint: &'static str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        self.retry
            .run(endpoint, || {
                let request = self.authorize(build());
                async move {
                    self.limiter.until_ready().await;
                    let start = Instant::now();
                    let result = tokio::time::timeout(self.attempt_timeout, Self::send(request))
                        .await
                        .unwrap_or_else(|_| {
                            Err(AppError::UpstreamTimeout {
                                service: SERVICE.to_string(),
                                timeout_ms: self.attempt_timeout.as_millis() as u64,
                            })
                        });
                    record_provider_call(start.elapsed().as_secs_f64(), endpoint, result.is_ok());
                    result
                }
            })
            .await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited {
                service: SERVICE.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                service: SERVICE.to_string(),
                status: Some(status.as_u16()),
                message: body,
            });
        }

        response.json::<T>().await.map_err(|e| AppError::InvalidFormat {
            message: format!("Failed to parse Semantic Scholar response: {}", e),
        })
    }

    async fn citation_page(
        &self,
        id: &str,
        relation: &'static str,
        limit: usize,
    ) -> Result<Vec<CitationEntry>> {
        let url = format!("{}/paper/{}/{}", self.base_url, Self::paper_ref(id), relation);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT).to_string();

        let page: CitationPage = self
            .call(relation, || {
                self.client
                    .get(&url)
                    .query(&[("fields", PAPER_FIELDS), ("limit", limit.as_str())])
            })
            .await
            .map_err(|e| match e {
                AppError::Upstream { status: Some(404), .. } => AppError::PaperNotFound {
                    id: id.to_string(),
                },
                other => other,
            })?;

        let entries = page.data.unwrap_or_default();
        debug!(paper_id = id, relation, count = entries.len(), "Fetched citation page");
        Ok(entries)
    }
}

#[async_trait]
impl BibliographicProvider for SemanticScholarProvider {
    async fn forward_citations(&self, id: &str, limit: usize) -> Result<Vec<PaperStub>> {
        let entries = self.citation_page(id, "citations", limit).await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.citing_paper)
            .filter_map(S2Paper::into_stub)
            .collect())
    }

    async fn backward_citations(&self, id: &str, limit: usize) -> Result<Vec<PaperStub>> {
        let entries = self.citation_page(id, "references", limit).await?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.cited_paper)
            .filter_map(S2Paper::into_stub)
            .collect())
    }

    async fn batch_lookup(&self, ids: &[PaperId]) -> Result<Vec<PaperStub>> {
        let url = format!("{}/paper/batch", self.base_url);
        let mut stubs = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_BATCH_IDS) {
            let refs: Vec<String> = chunk.iter().map(|id| Self::paper_ref(id)).collect();
            let papers: Vec<Option<S2Paper>> = self
                .call("batch", || {
                    self.client
                        .post(&url)
                        .query(&[("fields", PAPER_FIELDS)])
                        .json(&BatchRequest { ids: &refs })
                })
                .await?;

            // Results are positional; keep the requested id so callers can match them up
            for (requested, paper) in chunk.iter().zip(papers) {
                if let Some(mut stub) = paper.and_then(S2Paper::into_stub) {
                    stub.id = requested.clone();
                    stubs.push(stub);
                }
            }
        }

        Ok(stubs)
    }

    fn name(&self) -> &str {
        SERVICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedResponse, ScriptedServer};

    fn local_config(server: &ScriptedServer, max_retries: u32) -> ProviderConfig {
        ProviderConfig {
            base_url: server.url(),
            timeout_secs: 1,
            max_retries,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            requests_per_second: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_paper_ref() {
        assert_eq!(SemanticScholarProvider::paper_ref("10.1000/abc"), "DOI:10.1000/abc");
        assert_eq!(SemanticScholarProvider::paper_ref("s2:649def34"), "649def34");
        assert_eq!(SemanticScholarProvider::paper_ref("arxiv:2101.00001"), "ARXIV:2101.00001");
    }

    #[test]
    fn test_stub_prefers_doi() {
        let paper: S2Paper = serde_json::from_str(
            r#"{
                "paperId": "649def34",
                "externalIds": {"DOI": "10.1000/ABC", "CorpusId": 123},
                "title": "A paper",
                "year": 2020,
                "citationCount": 12
            }"#,
        )
        .unwrap();

        let stub = paper.into_stub().unwrap();
        assert_eq!(stub.id, "10.1000/abc");
        assert_eq!(stub.title, "A paper");
        assert_eq!(stub.citation_count, Some(12));
    }

    #[test]
    fn test_stub_falls_back_to_s2_id() {
        let paper: S2Paper =
            serde_json::from_str(r#"{"paperId": "649def34", "externalIds": null, "title": null}"#).unwrap();
        let stub = paper.into_stub().unwrap();
        assert_eq!(stub.id, "s2:649def34");
        assert!(!stub.has_metadata());
    }

    #[test]
    fn test_stub_without_any_id() {
        let paper: S2Paper = serde_json::from_str(r#"{"title": "Orphan"}"#).unwrap();
        assert!(paper.into_stub().is_none());
    }

    #[test]
    fn test_citation_page_with_null_data() {
        let page: CitationPage = serde_json::from_str(r#"{"offset": 0, "data": null}"#).unwrap();
        assert!(page.data.is_none());

        let page: CitationPage = serde_json::from_str(
            r#"{"data": [{"citingPaper": {"paperId": "x1", "title": "Citer"}}]}"#,
        )
        .unwrap();
        let entries = page.data.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].cited_paper.is_none());
    }

    #[test]
    fn test_zero_rate_is_configuration_error() {
        let config = ProviderConfig {
            requests_per_second: 0,
            ..Default::default()
        };
        assert!(matches!(
            SemanticScholarProvider::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_timed_out_attempt_is_retried() {
        let server = ScriptedServer::start(vec![
            ScriptedResponse::Hang,
            ScriptedResponse::Json(
                200,
                r#"{"data": [{"citingPaper": {"paperId": "c1", "externalIds": {"DOI": "10.1000/C1"}, "title": "Citer"}}]}"#,
            ),
        ])
        .await;
        let provider = SemanticScholarProvider::new(&local_config(&server, 3)).unwrap();

        let stubs = provider.forward_citations("10.1000/seed", 10).await.unwrap();

        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].id, "10.1000/c1");
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_every_attempt_timing_out_fails_the_call() {
        let server = ScriptedServer::start(vec![ScriptedResponse::Hang]).await;
        let provider = SemanticScholarProvider::new(&local_config(&server, 1)).unwrap();

        let result = provider.backward_citations("10.1000/seed", 10).await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_unknown_paper_is_not_retried() {
        let server =
            ScriptedServer::start(vec![ScriptedResponse::Json(404, r#"{"error": "Paper not found"}"#)]).await;
        let provider = SemanticScholarProvider::new(&local_config(&server, 3)).unwrap();

        let result = provider.forward_citations("10.1000/missing", 10).await;

        assert!(matches!(
            result,
            Err(AppError::PaperNotFound { ref id }) if id == "10.1000/missing"
        ));
        assert_eq!(server.hits(), 1);
    }
}
