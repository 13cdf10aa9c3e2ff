//! Diffusion job processor
//!
//! Turns a queued job (topic plus seed papers) into a finalized corpus ready
//! to be published on the result queue.

use crate::classifier::RelevanceClassifier;
use crate::controller::{DiffusionOutcome, TerminationReason};
use crate::graph::GraphSummary;
use crate::provider::BibliographicProvider;
use crate::round::DiffusionRound;
use crate::run_diffusion;
use crate::types::{PaperRecord, PaperStub};
use chrono::{DateTime, Utc};
use paperforge_common::config::DiffusionConfig;
use paperforge_common::errors::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use uuid::Uuid;

/// Message received from the job queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffusionJob {
    pub job_id: Uuid,
    pub topic: String,
    pub seeds: Vec<PaperStub>,
    /// Per-job overrides; the worker's defaults apply when absent
    #[serde(default)]
    pub config: Option<DiffusionConfig>,
}

/// Message published to the result queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffusionJobResult {
    pub job_id: Uuid,
    pub topic: String,
    pub termination: TerminationReason,
    pub final_corpus: Vec<PaperRecord>,
    pub graph_summary: GraphSummary,
    pub rounds: Vec<DiffusionRound>,
    pub completed_at: DateTime<Utc>,
}

impl DiffusionJobResult {
    fn from_outcome(job_id: Uuid, topic: String, outcome: DiffusionOutcome) -> Self {
        Self {
            job_id,
            topic,
            termination: outcome.termination,
            final_corpus: outcome.final_corpus,
            graph_summary: outcome.graph_summary,
            rounds: outcome.rounds,
            completed_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Diffusion failed: {0}")]
    Diffusion(#[from] AppError),

    /// Shutdown arrived mid-run; the job should be redelivered
    #[error("Job interrupted by shutdown")]
    Interrupted,
}

/// Diffusion worker processor
pub struct DiffusionWorker {
    provider: Arc<dyn BibliographicProvider>,
    classifier: Arc<dyn RelevanceClassifier>,
    defaults: DiffusionConfig,
}

impl DiffusionWorker {
    pub fn new(
        provider: Arc<dyn BibliographicProvider>,
        classifier: Arc<dyn RelevanceClassifier>,
        defaults: DiffusionConfig,
    ) -> Self {
        Self {
            provider,
            classifier,
            defaults,
        }
    }

    /// Process a diffusion job
    #[instrument(skip(self, job, cancel), fields(job_id = %job.job_id))]
    pub async fn process_job(
        &self,
        job: DiffusionJob,
        cancel: &CancellationToken,
    ) -> Result<DiffusionJobResult, WorkerError> {
        if job.seeds.is_empty() {
            return Err(WorkerError::InvalidJob("job has no seed papers".to_string()));
        }

        info!(
            topic = %job.topic,
            seeds = job.seeds.len(),
            custom_config = job.config.is_some(),
            "Processing diffusion job"
        );

        let config = job.config.unwrap_or_else(|| self.defaults.clone());
        let outcome = run_diffusion(
            &job.topic,
            job.seeds,
            config,
            self.provider.clone(),
            self.classifier.clone(),
            cancel,
        )
        .await?;

        if outcome.termination == TerminationReason::Cancelled {
            return Err(WorkerError::Interrupted);
        }

        info!(
            termination = outcome.termination.as_str(),
            papers = outcome.final_corpus.len(),
            rounds = outcome.rounds.len(),
            "Diffusion job completed"
        );

        Ok(DiffusionJobResult::from_outcome(job.job_id, job.topic, outcome))
    }
}
