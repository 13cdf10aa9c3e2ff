//! PaperForge Diffusion Worker
//!
//! Processes diffusion jobs from SQS queue:
//! 1. Receives a topic and seed papers from the job queue
//! 2. Expands the corpus round by round until termination
//! 3. Publishes the finalized corpus to the result queue

use metrics_exporter_prometheus::PrometheusBuilder;
use paperforge_common::{
    config::AppConfig,
    metrics::{record_queue_message, register_metrics, UPSTREAM_BUCKETS},
    queue::{Queue, QueueConfig},
    VERSION,
};
use paperforge_diffusion::{
    create_classifier, create_provider,
    worker::{DiffusionJob, DiffusionWorker},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_FAILURES: u32 = 5;
const CIRCUIT_BREAK_DURATION: Duration = Duration::from_secs(30);
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting PaperForge Diffusion Worker v{}", VERSION);

    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets(UPSTREAM_BUCKETS)?
            .install()?;
        info!(%addr, "Metrics exporter listening");
    }
    register_metrics();

    config.diffusion.ensure_valid()?;
    let provider = create_provider(&config.provider)?;
    let classifier = create_classifier(&config.classifier)?;
    info!(
        provider = provider.name(),
        classifier = classifier.model_name(),
        "Collaborators initialized"
    );

    let worker = DiffusionWorker::new(provider, classifier, config.diffusion.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_shutdown(shutdown.clone()));

    let Some(job_url) = config.queue.job_queue_url.clone() else {
        warn!("Job queue URL not set, waiting for shutdown signal...");
        shutdown.cancelled().await;
        info!("Diffusion worker shutting down");
        return Ok(());
    };
    let result_url = config
        .queue
        .result_queue_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("result queue URL must be set alongside the job queue"))?;

    info!(url = %job_url, "Connecting to job queue...");
    let jobs = Queue::new(QueueConfig {
        url: job_url,
        dlq_url: config.queue.dlq_url.clone(),
        visibility_timeout: config.queue.visibility_timeout_secs,
        wait_time_seconds: config.queue.poll_timeout_secs,
        max_messages: config.queue.batch_size,
    })
    .await?;
    let results = Queue::new(QueueConfig {
        url: result_url,
        ..Default::default()
    })
    .await?;

    info!("Diffusion worker ready, starting queue polling...");

    let mut consecutive_failures = 0;

    loop {
        if consecutive_failures >= MAX_FAILURES {
            warn!(
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(CIRCUIT_BREAK_DURATION) => {}
            }
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        let received = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown signal received");
                break;
            }
            result = jobs.receive::<DiffusionJob>() => result,
        };

        let messages = match received {
            Ok(messages) => messages,
            Err(e) => {
                consecutive_failures += 1;
                error!(error = %e, "Failed to receive messages from queue");
                tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                continue;
            }
        };

        for message in messages {
            let job = message.body;
            let job_id = job.job_id;
            info!(job_id = %job_id, seeds = job.seeds.len(), "Received diffusion job");

            let result = match worker.process_job(job, &shutdown).await {
                Ok(result) => result,
                Err(e) => {
                    consecutive_failures += 1;
                    record_queue_message("jobs", false);
                    error!(
                        job_id = %job_id,
                        error = %e,
                        failures = consecutive_failures,
                        "Failed to process diffusion job"
                    );
                    // Message will be re-delivered or moved to DLQ
                    continue;
                }
            };

            if let Err(e) = results.send(&result).await {
                consecutive_failures += 1;
                record_queue_message("results", false);
                error!(job_id = %job_id, error = %e, "Failed to publish diffusion result");
                continue;
            }
            record_queue_message("results", true);

            consecutive_failures = 0;
            record_queue_message("jobs", true);
            if let Err(e) = jobs.delete(&message.receipt_handle).await {
                error!(job_id = %job_id, error = %e, "Failed to delete message");
            }
        }

        if shutdown.is_cancelled() {
            break;
        }
    }

    info!("Diffusion worker shutting down");
    Ok(())
}

/// Cancel `token` on ctrl-c or SIGTERM
async fn watch_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    token.cancel();
}
