//! Metrics and observability utilities
//!
//! Prometheus metrics for the diffusion engine and its external collaborators,
//! using standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all PaperForge metrics
pub const METRICS_PREFIX: &str = "paperforge";

/// Buckets for provider / classifier latency (remote calls, seconds)
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Diffusion rounds
    describe_counter!(
        format!("{}_diffusion_rounds_total", METRICS_PREFIX),
        Unit::Count,
        "Total diffusion rounds executed"
    );

    describe_counter!(
        format!("{}_diffusion_candidates_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates produced by stage expansion"
    );

    describe_counter!(
        format!("{}_diffusion_accepted_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates accepted into the corpus, by method"
    );

    describe_gauge!(
        format!("{}_diffusion_coverage_delta", METRICS_PREFIX),
        Unit::Count,
        "Coverage delta of the most recent round"
    );

    describe_counter!(
        format!("{}_diffusion_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Completed diffusion runs, by termination reason"
    );

    describe_gauge!(
        format!("{}_diffusion_final_corpus_size", METRICS_PREFIX),
        Unit::Count,
        "Size of the last finalized corpus"
    );

    // Provider
    describe_counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Bibliographic provider requests"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Bibliographic provider latency in seconds"
    );

    // Classifier
    describe_counter!(
        format!("{}_classifier_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Relevance classifier batch requests"
    );

    describe_histogram!(
        format!("{}_classifier_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Relevance classifier latency in seconds"
    );

    describe_counter!(
        format!("{}_classifier_rejections_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates rejected because scoring failed"
    );

    // Queue
    describe_counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total queue messages processed"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record a closed diffusion round
pub fn record_round(
    candidate_count: usize,
    structural_accepts: usize,
    semantic_accepts: usize,
    coverage_delta: f64,
) {
    counter!(format!("{}_diffusion_rounds_total", METRICS_PREFIX)).increment(1);

    counter!(format!("{}_diffusion_candidates_total", METRICS_PREFIX))
        .increment(candidate_count as u64);

    counter!(
        format!("{}_diffusion_accepted_total", METRICS_PREFIX),
        "method" => "structural"
    )
    .increment(structural_accepts as u64);

    counter!(
        format!("{}_diffusion_accepted_total", METRICS_PREFIX),
        "method" => "semantic"
    )
    .increment(semantic_accepts as u64);

    gauge!(format!("{}_diffusion_coverage_delta", METRICS_PREFIX)).set(coverage_delta);
}

/// Helper to record a finished run
pub fn record_run(termination: &str, final_corpus_size: usize) {
    counter!(
        format!("{}_diffusion_runs_total", METRICS_PREFIX),
        "termination" => termination.to_string()
    )
    .increment(1);

    gauge!(format!("{}_diffusion_final_corpus_size", METRICS_PREFIX))
        .set(final_corpus_size as f64);
}

/// Helper to record a provider request
pub fn record_provider_call(duration_secs: f64, endpoint: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_provider_requests_total", METRICS_PREFIX),
        "endpoint" => endpoint.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a classifier batch request
pub fn record_classifier_call(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_classifier_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_classifier_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }

    tracing::trace!(model, batch_size, success, "Classifier call recorded");
}

/// Helper to record candidates rejected because scoring failed
pub fn record_classifier_rejections(count: usize) {
    if count > 0 {
        counter!(format!("{}_classifier_rejections_total", METRICS_PREFIX))
            .increment(count as u64);
    }
}

/// Helper to record a processed queue message
pub fn record_queue_message(queue: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_queue_messages_processed_total", METRICS_PREFIX),
        "queue" => queue.to_string(),
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in UPSTREAM_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: every helper must be a silent no-op
        record_round(10, 2, 3, 0.5);
        record_run("saturated", 42);
        record_provider_call(0.1, "citations", true);
        record_classifier_call(0.2, "mock", 5, false);
        record_classifier_rejections(2);
        record_queue_message("jobs", true);
    }
}
