//! Prometheus metrics for sahayak-service.
//!
//! Provides HTTP endpoint and model-provider metrics for observability.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{Once, OnceLock};

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Endpoint metrics
pub static SAHAYAK_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SAHAYAK_UPLOAD_BYTES: OnceLock<HistogramVec> = OnceLock::new();

// Provider metrics
pub static GENAI_PROVIDER_ATTEMPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static GENAI_PROVIDER_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static GENAI_TOKENS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

static INIT: Once = Once::new();

/// Initialize all metrics. Safe to call more than once; later calls are no-ops.
pub fn init_metrics() {
    INIT.call_once(register_metrics);
}

fn register_metrics() {
    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("sahayak_requests_total", "Total generation requests by endpoint"),
        &["endpoint", "outcome"],
    )
    .expect("Failed to create sahayak_requests_total metric");

    let upload_bytes = HistogramVec::new(
        HistogramOpts::new("sahayak_upload_bytes", "Size of analysed images in bytes").buckets(
            vec![
                16_384.0,
                65_536.0,
                262_144.0,
                1_048_576.0,
                4_194_304.0,
                10_485_760.0,
            ],
        ),
        &["source"],
    )
    .expect("Failed to create sahayak_upload_bytes metric");

    let provider_attempts = IntCounterVec::new(
        Opts::new(
            "genai_provider_attempts_total",
            "Upstream model attempts by outcome",
        ),
        &["model", "outcome"],
    )
    .expect("Failed to create genai_provider_attempts_total metric");

    let provider_latency = HistogramVec::new(
        HistogramOpts::new(
            "genai_provider_latency_seconds",
            "AI provider API latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["model"],
    )
    .expect("Failed to create genai_provider_latency_seconds metric");

    let tokens_total = IntCounterVec::new(
        Opts::new("genai_tokens_total", "Total tokens processed"),
        &["model", "type"], // type: input, output
    )
    .expect("Failed to create genai_tokens_total metric");

    registry
        .register(Box::new(requests_total.clone()))
        .expect("Failed to register sahayak_requests_total");
    registry
        .register(Box::new(upload_bytes.clone()))
        .expect("Failed to register sahayak_upload_bytes");
    registry
        .register(Box::new(provider_attempts.clone()))
        .expect("Failed to register genai_provider_attempts_total");
    registry
        .register(Box::new(provider_latency.clone()))
        .expect("Failed to register genai_provider_latency_seconds");
    registry
        .register(Box::new(tokens_total.clone()))
        .expect("Failed to register genai_tokens_total");

    let _ = REGISTRY.set(registry);
    let _ = SAHAYAK_REQUESTS_TOTAL.set(requests_total);
    let _ = SAHAYAK_UPLOAD_BYTES.set(upload_bytes);
    let _ = GENAI_PROVIDER_ATTEMPTS_TOTAL.set(provider_attempts);
    let _ = GENAI_PROVIDER_LATENCY_SECONDS.set(provider_latency);
    let _ = GENAI_TOKENS_TOTAL.set(tokens_total);

    tracing::info!("Prometheus metrics initialized");
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

// Helper functions for recording metrics

/// Record the outcome of an endpoint call.
pub fn record_request(endpoint: &str, outcome: &str) {
    if let Some(counter) = SAHAYAK_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[endpoint, outcome]).inc();
    }
}

/// Record the size of an image accepted for analysis.
pub fn record_upload_bytes(source: &str, bytes: usize) {
    if let Some(histogram) = SAHAYAK_UPLOAD_BYTES.get() {
        histogram
            .with_label_values(&[source])
            .observe(bytes as f64);
    }
}

/// Record one upstream attempt.
pub fn record_provider_attempt(model: &str, outcome: &str) {
    if let Some(counter) = GENAI_PROVIDER_ATTEMPTS_TOTAL.get() {
        counter.with_label_values(&[model, outcome]).inc();
    }
}

/// Record provider latency.
pub fn record_provider_latency(model: &str, duration_secs: f64) {
    if let Some(histogram) = GENAI_PROVIDER_LATENCY_SECONDS.get() {
        histogram.with_label_values(&[model]).observe(duration_secs);
    }
}

/// Record token usage.
pub fn record_tokens(model: &str, input_tokens: i32, output_tokens: i32) {
    if let Some(counter) = GENAI_TOKENS_TOTAL.get() {
        counter
            .with_label_values(&[model, "input"])
            .inc_by(input_tokens.max(0) as u64);
        counter
            .with_label_values(&[model, "output"])
            .inc_by(output_tokens.max(0) as u64);
    }
}
