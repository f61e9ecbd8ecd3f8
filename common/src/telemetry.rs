// Telemetry module for structured logging, metrics, and tracing

use crate::config::LogFormat;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};
use uuid::Uuid;

const SERVICE_NAME: &str = "job-scheduler";

/// Initialize structured logging
///
/// Sets up the tracing subscriber with:
/// - JSON or human-readable formatting
/// - Log levels from `RUST_LOG` or the configured level
/// - Optional OpenTelemetry export when an endpoint is configured
pub fn init_logging(
    log_level: &str,
    format: LogFormat,
    tracing_endpoint: Option<&str>,
) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
    };

    let registry = tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter));

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        log_format = ?format,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint = endpoint, "OpenTelemetry tracer initialized");

    Ok(tracer)
}

/// Flush remaining spans on graceful shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Initialize Prometheus metrics exporter and describe the scheduler metrics
#[tracing::instrument]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "job_success_total",
        "Total number of successful job executions"
    );
    describe_counter!("job_failed_total", "Total number of failed job executions");
    describe_counter!(
        "job_skipped_total",
        "Firings rejected because the concurrency limit was reached"
    );
    describe_histogram!(
        "job_duration_seconds",
        "Duration of job executions in seconds"
    );
    describe_gauge!("jobs_running", "Number of job executions currently in flight");
    describe_gauge!("jobs_scheduled", "Number of jobs with a live trigger");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_job_success(job_id: &Uuid, job_name: &str) {
    counter!("job_success_total", "job_id" => job_id.to_string(), "job_name" => job_name.to_string()).increment(1);
}

/// Increment job_failed_total, labelled with a short failure reason
#[inline]
pub fn record_job_failure(job_id: &Uuid, job_name: &str, reason: &str) {
    counter!(
        "job_failed_total",
        "job_id" => job_id.to_string(),
        "job_name" => job_name.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Increment job_skipped_total for a firing rejected at admission
#[inline]
pub fn record_job_skipped(job_id: &Uuid, job_name: &str) {
    counter!("job_skipped_total", "job_id" => job_id.to_string(), "job_name" => job_name.to_string()).increment(1);
}

#[inline]
pub fn record_job_duration(job_id: &Uuid, job_name: &str, duration_seconds: f64) {
    histogram!(
        "job_duration_seconds",
        "job_id" => job_id.to_string(),
        "job_name" => job_name.to_string()
    )
    .record(duration_seconds);
}

#[inline]
pub fn update_running_jobs(count: usize) {
    gauge!("jobs_running").set(count as f64);
}

#[inline]
pub fn update_scheduled_jobs(count: usize) {
    gauge!("jobs_scheduled").set(count as f64);
}
