//! Prometheus metrics for the registry server

use anyhow::Result;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus metrics collector for registry operations
#[derive(Clone)]
pub struct RegistryMetrics {
    /// Registry requests by operation and outcome
    pub requests_total: CounterVec,
    /// Registry request handling time in seconds
    pub request_duration_seconds: HistogramVec,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl RegistryMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = CounterVec::new(
            Opts::new("registry_requests_total", "Total registry requests"),
            &["operation", "outcome"],
        )?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "registry_request_duration_seconds",
                "Registry request latency in seconds",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            registry,
        })
    }

    /// Record one handled operation
    pub fn observe(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.requests_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
