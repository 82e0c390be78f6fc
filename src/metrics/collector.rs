// src/metrics/collector.rs
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Result;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

pub struct MetricsCollector {
    // Client-facing requests
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,

    // Upstream attempts
    pub upstream_attempts_total: IntCounterVec,
    pub upstream_duration_seconds: HistogramVec,

    // Fastest-target cache
    pub cache_lookups_total: IntCounterVec,

    // Health probes
    pub probes_total: IntCounterVec,
    pub probe_duration_seconds: HistogramVec,
    pub target_health_status: IntGaugeVec,

    pub configured_targets: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("proxy_requests_total", "Total number of proxied requests"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "proxy_request_duration_seconds",
                "Request duration in seconds, including failover",
            ),
            &["method"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let upstream_attempts_total = IntCounterVec::new(
            Opts::new("proxy_upstream_attempts_total", "Upstream attempts by outcome"),
            &["target", "outcome"],
        )?;
        registry.register(Box::new(upstream_attempts_total.clone()))?;

        let upstream_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "proxy_upstream_duration_seconds",
                "Upstream attempt duration in seconds",
            ),
            &["target"],
        )?;
        registry.register(Box::new(upstream_duration_seconds.clone()))?;

        let cache_lookups_total = IntCounterVec::new(
            Opts::new(
                "proxy_cache_lookups_total",
                "Fastest-target cache lookups (hit, miss, stale, disabled)",
            ),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups_total.clone()))?;

        let probes_total = IntCounterVec::new(
            Opts::new("proxy_probes_total", "Health probes by result"),
            &["target", "healthy"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new("proxy_probe_duration_seconds", "Health probe latency")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["target"],
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let target_health_status = IntGaugeVec::new(
            Opts::new(
                "proxy_target_health_status",
                "Last probe result per target (1=healthy, 0=unhealthy)",
            ),
            &["target"],
        )?;
        registry.register(Box::new(target_health_status.clone()))?;

        let configured_targets =
            IntGauge::new("proxy_configured_targets", "Targets in the current configuration")?;
        registry.register(Box::new(configured_targets.clone()))?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            upstream_attempts_total,
            upstream_duration_seconds,
            cache_lookups_total,
            probes_total,
            probe_duration_seconds,
            target_health_status,
            configured_targets,
        })
    }

    pub fn record_request(&self, method: &str, status_code: u16, duration: Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration.as_secs_f64());
    }

    pub fn record_upstream_attempt(&self, target: &str, outcome: &str, duration: Duration) {
        self.upstream_attempts_total
            .with_label_values(&[target, outcome])
            .inc();

        self.upstream_duration_seconds
            .with_label_values(&[target])
            .observe(duration.as_secs_f64());
    }

    pub fn record_cache_lookup(&self, result: &str) {
        self.cache_lookups_total.with_label_values(&[result]).inc();
    }

    pub fn record_probe(&self, target: &str, healthy: bool, latency: Duration) {
        let label = if healthy { "true" } else { "false" };
        self.probes_total.with_label_values(&[target, label]).inc();
        self.probe_duration_seconds
            .with_label_values(&[target])
            .observe(latency.as_secs_f64());
        self.target_health_status
            .with_label_values(&[target])
            .set(if healthy { 1 } else { 0 });
    }

    pub fn update_target_count(&self, total: usize) {
        self.configured_targets.set(total as i64);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
