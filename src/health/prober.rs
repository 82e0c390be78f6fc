// src/health/prober.rs
use crate::metrics::MetricsCollector;
use crate::target::Target;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::{header, redirect, Client};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

/// Error recorded for a target whose health check outlived its deadline.
pub const HEALTH_TIMEOUT_ERROR: &str = "Health check timed out";

/// Outcome of a single liveness check.
#[derive(Debug)]
pub struct ProbeResult<'a> {
    pub target: &'a Target,
    pub healthy: bool,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Races health checks against every target and ranks them by latency.
#[derive(Clone)]
pub struct HealthProber {
    client: Client,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthProber {
    pub fn new(metrics: Option<Arc<MetricsCollector>>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { client, metrics })
    }

    /// Lowest-latency healthy target, or `None` when nothing answered in time.
    /// Exact latency ties go to the probe that settled first.
    pub async fn probe<'a>(
        &self,
        targets: &'a [Target],
        health_path: &str,
        timeout_ms: u64,
    ) -> Option<&'a Target> {
        let results = self.probe_all(targets, health_path, timeout_ms).await;

        let mut best: Option<&ProbeResult<'a>> = None;
        for result in results.iter().filter(|r| r.healthy) {
            if best.map_or(true, |b| result.latency < b.latency) {
                best = Some(result);
            }
        }

        match best {
            Some(winner) => {
                info!(
                    "Fastest target {} ({:?}), {}/{} healthy",
                    winner.target.normalized,
                    winner.latency,
                    results.iter().filter(|r| r.healthy).count(),
                    results.len()
                );
                Some(winner.target)
            }
            None => {
                info!("No healthy target among {} probed", results.len());
                None
            }
        }
    }

    /// Probe every target concurrently. Results are in settle order.
    pub async fn probe_all<'a>(
        &self,
        targets: &'a [Target],
        health_path: &str,
        timeout_ms: u64,
    ) -> Vec<ProbeResult<'a>> {
        let limit = Duration::from_millis(timeout_ms);
        let mut pending: FuturesUnordered<_> = targets
            .iter()
            .map(|target| self.check_target(target, health_path, limit))
            .collect();

        let mut results = Vec::with_capacity(targets.len());
        while let Some(result) = pending.next().await {
            results.push(result);
        }
        results
    }

    async fn check_target<'a>(
        &self,
        target: &'a Target,
        health_path: &str,
        limit: Duration,
    ) -> ProbeResult<'a> {
        let url = target.url_for(health_path, None);
        let start = Instant::now();

        let result = timeout(
            limit,
            self.client
                .get(url.as_str())
                .header(header::CACHE_CONTROL, "no-store")
                .send(),
        )
        .await;

        let latency = start.elapsed();

        // Any answer below 500 proves the origin is reachable.
        let (healthy, error) = match result {
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                if (200..500).contains(&status) {
                    (true, None)
                } else {
                    (false, Some(format!("HTTP {}", status)))
                }
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some(HEALTH_TIMEOUT_ERROR.to_string())),
        };

        debug!(
            upstream = %target.normalized,
            healthy,
            ?latency,
            error = error.as_deref().unwrap_or(""),
            "Probe settled"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_probe(&target.normalized, healthy, latency);
        }

        ProbeResult {
            target,
            healthy,
            latency,
            error,
        }
    }
}
