// src/selector/fastest.rs
use crate::cache::{CacheManager, CachePutOptions};
use crate::config::ProxySettings;
use crate::health::HealthProber;
use crate::metrics::MetricsCollector;
use crate::target::{resolve_cached, Target};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    /// Remembered selection still present in the configured targets.
    Cache,
    /// Winner of a fresh probe race.
    Probe,
    /// First configured target; nothing better was known.
    Default,
}

#[derive(Debug, Clone, Copy)]
pub struct Selected<'a> {
    pub target: &'a Target,
    pub source: SelectionSource,
}

/// Picks the primary target for a request from the cached selection or a
/// fresh probe race.
#[derive(Clone)]
pub struct FastestSelector {
    prober: HealthProber,
    metrics: Option<Arc<MetricsCollector>>,
}

impl FastestSelector {
    pub fn new(prober: HealthProber, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self { prober, metrics }
    }

    /// Returns `None` only when `targets` is empty.
    ///
    /// Without a cache the first target is used and no probe is sent. A probe
    /// winner is remembered in the background; the default fallback never is.
    pub async fn select<'a>(
        &self,
        targets: &'a [Target],
        settings: &ProxySettings,
        cache: Option<&CacheManager>,
    ) -> Option<Selected<'a>> {
        let first = targets.first()?;

        let Some(cache) = cache else {
            self.record_lookup("disabled");
            return Some(Selected {
                target: first,
                source: SelectionSource::Default,
            });
        };

        let key = settings.cache_key();
        let options = CachePutOptions::ttl(settings.cache_ttl_secs());

        match cache.get(&key, options).await {
            Some(cached) => match resolve_cached(&cached, targets) {
                Some(target) => {
                    self.record_lookup("hit");
                    debug!("Using cached fastest target {}", target.normalized);
                    return Some(Selected {
                        target,
                        source: SelectionSource::Cache,
                    });
                }
                None => {
                    self.record_lookup("stale");
                    debug!("Cached target {} is no longer configured", cached);
                }
            },
            None => self.record_lookup("miss"),
        }

        let probed = self
            .prober
            .probe(targets, &settings.health_path(), settings.health_timeout_ms())
            .await;

        match probed {
            Some(target) => {
                cache.put_detached(&key, &target.normalized, options);
                Some(Selected {
                    target,
                    source: SelectionSource::Probe,
                })
            }
            None => Some(Selected {
                target: first,
                source: SelectionSource::Default,
            }),
        }
    }

    fn record_lookup(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(result);
        }
    }
}
