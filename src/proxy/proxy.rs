// ────────────────────────────────
// src/proxy/proxy.rs
// Entry point: target selection, forwarding and failure responses
// ────────────────────────────────

use super::forwarder::Forwarder;
use crate::cache::{CacheManager, CachePutOptions, KvBindings, MemoryCacheAdapter};
use crate::config::{ProxySettings, TARGETS_ENV_NAME};
use crate::health::HealthProber;
use crate::metrics::{MetricsCollector, Timer};
use crate::retry::RetryPolicy;
use crate::selector::FastestSelector;
use crate::target::parse_targets;
use crate::tasks::BackgroundTasks;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub struct Proxy {
    settings: ProxySettings,
    memory: Arc<MemoryCacheAdapter>,
    bindings: KvBindings,
    selector: FastestSelector,
    forwarder: Forwarder,
    tasks: BackgroundTasks,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(
        settings: ProxySettings,
        bindings: KvBindings,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self, ProxyError> {
        let prober = HealthProber::new(metrics.clone()).map_err(ProxyError::Client)?;

        Ok(Self {
            settings,
            memory: Arc::new(MemoryCacheAdapter::new()),
            bindings,
            selector: FastestSelector::new(prober, metrics.clone()),
            forwarder: Forwarder::new(metrics.clone()),
            tasks: BackgroundTasks::new(),
            metrics,
        })
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// Process-wide in-memory cache tier.
    pub fn memory_cache(&self) -> &Arc<MemoryCacheAdapter> {
        &self.memory
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Proxy with the settings given at construction time.
    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        self.proxy_fetch(req, &self.settings).await
    }

    /// Like [`Proxy::handle`] but always produces a response. Each call runs
    /// in its own request span.
    pub async fn respond(&self, req: Request<Body>) -> Response<Body> {
        let span = info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %req.method(),
            path = %req.uri().path()
        );

        async move {
            let method = req.method().clone();
            let timer = Timer::new();

            let response = match self.handle(req).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Proxy error: {}", e);
                    e.into()
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics.record_request(method.as_str(), response.status().as_u16(), timer.elapsed());
            }
            debug!(status = response.status().as_u16(), elapsed = ?timer.elapsed(), "Request done");
            response
        }
        .instrument(span)
        .await
    }

    /// Forward one request using `settings` as this invocation's configuration.
    pub async fn proxy_fetch(
        &self,
        req: Request<Body>,
        settings: &ProxySettings,
    ) -> Result<Response<Body>, ProxyError> {
        let raw = settings
            .raw_targets()
            .ok_or_else(|| ProxyError::MissingTargets(TARGETS_ENV_NAME.to_string()))?;
        let targets = parse_targets(raw);

        if let Some(metrics) = &self.metrics {
            metrics.update_target_count(targets.len());
        }

        let cache = CacheManager::from_settings(
            settings,
            &self.memory,
            &self.bindings,
            self.tasks.clone(),
        );

        let selected = self
            .selector
            .select(&targets, settings, cache.as_ref())
            .await
            .ok_or(ProxyError::NoTargets)?;
        debug!(
            primary = %selected.target.normalized,
            source = ?selected.source,
            "Selected primary target"
        );

        let policy = RetryPolicy::from_settings(settings);
        let forwarded = self
            .forwarder
            .forward(req, selected.target, &targets, &policy)
            .await?;

        // Only the primary answering well on the first try refreshes the cache.
        if forwarded.attempt == 0 && !forwarded.response.status().is_server_error() {
            if let Some(cache) = &cache {
                cache.put_detached(
                    &settings.cache_key(),
                    &forwarded.target.normalized,
                    CachePutOptions::ttl(settings.cache_ttl_secs()),
                );
            }
        }

        Ok(forwarded.response)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Missing env: {0}")]
    MissingTargets(String),

    #[error("No proxy targets available")]
    NoTargets,

    #[error("{0}")]
    UpstreamFailed(String),

    #[error("Failed to read request body: {0}")]
    RequestBody(#[source] hyper::Error),

    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTargets(_) | ProxyError::NoTargets | ProxyError::Client(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::UpstreamFailed(_) => StatusCode::BAD_GATEWAY,
            ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
        }
    }
}

// Convert ProxyError to a plain-text response for the client
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let status = err.status();
        let mut response = Response::new(Body::from(err.to_string()));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
