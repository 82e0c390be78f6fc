// src/proxy/forwarder.rs
use super::proxy::ProxyError;
use crate::metrics::{MetricsCollector, Timer};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::target::Target;
use futures::stream::{self, StreamExt};
use hyper::body::{Bytes, HttpBody};
use hyper::client::HttpConnector;
use hyper::header::HOST;
use hyper::http::request::Parts;
use hyper::{Body, Client, Request, Response};
use hyper_tls::HttpsConnector;
use std::sync::Arc;
use tracing::{debug, warn};

const FALLBACK_ERROR: &str = "Upstream fetch failed";

/// Largest inbound body held in memory so it can be replayed on failover.
pub const MAX_REPLAY_BODY_BYTES: usize = 1024 * 1024;

/// An accepted upstream response and where it came from.
#[derive(Debug)]
pub struct Forwarded<'a> {
    pub response: Response<Body>,
    pub target: &'a Target,
    /// 0-based position in the candidate order.
    pub attempt: usize,
}

enum RequestBody {
    Streamed(Option<Body>),
    Buffered(Bytes),
}

impl RequestBody {
    fn next(&mut self) -> Body {
        match self {
            RequestBody::Streamed(body) => body.take().unwrap_or_else(Body::empty),
            RequestBody::Buffered(bytes) => Body::from(bytes.clone()),
        }
    }
}

/// Sends a request to an ordered list of candidates, one at a time.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    metrics: Option<Arc<MetricsCollector>>,
    replay_limit: usize,
}

impl Forwarder {
    pub fn new(metrics: Option<Arc<MetricsCollector>>) -> Self {
        // hyper's client never follows redirects; they reach the caller as-is.
        let client = Client::builder().build(HttpsConnector::new());
        Self {
            client,
            metrics,
            replay_limit: MAX_REPLAY_BODY_BYTES,
        }
    }

    pub fn with_replay_limit(mut self, bytes: usize) -> Self {
        self.replay_limit = bytes;
        self
    }

    pub async fn forward<'a>(
        &self,
        request: Request<Body>,
        primary: &'a Target,
        targets: &'a [Target],
        policy: &RetryPolicy,
    ) -> Result<Forwarded<'a>, ProxyError> {
        let (parts, body) = request.into_parts();
        let candidates = order_candidates(primary, targets);
        let mut plan = policy.plan(&parts.method, candidates.len());

        // Bodies are only replayed for multi-attempt requests.
        let mut body = if plan.max_attempts > 1 {
            buffer_for_replay(body, self.replay_limit)
                .await
                .map_err(ProxyError::RequestBody)?
        } else {
            RequestBody::Streamed(Some(body))
        };
        if matches!(body, RequestBody::Streamed(_)) && plan.max_attempts > 1 {
            debug!("Request body exceeds {} bytes, no failover", self.replay_limit);
            plan = plan.single_attempt();
        }

        let mut last_error: Option<String> = None;
        for (attempt, target) in candidates.into_iter().take(plan.max_attempts).enumerate() {
            let upstream = match build_upstream_request(target, &parts, body.next()) {
                Ok(upstream) => upstream,
                Err(e) => {
                    warn!(upstream = %target.normalized, "Could not build upstream request: {}", e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            debug!(attempt, upstream = %upstream.uri(), "Forwarding");
            let timer = Timer::new();
            match self.client.request(upstream).await {
                Ok(response) => {
                    let status = response.status();
                    let outcome = if status.is_server_error() { "server_error" } else { "success" };
                    self.record_attempt(target, outcome, &timer);

                    if plan.on_response(status, attempt) == RetryDecision::Retry {
                        warn!(
                            upstream = %target.normalized,
                            "Upstream answered {}, failing over",
                            status
                        );
                        drop(response);
                        continue;
                    }

                    return Ok(Forwarded {
                        response,
                        target,
                        attempt,
                    });
                }
                Err(e) => {
                    self.record_attempt(target, "transport_error", &timer);
                    warn!(upstream = %target.normalized, "Upstream request failed: {}", e);
                    last_error = Some(e.to_string());
                    if plan.on_transport_error(attempt) == RetryDecision::NoRetry {
                        break;
                    }
                }
            }
        }

        let message = last_error
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| FALLBACK_ERROR.to_string());
        Err(ProxyError::UpstreamFailed(message))
    }

    fn record_attempt(&self, target: &Target, outcome: &str, timer: &Timer) {
        if let Some(metrics) = &self.metrics {
            metrics.record_upstream_attempt(&target.normalized, outcome, timer.elapsed());
        }
    }
}

/// Buffer `body` while it fits in `limit`. A larger body is handed back as a
/// stream that yields the chunks already read followed by the rest.
async fn buffer_for_replay(mut body: Body, limit: usize) -> Result<RequestBody, hyper::Error> {
    if body.size_hint().lower() > limit as u64 {
        return Ok(RequestBody::Streamed(Some(body)));
    }

    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        total += chunk.len();
        chunks.push(chunk);
        if total > limit {
            let read = stream::iter(chunks.into_iter().map(Ok::<_, hyper::Error>));
            return Ok(RequestBody::Streamed(Some(Body::wrap_stream(read.chain(body)))));
        }
    }

    let mut buffered = Vec::with_capacity(total);
    for chunk in &chunks {
        buffered.extend_from_slice(chunk);
    }
    Ok(RequestBody::Buffered(Bytes::from(buffered)))
}

/// Primary first, then the remaining targets in configured order.
pub fn order_candidates<'a>(primary: &'a Target, targets: &'a [Target]) -> Vec<&'a Target> {
    let mut ordered = vec![primary];
    for target in targets {
        if !ordered.iter().any(|t| t.normalized == target.normalized) {
            ordered.push(target);
        }
    }
    ordered
}

/// Re-root the inbound request under `target`. The query is kept, the
/// fragment and the inbound `Host` header are dropped.
pub fn build_upstream_request(
    target: &Target,
    parts: &Parts,
    body: Body,
) -> Result<Request<Body>, hyper::http::Error> {
    let url = target.url_for(parts.uri.path(), parts.uri.query());

    let mut request = Request::builder()
        .method(parts.method.clone())
        .uri(url.as_str())
        .body(body)?;

    let mut headers = parts.headers.clone();
    headers.remove(HOST);
    *request.headers_mut() = headers;
    Ok(request)
}
