// tests/common/mod.rs
#![allow(dead_code)]

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Clone)]
pub struct Behavior {
    pub name: &'static str,
    pub health_delay: Duration,
    pub health_status: u16,
    pub status: u16,
    pub set_cookies: Vec<&'static str>,
    pub location: Option<&'static str>,
}

impl Behavior {
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            health_delay: Duration::ZERO,
            health_status: 200,
            status: 200,
            set_cookies: Vec::new(),
            location: None,
        }
    }

    pub fn health_delay_ms(mut self, ms: u64) -> Self {
        self.health_delay = Duration::from_millis(ms);
        self
    }

    pub fn health_status(mut self, status: u16) -> Self {
        self.health_status = status;
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn set_cookie(mut self, cookie: &'static str) -> Self {
        self.set_cookies.push(cookie);
        self
    }

    pub fn redirect_to(mut self, location: &'static str) -> Self {
        self.status = 302;
        self.location = Some(location);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Seen {
    pub method: String,
    pub path_and_query: String,
    pub host: Option<String>,
}

/// A local origin recording what it received.
pub struct TestUpstream {
    pub addr: SocketAddr,
    pub health_hits: Arc<AtomicUsize>,
    pub hits: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

impl TestUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn normalized(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn health_hits(&self) -> usize {
        self.health_hits.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_seen(&self) -> Option<Seen> {
        self.seen.lock().unwrap().last().cloned()
    }
}

async fn handle(
    req: Request<Body>,
    behavior: Behavior,
    health_hits: Arc<AtomicUsize>,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
) -> Result<Response<Body>, Infallible> {
    if req.uri().path() == "/health" {
        health_hits.fetch_add(1, Ordering::SeqCst);
        sleep(behavior.health_delay).await;
        let mut response = Response::new(Body::from("OK"));
        *response.status_mut() = StatusCode::from_u16(behavior.health_status).unwrap();
        return Ok(response);
    }

    hits.fetch_add(1, Ordering::SeqCst);
    seen.lock().unwrap().push(Seen {
        method: req.method().to_string(),
        path_and_query: req
            .uri()
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_default(),
        host: req
            .headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .map(String::from),
    });

    let mut builder = Response::builder()
        .status(behavior.status)
        .header("x-upstream", behavior.name);
    for cookie in &behavior.set_cookies {
        builder = builder.header("set-cookie", *cookie);
    }
    if let Some(location) = behavior.location {
        builder = builder.header("location", location);
    }
    Ok(builder.body(Body::from(behavior.name)).unwrap())
}

pub async fn start_upstream(behavior: Behavior) -> TestUpstream {
    let health_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (svc_health, svc_hits, svc_seen) = (health_hits.clone(), hits.clone(), seen.clone());
    let make_service = make_service_fn(move |_| {
        let behavior = behavior.clone();
        let (health_hits, hits, seen) = (svc_health.clone(), svc_hits.clone(), svc_seen.clone());
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle(
                    req,
                    behavior.clone(),
                    health_hits.clone(),
                    hits.clone(),
                    seen.clone(),
                )
            }))
        }
    });

    let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_service);
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.await;
    });

    TestUpstream {
        addr,
        health_hits,
        hits,
        seen,
    }
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
