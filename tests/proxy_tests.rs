// tests/proxy_tests.rs
mod common;

use async_trait::async_trait;
use common::{body_text, get, start_upstream, Behavior};
use fastest_proxy::cache::{CacheAdapter, CachePutOptions, FileKvStore, KvBindings, KvError, KvStore};
use fastest_proxy::config::ProxySettings;
use fastest_proxy::proxy::Proxy;
use fastest_proxy::server::{serve_listener, RequestHandler};
use hyper::header::SET_COOKIE;
use hyper::{Body, Client, Request, StatusCode};
use std::sync::{Arc, Mutex};

fn settings(targets: &[&str]) -> ProxySettings {
    ProxySettings {
        targets: Some(targets.join(",")),
        health_path: Some("/health".into()),
        cache: Some("memory".into()),
        ..Default::default()
    }
}

fn proxy(settings: ProxySettings) -> Proxy {
    Proxy::new(settings, KvBindings::new(), None).unwrap()
}

async fn seed(proxy: &Proxy, value: &str) {
    proxy
        .memory_cache()
        .put("proxy:fastest", value, CachePutOptions::ttl(300))
        .await
        .unwrap();
}

async fn cached(proxy: &Proxy) -> Option<String> {
    proxy.memory_cache().get("proxy:fastest").await
}

#[tokio::test]
async fn test_probe_then_cache_hit() {
    let fast = start_upstream(Behavior::named("fast").health_delay_ms(5)).await;
    let slow = start_upstream(Behavior::named("slow").health_delay_ms(150)).await;
    let proxy = proxy(settings(&[&slow.url(), &fast.url()]));

    let first = proxy.respond(get("/hello")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-upstream"], "fast");
    assert_eq!(fast.health_hits(), 1);
    assert_eq!(slow.health_hits(), 1);

    proxy.tasks().wait_idle().await;
    assert_eq!(cached(&proxy).await, Some(fast.normalized()));

    let second = proxy.respond(get("/hello")).await;
    assert_eq!(second.headers()["x-upstream"], "fast");
    assert_eq!(fast.health_hits(), 1);
    assert_eq!(slow.health_hits(), 1);
    assert_eq!(fast.hits(), 2);
    assert_eq!(slow.hits(), 0);
}

#[derive(Default)]
struct RecordingStore {
    puts: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl KvStore for RecordingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
        Ok(None)
    }

    async fn put(&self, _key: &str, value: &str, _ttl: Option<u64>) -> Result<(), KvError> {
        self.puts.lock().unwrap().push(value.to_string());
        Ok(())
    }
}

/// Proxy with memory first and a recording durable tier second. A memory hit
/// never backfills, so every durable write is a selection refresh.
fn recording_proxy(targets: &[&str]) -> (Proxy, Arc<RecordingStore>) {
    let store = Arc::new(RecordingStore::default());
    let mut settings = settings(targets);
    settings.cache = Some("memory kv".into());
    let bindings = KvBindings::new().with_binding("FASTEST_KV", store.clone());
    (Proxy::new(settings, bindings, None).unwrap(), store)
}

#[tokio::test]
async fn test_failover_order_and_no_cache_update_on_fallback() {
    let t1 = start_upstream(Behavior::named("t1")).await;
    let t2 = start_upstream(Behavior::named("t2").status(503)).await;
    let t3 = start_upstream(Behavior::named("t3")).await;
    let (proxy, store) = recording_proxy(&[&t1.url(), &t2.url(), &t3.url()]);
    seed(&proxy, &t2.normalized()).await;

    let response = proxy.respond(get("/items")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "t1");
    assert_eq!((t2.hits(), t1.hits(), t3.hits()), (1, 1, 0));
    assert_eq!(t1.health_hits() + t2.health_hits() + t3.health_hits(), 0);

    proxy.tasks().wait_idle().await;
    assert_eq!(cached(&proxy).await, Some(t2.normalized()));
    assert!(store.puts().is_empty());
}

#[tokio::test]
async fn test_first_attempt_success_refreshes_cache() {
    let t1 = start_upstream(Behavior::named("t1")).await;
    let t2 = start_upstream(Behavior::named("t2").status(404)).await;
    let (proxy, store) = recording_proxy(&[&t1.url(), &t2.url()]);
    seed(&proxy, &t2.normalized()).await;

    let response = proxy.respond(get("/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-upstream"], "t2");
    assert_eq!(t1.hits(), 0);

    proxy.tasks().wait_idle().await;
    assert_eq!(store.puts(), vec![t2.normalized()]);
    assert_eq!(cached(&proxy).await, Some(t2.normalized()));
}

#[tokio::test]
async fn test_post_is_never_retried() {
    let primary = start_upstream(Behavior::named("primary").status(500)).await;
    let secondary = start_upstream(Behavior::named("secondary")).await;
    let proxy = proxy(settings(&[&primary.url(), &secondary.url()]));
    seed(&proxy, &primary.normalized()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .body(Body::from("{\"qty\":1}"))
        .unwrap();
    let response = proxy.respond(request).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "primary");
    assert_eq!(primary.hits(), 1);
    assert_eq!(secondary.hits(), 0);
}

#[tokio::test]
async fn test_retry_on_5xx_disabled_passes_5xx_through() {
    let primary = start_upstream(Behavior::named("primary").status(502)).await;
    let secondary = start_upstream(Behavior::named("secondary")).await;
    let mut settings = settings(&[&primary.url(), &secondary.url()]);
    settings.retry_on_5xx = Some("no".into());
    let proxy = proxy(settings);
    seed(&proxy, &primary.normalized()).await;

    let response = proxy.respond(get("/")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(secondary.hits(), 0);
}

#[tokio::test]
async fn test_stale_cache_entry_triggers_probe() {
    let only = start_upstream(Behavior::named("only")).await;
    let proxy = proxy(settings(&[&only.url()]));
    seed(&proxy, "http://removed.example/").await;

    let response = proxy.respond(get("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(only.health_hits(), 1);

    proxy.tasks().wait_idle().await;
    assert_eq!(cached(&proxy).await, Some(only.normalized()));
}

#[tokio::test]
async fn test_unhealthy_probe_falls_back_to_first_target() {
    let first = start_upstream(Behavior::named("first").health_status(500)).await;
    let second = start_upstream(Behavior::named("second").health_status(503)).await;
    let proxy = proxy(settings(&[&first.url(), &second.url()]));

    let response = proxy.respond(get("/")).await;
    assert_eq!(response.headers()["x-upstream"], "first");
    assert_eq!(second.hits(), 0);
}

#[tokio::test]
async fn test_cache_disabled_uses_first_target_without_probing() {
    let first = start_upstream(Behavior::named("first").health_delay_ms(100)).await;
    let second = start_upstream(Behavior::named("second")).await;
    let mut settings = settings(&[&first.url(), &second.url()]);
    settings.cache = Some("none".into());
    let proxy = proxy(settings);

    let response = proxy.respond(get("/")).await;
    assert_eq!(response.headers()["x-upstream"], "first");
    assert_eq!(first.health_hits() + second.health_hits(), 0);

    proxy.tasks().wait_idle().await;
    assert!(proxy.memory_cache().is_empty());
}

#[tokio::test]
async fn test_request_is_rerooted_under_base_path() {
    let origin = start_upstream(Behavior::named("origin")).await;
    let mut settings = settings(&[&format!("{}/api/", origin.url())]);
    settings.cache = Some("none".into());
    let proxy = proxy(settings);

    let request = Request::builder()
        .uri("/v1/items?page=2")
        .header("host", "proxy.example")
        .body(Body::empty())
        .unwrap();
    let response = proxy.respond(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = origin.last_seen().unwrap();
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.path_and_query, "/api/v1/items?page=2");
    assert_eq!(seen.host.as_deref(), Some(origin.addr.to_string().as_str()));
}

#[tokio::test]
async fn test_redirects_reach_the_client() {
    let origin = start_upstream(Behavior::named("origin").redirect_to("/login")).await;
    let mut settings = settings(&[&origin.url()]);
    settings.cache = Some("none".into());
    let proxy = proxy(settings);

    let response = proxy.respond(get("/account")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/login");
}

#[tokio::test]
async fn test_all_candidates_unreachable_is_502() {
    let proxy = proxy(settings(&["http://127.0.0.1:9", "http://127.0.0.1:7"]));
    seed(&proxy, "http://127.0.0.1:9/").await;

    let response = proxy.respond(get("/")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(!body_text(response).await.is_empty());
}

#[tokio::test]
async fn test_set_cookie_lines_survive_the_front_door() {
    let origin = start_upstream(
        Behavior::named("origin")
            .set_cookie("a=1; Path=/")
            .set_cookie("b=2; Path=/; HttpOnly"),
    )
    .await;
    let mut settings = settings(&[&origin.url()]);
    settings.cache = Some("none".into());
    let proxy = Arc::new(proxy(settings));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(
        listener,
        RequestHandler::new(proxy.clone()),
        async {
            let _ = stop_rx.await;
        },
    ));

    let client = Client::new();
    let response = client
        .get(format!("http://{}/", addr).parse().unwrap())
        .await
        .unwrap();
    let cookies: Vec<_> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies, vec!["a=1; Path=/", "b=2; Path=/; HttpOnly"]);

    let _ = stop_tx.send(());
    server.await.unwrap().unwrap();
}

struct OfflineStore;

#[async_trait]
impl KvStore for OfflineStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
        Err(KvError::Unavailable("offline".into()))
    }

    async fn put(&self, _key: &str, _value: &str, _ttl: Option<u64>) -> Result<(), KvError> {
        Err(KvError::Unavailable("offline".into()))
    }
}

#[tokio::test]
async fn test_durable_outage_does_not_block_memory_tier() {
    let origin = start_upstream(Behavior::named("origin")).await;
    let mut settings = settings(&[&origin.url()]);
    settings.cache = Some("auto".into());
    let bindings = KvBindings::new().with_binding("FASTEST_KV", Arc::new(OfflineStore));
    let proxy = Proxy::new(settings, bindings, None).unwrap();

    let response = proxy.respond(get("/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    proxy.tasks().wait_idle().await;
    assert_eq!(cached(&proxy).await, Some(origin.normalized()));
}

#[tokio::test]
async fn test_durable_tier_is_shared_between_instances() {
    let fast = start_upstream(Behavior::named("fast").health_delay_ms(5)).await;
    let slow = start_upstream(Behavior::named("slow").health_delay_ms(150)).await;
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn KvStore> =
        Arc::new(FileKvStore::open(dir.path().join("kv.json")).await.unwrap());

    let mut settings = settings(&[&slow.url(), &fast.url()]);
    settings.cache = Some("memory, kv".into());
    settings.kv_binding = Some("SHARED".into());

    let first = Proxy::new(
        settings.clone(),
        KvBindings::new().with_binding("SHARED", store.clone()),
        None,
    )
    .unwrap();
    first.respond(get("/")).await;
    first.tasks().wait_idle().await;
    assert_eq!(
        store.get("proxy:fastest").await.unwrap(),
        Some(fast.normalized())
    );

    let second = Proxy::new(settings, KvBindings::new().with_binding("SHARED", store), None).unwrap();
    let response = second.respond(get("/")).await;
    assert_eq!(response.headers()["x-upstream"], "fast");
    assert_eq!(fast.health_hits(), 1);
    assert_eq!(slow.health_hits(), 1);

    second.tasks().wait_idle().await;
    assert_eq!(cached(&second).await, Some(fast.normalized()));
}

#[tokio::test]
async fn test_oversized_ttl_setting_still_caches_selection() {
    let origin = start_upstream(Behavior::named("origin")).await;
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn KvStore> =
        Arc::new(FileKvStore::open(dir.path().join("kv.json")).await.unwrap());

    let mut settings = settings(&[&origin.url()]);
    settings.cache = Some("memory kv".into());
    settings.kv_ttl_seconds = Some("9223372036854775807".into());
    let proxy = Proxy::new(settings, KvBindings::new().with_binding("FASTEST_KV", store.clone()), None)
        .unwrap();

    let response = proxy.respond(get("/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    proxy.tasks().wait_idle().await;
    assert_eq!(cached(&proxy).await, Some(origin.normalized()));
    assert_eq!(
        store.get("proxy:fastest").await.unwrap(),
        Some(origin.normalized())
    );
}
