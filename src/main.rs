// src/main.rs
use anyhow::{Context, Result};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use fastest_proxy::{
    cache::{FileKvStore, KvBindings},
    config,
    metrics::MetricsRegistry,
    proxy::Proxy,
    server::{RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fastest_proxy=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Optional config file, overlaid by PROXY_* environment variables
    let config_path = std::env::args().nth(1);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path);
    }
    let settings = config::load_settings(config_path.as_deref())?;

    // Durable tier, when a backing file is configured
    let mut bindings = KvBindings::new();
    if let Some(path) = settings.kv_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        let store = FileKvStore::open(path)
            .await
            .with_context(|| format!("Failed to open KV store at {}", path))?;
        bindings.insert(settings.kv_binding(), Arc::new(store));
    }

    // Metrics are served only when a port is configured
    let metrics = match settings.metrics_port() {
        Some(port) => {
            let registry = MetricsRegistry::new()?;
            let collector = registry.collector();
            let metrics_addr: SocketAddr = ([0, 0, 0, 0], port).into();
            start_metrics_server(metrics_addr, registry, "/metrics".to_string()).await?;
            Some(collector)
        }
        None => None,
    };

    let listen: SocketAddr = settings
        .listen()
        .parse()
        .with_context(|| format!("Invalid listen address: {}", settings.listen()))?;

    let proxy = Arc::new(Proxy::new(settings, bindings, metrics)?);
    let handler = RequestHandler::new(proxy.clone());

    info!("Starting fastest-target proxy on {}", listen);
    ServerBuilder::new(listen)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    // Let pending cache writes settle before exit
    proxy.tasks().wait_idle().await;
    info!("Shutdown complete");

    Ok(())
}

async fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let response = if req.uri().path() == path.as_str() {
                        let mut response = Response::new(Body::from(registry.gather()));
                        response.headers_mut().insert(
                            hyper::header::CONTENT_TYPE,
                            hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                        );
                        response
                    } else {
                        let mut response = Response::new(Body::from("Not Found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        response
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
