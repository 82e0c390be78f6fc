// src/proxy/mod.rs
mod forwarder;
mod proxy;

pub use forwarder::{build_upstream_request, order_candidates, Forwarded, Forwarder};
pub use proxy::{Proxy, ProxyError};
