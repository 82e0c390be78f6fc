// src/health/mod.rs
mod prober;

pub use prober::{HealthProber, ProbeResult, HEALTH_TIMEOUT_ERROR};
