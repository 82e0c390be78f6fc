// src/retry/mod.rs
mod policy;

pub use policy::{AttemptPlan, RetryDecision, RetryPolicy, MAX_ATTEMPTS};
