// src/lib.rs
pub mod cache;
pub mod config;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod retry;
pub mod selector;
pub mod server;
pub mod target;
pub mod tasks;
