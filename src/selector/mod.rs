// src/selector/mod.rs
mod fastest;

pub use fastest::{FastestSelector, Selected, SelectionSource};
