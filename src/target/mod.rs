// src/target/mod.rs
mod registry;

pub use registry::{join_paths, normalize_base_path, parse_targets, resolve_cached, Target};
