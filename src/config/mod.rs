// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load settings from an optional file (YAML or JSON) overlaid with `PROXY_*`
/// environment variables. Environment values win over file values.
pub fn load_settings<P: AsRef<Path>>(path: Option<P>) -> Result<ProxySettings> {
    let mut builder = ::config::Config::builder();

    if let Some(path) = path {
        let path = path.as_ref();
        builder = builder.add_source(::config::File::from(path).required(true));
    }

    let mut settings: ProxySettings = builder
        .add_source(::config::Environment::with_prefix("PROXY"))
        .build()
        .context("Failed to assemble proxy configuration")?
        .try_deserialize()
        .context("Failed to parse proxy configuration")?;

    if settings.listen.is_none() {
        if let Ok(port) = std::env::var("PORT") {
            settings.listen = Some(format!("0.0.0.0:{}", port.trim()));
        }
    }

    Ok(settings)
}
