// src/config/models.rs
use serde::Deserialize;

pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 1500;
pub const MIN_HEALTH_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_CACHE_KEY: &str = "proxy:fastest";
pub const MAX_CACHE_KEY_LEN: usize = 512;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const MIN_CACHE_TTL_SECS: u64 = 10;
pub const DEFAULT_KV_BINDING: &str = "FASTEST_KV";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8787";

/// Name reported when no target list is configured.
pub const TARGETS_ENV_NAME: &str = "PROXY_TARGET or PROXY_TARGETS";

/// Flat proxy configuration, every value kept as the raw string supplied by
/// the host. Accessors apply defaults, floors and parsing rules so a bad
/// value degrades to its default instead of failing the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub targets: Option<String>,
    pub target: Option<String>,
    pub health_path: Option<String>,
    pub health_timeout_ms: Option<String>,
    pub cache: Option<String>,
    pub kv_key: Option<String>,
    pub kv_ttl_seconds: Option<String>,
    pub retry_on_5xx: Option<String>,
    pub kv_binding: Option<String>,
    pub kv_path: Option<String>,
    pub listen: Option<String>,
    pub metrics_port: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Kv,
}

impl ProxySettings {
    /// Raw target list: `targets` first, `target` as the fallback key.
    pub fn raw_targets(&self) -> Option<&str> {
        non_empty(self.targets.as_deref()).or_else(|| non_empty(self.target.as_deref()))
    }

    pub fn health_path(&self) -> String {
        let path = non_empty(self.health_path.as_deref()).unwrap_or("/");
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        }
    }

    pub fn health_timeout_ms(&self) -> u64 {
        parse_int_or(self.health_timeout_ms.as_deref(), DEFAULT_HEALTH_TIMEOUT_MS as i64)
            .max(MIN_HEALTH_TIMEOUT_MS as i64) as u64
    }

    pub fn cache_key(&self) -> String {
        non_empty(self.kv_key.as_deref())
            .unwrap_or(DEFAULT_CACHE_KEY)
            .chars()
            .take(MAX_CACHE_KEY_LEN)
            .collect()
    }

    pub fn cache_ttl_secs(&self) -> u64 {
        parse_int_or(self.kv_ttl_seconds.as_deref(), DEFAULT_CACHE_TTL_SECS as i64)
            .max(MIN_CACHE_TTL_SECS as i64) as u64
    }

    pub fn retry_on_5xx(&self) -> bool {
        parse_boolean(self.retry_on_5xx.as_deref(), true)
    }

    pub fn kv_binding(&self) -> String {
        non_empty(self.kv_binding.as_deref())
            .unwrap_or(DEFAULT_KV_BINDING)
            .to_string()
    }

    pub fn listen(&self) -> String {
        non_empty(self.listen.as_deref())
            .unwrap_or(DEFAULT_LISTEN)
            .to_string()
    }

    pub fn metrics_port(&self) -> Option<u16> {
        non_empty(self.metrics_port.as_deref()).and_then(|p| p.parse().ok())
    }

    /// Cache tiers in priority order. An empty list means caching is off.
    pub fn cache_tiers(&self) -> Vec<CacheTier> {
        parse_cache_tiers(self.cache.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts `1/true/yes/y/on` and `0/false/no/n/off`; anything else is the default.
pub fn parse_boolean(value: Option<&str>, default: bool) -> bool {
    let Some(value) = value else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}

/// Leading-integer parse: optional sign followed by digits, trailing junk ignored.
pub fn parse_int_or(value: Option<&str>, default: i64) -> i64 {
    let Some(value) = value else {
        return default;
    };
    let trimmed = value.trim();
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<i64>() {
        Ok(n) => sign * n,
        Err(_) => default,
    }
}

pub fn parse_cache_tiers(value: Option<&str>) -> Vec<CacheTier> {
    let auto = vec![CacheTier::Memory, CacheTier::Kv];
    let Some(value) = value else {
        return auto;
    };

    let mut tiers = Vec::new();
    let mut recognized = false;
    for token in value.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token
            .trim_matches(|c| c == '"' || c == '\'')
            .to_ascii_lowercase();
        let wanted: &[CacheTier] = match token.as_str() {
            "" => continue,
            "none" => return Vec::new(),
            "auto" => &[CacheTier::Memory, CacheTier::Kv],
            "memory" => &[CacheTier::Memory],
            "kv" => &[CacheTier::Kv],
            other => {
                tracing::warn!("Ignoring unknown cache adapter token: {}", other);
                continue;
            }
        };
        recognized = true;
        for tier in wanted {
            if !tiers.contains(tier) {
                tiers.push(*tier);
            }
        }
    }

    if recognized {
        tiers
    } else {
        auto
    }
}
