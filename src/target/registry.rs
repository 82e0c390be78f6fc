// src/target/registry.rs
use std::collections::HashSet;
use url::Url;

/// An upstream origin the proxy may forward to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub base_url: Url,
    pub base_path: String,
    /// Canonical `base_url` with a single trailing slash; the identity key.
    pub normalized: String,
}

impl Target {
    /// Build a target from an absolute URL. Query and fragment are dropped and
    /// the path is reduced to its normalized base path.
    pub fn from_url(mut url: Url) -> Option<Self> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }

        let base_path = normalize_base_path(url.path());
        if base_path == "/" {
            url.set_path("/");
        } else {
            url.set_path(&format!("{}/", base_path));
        }
        url.set_query(None);
        url.set_fragment(None);

        let normalized = collapse_trailing_slashes(url.as_str());
        Some(Self {
            base_url: url,
            base_path,
            normalized,
        })
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Url::parse(raw.trim()).ok().and_then(Self::from_url)
    }

    /// Absolute URL for `path` rooted under this target's base path.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&join_paths(&self.base_path, path));
        url.set_query(query);
        url.set_fragment(None);
        url
    }
}

/// Parse a JSON array or a comma/whitespace delimited list of target URLs.
/// Invalid entries are dropped; duplicates collapse onto the first occurrence.
pub fn parse_targets(raw: &str) -> Vec<Target> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let items: Vec<String> = if raw.starts_with('[') {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(values)) => values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            Ok(_) | Err(_) => {
                tracing::warn!("Target list looks like JSON but is not a JSON array");
                Vec::new()
            }
        }
    } else {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    };

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for item in items {
        match Target::parse(&item) {
            Some(target) => {
                if seen.insert(target.normalized.clone()) {
                    targets.push(target);
                }
            }
            None => tracing::debug!("Ignoring invalid target entry: {}", item),
        }
    }
    targets
}

/// Resolve a remembered identity against the current candidate set.
pub fn resolve_cached<'a>(cached: &str, targets: &'a [Target]) -> Option<&'a Target> {
    let normalized = Target::parse(cached)?.normalized;
    targets.iter().find(|t| t.normalized == normalized)
}

pub fn normalize_base_path(path: &str) -> String {
    let with_slash = ensure_leading_slash(path);
    let trimmed = with_slash.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn join_paths(base_path: &str, request_path: &str) -> String {
    let base = normalize_base_path(base_path);
    let request = ensure_leading_slash(request_path);
    if base == "/" {
        return request;
    }
    format!("{}/{}", base, request.trim_start_matches('/'))
}

fn ensure_leading_slash(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn collapse_trailing_slashes(s: &str) -> String {
    format!("{}/", s.trim_end_matches('/'))
}
