// src/cache/file_store.rs
use super::adapter::MAX_TTL_SECS;
use super::kv::{KvError, KvStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// JSON file backed [`KvStore`] for self-hosted deployments. The whole file
/// is loaded at open and rewritten on every put, so it survives restarts.
pub struct FileKvStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl FileKvStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, KvError> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Opened KV file store at {} ({} entries)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &HashMap<String, StoredValue>) -> Result<(), KvError> {
        let tmp = self.path.with_extension("tmp");
        let contents = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(stored) if stored.is_expired(Utc::now()) => {
                entries.remove(key);
                Ok(None)
            }
            Some(stored) => Ok(Some(stored.value.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, expiration_ttl: Option<u64>) -> Result<(), KvError> {
        let now = Utc::now();
        let expires_at = match expiration_ttl {
            Some(ttl) => Some(expiry_after(now, ttl).ok_or(KvError::InvalidTtl(ttl))?),
            None => None,
        };

        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        next.retain(|_, stored| !stored.is_expired(now));
        next.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );

        // Memory only moves forward once the file agrees with it.
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(ttl.min(MAX_TTL_SECS)).ok()?;
    now.checked_add_signed(Duration::try_seconds(secs)?)
}
