//! TTL bookkeeping and JSON blob persistence shared by the pool graph cache
//! and the route cache.

use chrono::Utc;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::CacheError;

/// Wall-clock source in unix seconds.
///
/// Persisted timestamps must survive a restart, so this is wall time and not
/// a monotonic `Instant`.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: f64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by.as_secs_f64();
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|guard| *guard).unwrap_or_default()
    }
}

/// A cached value and the wall time it was built at.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub built_at: f64,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, built_at: f64) -> Self {
        Self { value, built_at }
    }

    /// Valid while `now - built_at < ttl`.
    pub fn is_fresh(&self, now: f64, ttl: Duration) -> bool {
        now - self.built_at < ttl.as_secs_f64()
    }

    pub fn age(&self, now: f64) -> f64 {
        (now - self.built_at).max(0.0)
    }
}

/// A JSON document on disk holding one cache generation.
///
/// Writes go through a temporary sibling and a rename so readers never see
/// a half-written blob.
#[derive(Debug, Clone)]
pub struct JsonCacheFile {
    path: PathBuf,
}

impl JsonCacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>, file_name: &str) -> Self {
        Self::new(dir.as_ref().join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the blob.
    ///
    /// Returns `Ok(None)` when the file does not exist. A file that exists
    /// but does not parse yields [`CacheError::Corrupted`]; the caller decides
    /// whether to discard it.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, CacheError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CacheError::Corrupted {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Like [`load`](Self::load) but treats any failure as a miss, deleting
    /// the offending file so the next successful build overwrites it.
    pub async fn load_or_discard<T: DeserializeOwned>(&self) -> Option<T> {
        match self.load().await {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ {}, discarding", e);
                self.remove().await;
                None
            }
        }
    }

    pub async fn store<T: Serialize>(&self, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Corrupted {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| self.io_error(source))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io_error(source))?;
        debug!("Persisted {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    pub async fn remove(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("⚠️ Could not remove cache file {}: {}", self.path.display(), e);
            }
        }
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
