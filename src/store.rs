// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Durable storage for token bucket state.
//!
//! The store is a whole-map key/value store: `load` returns every bucket,
//! `save` overwrites every bucket. Expired buckets are swept on each load
//! and, when anything was swept, the result is written straight back, so
//! the store heals itself without a separate maintenance task.

use crate::clock::Clock;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// All buckets, keyed by resource key.
pub type BucketMap = HashMap<String, Bucket>;

/// Persisted state of a single token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Tokens left in the bucket
    pub available: u64,
    /// Unix time of the last refill computation
    pub last_refreshed: i64,
    /// Unix time after which the bucket is discarded
    pub expires_at: i64,
}

impl Bucket {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

/// Errors raised while reading or writing bucket state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Throttle store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not lock throttle store {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Throttle store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Whole-map storage for bucket state.
pub trait BucketStore: Send + Sync {
    /// Read every live bucket. Missing or empty storage yields an empty map.
    fn load(&self) -> Result<BucketMap, StoreError>;

    /// Replace the stored map with `buckets`.
    fn save(&self, buckets: &BucketMap) -> Result<(), StoreError>;
}

/// Drop every bucket that expired before `now`. Returns how many were removed.
pub fn prune_expired(buckets: &mut BucketMap, now: i64) -> usize {
    let before = buckets.len();
    buckets.retain(|_, bucket| !bucket.is_expired(now));
    before - buckets.len()
}

/// JSON file store.
///
/// Writers take an exclusive advisory lock for the duration of the write.
/// Readers do not lock.
pub struct FileBucketStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileBucketStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BucketStore for FileBucketStore {
    fn load(&self) -> Result<BucketMap, StoreError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BucketMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(BucketMap::new());
        }

        let mut buckets: BucketMap = serde_json::from_slice(&contents)?;

        let pruned = prune_expired(&mut buckets, self.clock.now());
        if pruned > 0 {
            debug!(path = %self.path.display(), pruned, "Swept expired buckets");
            self.save(&buckets)?;
        }

        Ok(buckets)
    }

    fn save(&self, buckets: &BucketMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let encoded = serde_json::to_vec(buckets)?;

        // Truncate only once the lock is held so a concurrent writer never
        // sees its own output cut short.
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        file.lock_exclusive().map_err(|source| StoreError::Lock {
            path: self.path.clone(),
            source,
        })?;

        let written = file
            .set_len(0)
            .and_then(|_| file.write_all(&encoded))
            .and_then(|_| file.sync_data());

        let unlocked = FileExt::unlock(&file);

        written.map_err(|e| self.io_error(e))?;
        unlocked.map_err(|source| StoreError::Lock {
            path: self.path.clone(),
            source,
        })
    }
}

/// Process-local store with the same contract as [`FileBucketStore`].
pub struct MemoryBucketStore {
    buckets: Mutex<BucketMap>,
    clock: Arc<dyn Clock>,
}

impl MemoryBucketStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(BucketMap::new()),
            clock,
        }
    }

    /// Current contents without sweeping.
    pub fn snapshot(&self) -> BucketMap {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BucketStore for MemoryBucketStore {
    fn load(&self) -> Result<BucketMap, StoreError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        prune_expired(&mut buckets, self.clock.now());
        Ok(buckets.clone())
    }

    fn save(&self, buckets: &BucketMap) -> Result<(), StoreError> {
        *self.buckets.lock().unwrap_or_else(PoisonError::into_inner) = buckets.clone();
        Ok(())
    }
}
