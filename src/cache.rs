//! Memoization of expensive calls
//!
//! Results are keyed by a SHA-256 of the function identity and its
//! serialized arguments and kept until explicitly invalidated. There is no
//! size bound and no eviction; a "regenerate" action drops the entries of one
//! function so the next call recomputes.

use crate::error::{Result, SqlGenError};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    function: &'static str,
    digest: String,
}

impl CacheKey {
    pub fn new<A: Serialize + ?Sized>(function: &'static str, args: &A) -> Result<Self> {
        let encoded = serde_json::to_vec(args)
            .map_err(|e| SqlGenError::Cache(format!("Cannot hash arguments of {}: {}", function, e)))?;

        let mut hasher = Sha256::new();
        hasher.update(function.as_bytes());
        hasher.update([0u8]);
        hasher.update(&encoded);

        Ok(Self {
            function,
            digest: hex::encode(hasher.finalize()),
        })
    }

    pub fn function(&self) -> &'static str {
        self.function
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

pub struct MemoCache<V> {
    entries: DashMap<CacheKey, V>,
}

impl<V: Clone> MemoCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Cached value for `key`, or the result of `compute`. Errors are not
    /// cached.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(hit) = self.get(&key) {
            debug!("Cache hit for {}", key.function);
            return Ok(hit);
        }

        debug!("Cache miss for {}", key.function);
        let value = compute().await?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry recorded for `function`.
    pub fn invalidate_function(&self, function: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.function != function);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for MemoCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
