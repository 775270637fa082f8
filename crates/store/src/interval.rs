//! Interval store trait and types.
//!
//! The scheduling engine keeps every timeline as one score-ordered collection
//! (score = activity start, member = serialized activity JSON) plus flat
//! hashes for timeline/worker metadata. This module defines the boundary the
//! engine talks through; backends implement it for a particular store.
//!
//! Backends are selected at runtime from [`StoreConfig::backend`] via
//! [`build_store`].

use std::sync::Arc;

use async_trait::async_trait;

use tempo_core::config::StoreConfig;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::redis::RedisStore;

/// One staged mutation inside an atomic batch.
///
/// Batches passed to [`IntervalStore::exec`] apply all-or-nothing: a
/// recurring-series insert, a move (remove + add), or a timeline teardown is
/// never observable half-applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Insert `member` into the collection at `key` with `score`.
    Add {
        key: String,
        score: i64,
        member: String,
    },
    /// Remove every member of `key` with score in `[min, max]`.
    RemoveByScore { key: String, min: i64, max: i64 },
    /// Remove the exact `member` from `key`.
    RemoveMember { key: String, member: String },
    /// Set a hash field.
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    /// Delete a hash field.
    HashDel { key: String, field: String },
    /// Delete an entire key (collection or hash).
    DeleteKey { key: String },
}

/// Trait for interval store backends.
///
/// Score range arguments are inclusive on both ends. All methods are cheap to
/// call concurrently; implementations hold no engine-visible state beyond the
/// keyed data itself.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Members of `key` with score in `[min, max]`, ascending by score,
    /// capped at `limit` when given.
    async fn range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<usize>,
    ) -> Result<Vec<String>, StoreError>;

    /// Members of `key` with score in `[min, max]`, descending by score
    /// (nearest-to-`max` first).
    async fn rev_range_by_score(
        &self,
        key: &str,
        max: i64,
        min: i64,
    ) -> Result<Vec<String>, StoreError>;

    /// Insert one member at `score`.
    async fn add(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError>;

    /// Remove members with score in `[min, max]`; returns the removed count.
    async fn remove_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError>;

    /// Remove the exact member; returns 1 if it existed, 0 otherwise.
    async fn remove_member(&self, key: &str, member: &str) -> Result<u64, StoreError>;

    /// Number of members under `key`.
    async fn card(&self, key: &str) -> Result<u64, StoreError>;

    /// Apply a batch of operations atomically (all or nothing).
    async fn exec(&self, ops: Vec<StoreOp>) -> Result<(), StoreError>;

    /// Set a field in the hash at `key`.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Read one hash field.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// All `(field, value)` pairs of the hash at `key`.
    async fn hash_all(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    /// Delete one hash field; returns the removed count.
    async fn hash_del(&self, key: &str, field: &str) -> Result<u64, StoreError>;

    /// Publish a change notification to subscribers of `topic`.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError>;
}

/// Build the configured [`IntervalStore`] backend.
///
/// Returns an error if the requested backend is unknown or unreachable.
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn IntervalStore>, StoreError> {
    match config.backend.as_str() {
        "redis" => Ok(Arc::new(RedisStore::connect(config).await?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StoreError::Config(format!(
            "unknown store backend '{other}' — supported: redis, memory"
        ))),
    }
}

/// Prefix `key` with the configured namespace, when one is set.
pub(crate) fn namespaced(namespace: &str, key: &str) -> String {
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{namespace}:{key}")
    }
}
