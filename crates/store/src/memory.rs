//! In-process interval store.
//!
//! Backs tests and local development with the same semantics the Redis
//! backend provides: score-ordered collections, hashes, atomic batches
//! (applied under one lock), and captured publishes that tests can inspect.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::interval::{IntervalStore, StoreOp};

#[derive(Default)]
struct Inner {
    // score → members at that score, insertion-ordered within a score.
    sets: HashMap<String, BTreeMap<i64, Vec<String>>>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    published: Vec<(String, String)>,
}

/// Memory implementation of [`IntervalStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(topic, payload)` published so far, oldest first.
    pub fn published(&self) -> Vec<(String, String)> {
        self.lock().published.clone()
    }

    /// Drain and return captured publishes.
    pub fn take_published(&self) -> Vec<(String, String)> {
        std::mem::take(&mut self.lock().published)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_member_in(set: &mut BTreeMap<i64, Vec<String>>, member: &str) -> u64 {
    let mut removed = 0;
    set.retain(|_, members| {
        if let Some(pos) = members.iter().position(|m| m == member) {
            members.remove(pos);
            removed += 1;
        }
        !members.is_empty()
    });
    removed
}

fn apply(inner: &mut Inner, op: StoreOp) {
    match op {
        StoreOp::Add { key, score, member } => {
            let set = inner.sets.entry(key).or_default();
            // Same member re-added moves to the new score, as in a sorted set.
            remove_member_in(set, &member);
            set.entry(score).or_default().push(member);
        }
        StoreOp::RemoveByScore { key, min, max } => {
            if let Some(set) = inner.sets.get_mut(&key) {
                set.retain(|score, _| *score < min || *score > max);
            }
        }
        StoreOp::RemoveMember { key, member } => {
            if let Some(set) = inner.sets.get_mut(&key) {
                remove_member_in(set, &member);
            }
        }
        StoreOp::HashSet { key, field, value } => {
            inner.hashes.entry(key).or_default().insert(field, value);
        }
        StoreOp::HashDel { key, field } => {
            if let Some(hash) = inner.hashes.get_mut(&key) {
                hash.remove(&field);
            }
        }
        StoreOp::DeleteKey { key } => {
            inner.sets.remove(&key);
            inner.hashes.remove(&key);
        }
    }
}

#[async_trait]
impl IntervalStore for MemoryStore {
    async fn range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<usize>,
    ) -> Result<Vec<String>, StoreError> {
        // Inverted bounds are an empty window, as ZRANGEBYSCORE treats them.
        if min > max {
            return Ok(Vec::new());
        }
        let inner = self.lock();
        let mut out = Vec::new();
        if let Some(set) = inner.sets.get(key) {
            for (_, members) in set.range(min..=max) {
                for member in members {
                    if limit.is_some_and(|n| out.len() >= n) {
                        return Ok(out);
                    }
                    out.push(member.clone());
                }
            }
        }
        Ok(out)
    }

    async fn rev_range_by_score(
        &self,
        key: &str,
        max: i64,
        min: i64,
    ) -> Result<Vec<String>, StoreError> {
        if max < min {
            return Ok(Vec::new());
        }
        let inner = self.lock();
        let mut out = Vec::new();
        if let Some(set) = inner.sets.get(key) {
            for (_, members) in set.range(min..=max).rev() {
                out.extend(members.iter().rev().cloned());
            }
        }
        Ok(out)
    }

    async fn add(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        apply(
            &mut self.lock(),
            StoreOp::Add {
                key: key.to_string(),
                score,
                member: member.to_string(),
            },
        );
        Ok(())
    }

    async fn remove_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let mut removed = 0;
        if let Some(set) = inner.sets.get_mut(key) {
            set.retain(|score, members| {
                if *score >= min && *score <= max {
                    removed += members.len() as u64;
                    false
                } else {
                    true
                }
            });
        }
        Ok(removed)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        match inner.sets.get_mut(key) {
            Some(set) => Ok(remove_member_in(set, member)),
            None => Ok(0),
        }
    }

    async fn card(&self, key: &str) -> Result<u64, StoreError> {
        let inner = self.lock();
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.values().map(|m| m.len() as u64).sum())
            .unwrap_or(0))
    }

    async fn exec(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        // One lock held across the whole batch: all-or-nothing to observers.
        let mut inner = self.lock();
        for op in ops {
            apply(&mut inner, op);
        }
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        apply(
            &mut self.lock(),
            StoreOp::HashSet {
                key: key.to_string(),
                field: field.to_string(),
                value: value.to_string(),
            },
        );
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field).cloned()))
    }

    async fn hash_all(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .hashes
            .get(key)
            .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        match inner.hashes.get_mut(key) {
            Some(hash) => Ok(u64::from(hash.remove(field).is_some())),
            None => Ok(0),
        }
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        self.lock()
            .published
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn range_is_score_ordered() {
        let store = MemoryStore::new();
        store.add("k", 30, "c").await.unwrap();
        store.add("k", 10, "a").await.unwrap();
        store.add("k", 20, "b").await.unwrap();

        let all = store.range_by_score("k", 0, 100, None).await.unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);

        let capped = store.range_by_score("k", 0, 100, Some(2)).await.unwrap();
        assert_eq!(capped, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn rev_range_is_nearest_first() {
        let store = MemoryStore::new();
        store.add("k", 10, "a").await.unwrap();
        store.add("k", 20, "b").await.unwrap();
        store.add("k", 30, "c").await.unwrap();

        let rev = store.rev_range_by_score("k", 25, 5).await.unwrap();
        assert_eq!(rev, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn inverted_bounds_yield_empty_ranges() {
        let store = MemoryStore::new();
        store.add("k", 10, "a").await.unwrap();

        let fwd = store.range_by_score("k", 50, 20, None).await.unwrap();
        assert!(fwd.is_empty());
        let rev = store.rev_range_by_score("k", 20, 50).await.unwrap();
        assert!(rev.is_empty());
    }

    #[tokio::test]
    async fn re_adding_a_member_moves_its_score() {
        let store = MemoryStore::new();
        store.add("k", 10, "a").await.unwrap();
        store.add("k", 50, "a").await.unwrap();

        assert_eq!(store.card("k").await.unwrap(), 1);
        let at_50 = store.range_by_score("k", 50, 50, None).await.unwrap();
        assert_eq!(at_50, vec!["a"]);
    }

    #[tokio::test]
    async fn remove_by_score_counts_members() {
        let store = MemoryStore::new();
        store.add("k", 10, "a").await.unwrap();
        store.add("k", 10, "b").await.unwrap();
        store.add("k", 20, "c").await.unwrap();

        assert_eq!(store.remove_by_score("k", 10, 10).await.unwrap(), 2);
        assert_eq!(store.card("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn exec_applies_whole_batch() {
        let store = MemoryStore::new();
        store.add("k", 10, "a").await.unwrap();

        store
            .exec(vec![
                StoreOp::RemoveMember {
                    key: "k".to_string(),
                    member: "a".to_string(),
                },
                StoreOp::Add {
                    key: "k".to_string(),
                    score: 99,
                    member: "a2".to_string(),
                },
                StoreOp::HashSet {
                    key: "h".to_string(),
                    field: "f".to_string(),
                    value: "v".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(store.range_by_score("k", 99, 99, None).await.unwrap(), vec!["a2"]);
        assert_eq!(store.hash_get("h", "f").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn publish_is_captured() {
        let store = MemoryStore::new();
        store.publish("topic", "{\"k\":1}").await.unwrap();
        let published = store.take_published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "topic");
        assert!(store.published().is_empty());
    }

    #[tokio::test]
    async fn delete_key_clears_set_and_hash() {
        let store = MemoryStore::new();
        store.add("k", 1, "a").await.unwrap();
        store.hash_set("k", "f", "v").await.unwrap();

        store
            .exec(vec![StoreOp::DeleteKey {
                key: "k".to_string(),
            }])
            .await
            .unwrap();

        assert_eq!(store.card("k").await.unwrap(), 0);
        assert!(store.hash_get("k", "f").await.unwrap().is_none());
    }
}
