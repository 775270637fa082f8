//! Redis-backed interval store.
//!
//! Timelines map onto sorted sets (`ZADD`/`ZRANGEBYSCORE` family), metadata
//! onto hashes, atomic batches onto `MULTI`/`EXEC` pipelines, and change
//! notifications onto `PUBLISH`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::{debug, info};

use tempo_core::config::StoreConfig;

use crate::error::StoreError;
use crate::interval::{namespaced, IntervalStore, StoreOp};

/// Redis implementation of [`IntervalStore`].
///
/// Holds one multiplexed connection; per-call clones share the underlying
/// socket, so the store is cheap to use from many tasks at once.
pub struct RedisStore {
    conn: MultiplexedConnection,
    namespace: String,
}

impl RedisStore {
    /// Connect to Redis using the project config.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| StoreError::Config(format!("invalid redis url: {e}")))?;

        let conn = timeout(
            Duration::from_secs(u64::from(config.connect_timeout_secs)),
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            StoreError::Connection(format!(
                "redis connect timed out after {}s",
                config.connect_timeout_secs
            ))
        })?
        .map_err(|e| StoreError::Connection(format!("redis connect failed: {e}")))?;

        info!(
            backend = "redis",
            namespace = %config.namespace,
            "interval store connected"
        );

        Ok(Self {
            conn,
            namespace: config.namespace.clone(),
        })
    }

    fn key(&self, key: &str) -> String {
        namespaced(&self.namespace, key)
    }
}

fn cmd_err(e: redis::RedisError) -> StoreError {
    StoreError::Command(e.to_string())
}

#[async_trait]
impl IntervalStore for RedisStore {
    async fn range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: Option<usize>,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        let members: Vec<String> = match limit {
            Some(n) => {
                conn.zrangebyscore_limit(key, min, max, 0, n as isize)
                    .await
                    .map_err(cmd_err)?
            }
            None => conn.zrangebyscore(key, min, max).await.map_err(cmd_err)?,
        };
        Ok(members)
    }

    async fn rev_range_by_score(
        &self,
        key: &str,
        max: i64,
        min: i64,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.zrevrangebyscore(self.key(key), max, min)
            .await
            .map_err(cmd_err)
    }

    async fn add(&self, key: &str, score: i64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(self.key(key), member, score)
            .await
            .map_err(cmd_err)?;
        Ok(())
    }

    async fn remove_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.zrembyscore(self.key(key), min, max)
            .await
            .map_err(cmd_err)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.zrem(self.key(key), member).await.map_err(cmd_err)
    }

    async fn card(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.zcard(self.key(key)).await.map_err(cmd_err)
    }

    async fn exec(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        debug!(ops = ops.len(), "executing atomic batch");

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            match op {
                StoreOp::Add { key, score, member } => {
                    pipe.zadd(self.key(&key), member, score).ignore();
                }
                StoreOp::RemoveByScore { key, min, max } => {
                    pipe.zrembyscore(self.key(&key), min, max).ignore();
                }
                StoreOp::RemoveMember { key, member } => {
                    pipe.zrem(self.key(&key), member).ignore();
                }
                StoreOp::HashSet { key, field, value } => {
                    pipe.hset(self.key(&key), field, value).ignore();
                }
                StoreOp::HashDel { key, field } => {
                    pipe.hdel(self.key(&key), field).ignore();
                }
                StoreOp::DeleteKey { key } => {
                    pipe.del(self.key(&key)).ignore();
                }
            }
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(self.key(key), field, value)
            .await
            .map_err(cmd_err)?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hget(self.key(key), field).await.map_err(cmd_err)
    }

    async fn hash_all(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.conn.clone();
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(self.key(key)).await.map_err(cmd_err)?;
        Ok(map.into_iter().collect())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.hdel(self.key(key), field).await.map_err(cmd_err)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .publish(self.key(topic), payload)
            .await
            .map_err(cmd_err)?;
        Ok(())
    }
}
