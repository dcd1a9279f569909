//! Redis implementation of the atomic primitives. Counters are INCR/HINCRBY,
//! scored collections are sorted sets, and the registry lives in hashes.

use crate::backend::AtomicStore;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rotator_core::config::RedisConfig;
use std::time::Duration;
use tracing::info;

/// Shared Redis connection. Cloning the manager is cheap and every command
/// goes over the same multiplexed connection, reconnecting on failure.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        info!(url = %config.url, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str())?;
        let conn = tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| StoreError::ConnectTimeout(config.connect_timeout_ms))??;

        // Verify connectivity
        let mut ping = conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut ping).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// Sorted-set score argument. Redis spells infinities `+inf` / `-inf`.
fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        Ok(self.conn().incr(key, 1).await?)
    }

    async fn hincr(&self, key: &str, field: &str) -> StoreResult<i64> {
        Ok(self.conn().hincr(key, field, 1).await?)
    }

    async fn hset_nx(&self, key: &str, field: &str, value: i64) -> StoreResult<bool> {
        Ok(self.conn().hset_nx(key, field, value).await?)
    }

    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>> {
        Ok(self.conn().get(key).await?)
    }

    async fn hget_int(&self, key: &str, field: &str) -> StoreResult<Option<i64>> {
        Ok(self.conn().hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.conn().hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.conn().hexists(key, field).await?)
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.conn().hkeys(key).await?)
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let removed: i64 = self.conn().hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        redis::cmd("ZADD")
            .arg(key)
            .arg(score_arg(score))
            .arg(member)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn zadd_nx(&self, key: &str, member: &str, score: f64) -> StoreResult<bool> {
        let added: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg("NX")
            .arg(score_arg(score))
            .arg(member)
            .query_async(&mut self.conn())
            .await?;
        Ok(added > 0)
    }

    async fn zadd_xx(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        redis::cmd("ZADD")
            .arg(key)
            .arg("XX")
            .arg(score_arg(score))
            .arg(member)
            .query_async::<_, ()>(&mut self.conn())
            .await?;
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let removed: i64 = self.conn().zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self.conn().zscore(key, member).await?)
    }

    async fn ztop(&self, key: &str) -> StoreResult<Option<String>> {
        let top: Vec<String> = self.conn().zrevrange(key, 0, 0).await?;
        Ok(top.into_iter().next())
    }

    async fn zmembers(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self.conn().zrange(key, 0, -1).await?)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.conn().exists(key).await?)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.conn().del::<_, ()>(key).await?;
        Ok(())
    }

    async fn copy_scored(&self, src: &str, dst: &str, score: f64) -> StoreResult<usize> {
        let members = self.zmembers(src).await?;
        if members.is_empty() {
            return Ok(0);
        }
        let score = score_arg(score);
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(dst).arg("NX");
        for member in &members {
            cmd.arg(&score).arg(member);
        }
        let added: i64 = cmd.query_async(&mut self.conn()).await?;
        Ok(added.max(0) as usize)
    }
}
