//! The atomic primitives the store-backed selector is written against.
//! Each method is a single atomic operation on the backing store; nothing
//! here spans more than one key except `copy_scored`.

use crate::error::StoreResult;
use async_trait::async_trait;

#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Increment a scalar counter by one, creating it at 0 first.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Increment a hash field by one, creating it at 0 first.
    async fn hincr(&self, key: &str, field: &str) -> StoreResult<i64>;

    /// Set a hash field only if it is absent. Returns whether it was set.
    async fn hset_nx(&self, key: &str, field: &str, value: i64) -> StoreResult<bool>;

    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>>;

    async fn hget_int(&self, key: &str, field: &str) -> StoreResult<Option<i64>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Field names of a hash, empty if the key is missing.
    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Returns whether the field existed.
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;

    /// Insert or overwrite a member's score.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Insert a member only if absent. Returns whether it was inserted.
    async fn zadd_nx(&self, key: &str, member: &str, score: f64) -> StoreResult<bool>;

    /// Overwrite a member's score only if it is present.
    async fn zadd_xx(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;

    /// Returns whether the member existed.
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Highest-scored member; ties go to the lexicographically greatest member.
    async fn ztop(&self, key: &str) -> StoreResult<Option<String>>;

    async fn zmembers(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Copy every member of `src` into `dst` with `score`, leaving members
    /// already in `dst` untouched. Returns how many were inserted.
    async fn copy_scored(&self, src: &str, dst: &str, score: f64) -> StoreResult<usize>;

    async fn get_or(&self, key: &str, default: i64) -> StoreResult<i64> {
        Ok(self.get_int(key).await?.unwrap_or(default))
    }

    async fn hget_or(&self, key: &str, field: &str, default: i64) -> StoreResult<i64> {
        Ok(self.hget_int(key, field).await?.unwrap_or(default))
    }
}
