//! The `KVStore` interface named in SPEC_FULL.md §9: the routing lock and
//! the status cache (counters, sorted sets, tokens) are expressed purely in
//! terms of this trait so the router, delivery task, and policy engine
//! never touch a concrete cache client directly.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// One entry of a `zrangebyscore` result: the member string and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub member: String,
    pub score: f64,
}

#[async_trait]
pub trait KVStore: Send + Sync + std::fmt::Debug {
    /// `SET key value NX EX ttl`. Returns `true` if the key was set (i.e.
    /// the caller now holds the lock/sentinel), `false` if it already
    /// existed.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Unconditional `SET key value EX ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn del(&self, key: &str) -> Result<bool>;

    /// Atomically add `by` to the integer at `key`, creating it with an
    /// initial value of `by` (and no TTL) if absent. Implementations that
    /// need the "create with TTL on first touch" dance (SPEC_FULL.md
    /// §4.5's warm-up counters) should call [`KVStore::get`] then
    /// [`KVStore::set_ex`] themselves, mirroring the reference's explicit
    /// `if conn.get(key) is None: conn.set(key, ..., TTL)` guard — `incr`
    /// alone does not carry a TTL.
    async fn incr(&self, key: &str, by: i64) -> Result<i64>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Inclusive range query, ordered ascending by score (matches Redis
    /// `ZRANGEBYSCORE`).
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<ScoredMember>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>>;

    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;

    /// Keys whose name starts with `prefix` (a stand-in for Redis `SCAN`
    /// with a `MATCH prefix*` cursor loop).
    async fn scan(&self, prefix: &str) -> Result<Vec<String>>;

    /// Apply a TTL to an existing key without expiring sooner entries.
    /// Used when an `incr`-created key needs its expiry set after the
    /// fact (mirrors the reference's "set once, then INCR" pattern).
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
}
