//! An in-memory `KVStore`, used by every crate's test suite and by the
//! `ctl`-less single-binary sandbox mode. Mirrors the structural shape of
//! `empath_delivery::rate_limiter::RateLimiter` and
//! `empath_delivery::circuit_breaker::CircuitBreaker`: a `DashMap` keyed by
//! cache key, each value guarded by a `parking_lot::Mutex` for the
//! compound read-modify-write operations (`incr`, `set_nx_ex`).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{KvError, Result};
use crate::store::{KVStore, ScoredMember};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    ZSet(Vec<(String, f64)>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// An in-memory stand-in for the Redis-backed cache described in
/// SPEC_FULL.md §3 and §9.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: DashMap<String, Mutex<Entry>>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_live(&self, key: &str) -> Option<dashmap::mapref::one::Ref<'_, String, Mutex<Entry>>> {
        match self.entries.get(key) {
            Some(guard) => {
                if guard.lock().is_expired() {
                    drop(guard);
                    self.entries.remove(key);
                    None
                } else {
                    Some(guard)
                }
            }
            None => None,
        }
    }
}

#[async_trait]
impl KVStore for InMemoryKvStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        if self.get_live(key).is_some() {
            return Ok(false);
        }
        self.entries.insert(
            key.to_owned(),
            Mutex::new(Entry {
                value: Value::Str(value.to_owned()),
                expires_at: Some(Instant::now() + ttl),
            }),
        );
        Ok(true)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_owned(),
            Mutex::new(Entry {
                value: Value::Str(value.to_owned()),
                expires_at: Some(Instant::now() + ttl),
            }),
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(guard) = self.get_live(key) else {
            return Ok(None);
        };
        let locked = guard.lock();
        match &locked.value {
            Value::Str(s) => Ok(Some(s.clone())),
            _ => Err(KvError::WrongType(key.to_owned())),
        }
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        if let Some(guard) = self.get_live(key) {
            let mut entry = guard.lock();
            match &mut entry.value {
                Value::Str(s) => {
                    let current: i64 = s.parse().unwrap_or(0);
                    let next = current + by;
                    *s = next.to_string();
                    Ok(next)
                }
                _ => Err(KvError::WrongType(key.to_owned())),
            }
        } else {
            self.entries.insert(
                key.to_owned(),
                Mutex::new(Entry {
                    value: Value::Str(by.to_string()),
                    expires_at: None,
                }),
            );
            Ok(by)
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| {
                Mutex::new(Entry {
                    value: Value::ZSet(Vec::new()),
                    expires_at: None,
                })
            });
        let mut guard = entry.lock();
        match &mut guard.value {
            Value::ZSet(members) => {
                members.retain(|(m, _)| m != member);
                members.push((member.to_owned(), score));
                Ok(())
            }
            _ => Err(KvError::WrongType(key.to_owned())),
        }
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<Vec<ScoredMember>> {
        let Some(guard) = self.get_live(key) else {
            return Ok(Vec::new());
        };
        let locked = guard.lock();
        match &locked.value {
            Value::ZSet(members) => {
                let mut matching: Vec<ScoredMember> = members
                    .iter()
                    .filter(|(_, score)| *score >= min && *score <= max)
                    .map(|(member, score)| ScoredMember {
                        member: member.clone(),
                        score: *score,
                    })
                    .collect();
                matching.sort_by(|a, b| a.score.total_cmp(&b.score));
                Ok(matching)
            }
            _ => Err(KvError::WrongType(key.to_owned())),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let entry = self.entries.entry(key.to_owned()).or_insert_with(|| {
            Mutex::new(Entry {
                value: Value::Hash(HashMap::new()),
                expires_at: None,
            })
        });
        let mut guard = entry.lock();
        match &mut guard.value {
            Value::Hash(map) => {
                map.insert(field.to_owned(), value.to_owned());
                Ok(())
            }
            _ => Err(KvError::WrongType(key.to_owned())),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let Some(guard) = self.get_live(key) else {
            return Ok(None);
        };
        let locked = guard.lock();
        match &locked.value {
            Value::Hash(map) => Ok(map.get(field).cloned()),
            _ => Err(KvError::WrongType(key.to_owned())),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        let Some(guard) = self.get_live(key) else {
            return Ok(Vec::new());
        };
        let locked = guard.lock();
        match &locked.value {
            Value::Hash(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            _ => Err(KvError::WrongType(key.to_owned())),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let Some(guard) = self.get_live(key) else {
            return Ok(false);
        };
        let mut locked = guard.lock();
        match &mut locked.value {
            Value::Hash(map) => Ok(map.remove(field).is_some()),
            _ => Err(KvError::WrongType(key.to_owned())),
        }
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().lock().is_expired())
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(guard) = self.get_live(key) {
            guard.lock().expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_ex_only_succeeds_once() {
        let store = InMemoryKvStore::new();
        assert!(
            store
                .set_nx_ex("lock:routing:example.com:default", "true", Duration::from_secs(5))
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_nx_ex("lock:routing:example.com:default", "true", Duration::from_secs(5))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn set_nx_ex_expires() {
        let store = InMemoryKvStore::new();
        store
            .set_nx_ex("lock", "true", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(
            store
                .set_nx_ex("lock", "true", Duration::from_secs(5))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn incr_creates_and_accumulates() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.incr("counter", 1).await.unwrap(), 1);
        assert_eq!(store.incr("counter", 1).await.unwrap(), 2);
        assert_eq!(store.incr("counter", -1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zadd_and_zrangebyscore_orders_ascending() {
        let store = InMemoryKvStore::new();
        store.zadd("rl", "a:100", 100.0).await.unwrap();
        store.zadd("rl", "b:50", 50.0).await.unwrap();
        store.zadd("rl", "c:200", 200.0).await.unwrap();

        let results = store.zrangebyscore("rl", 0.0, f64::INFINITY).await.unwrap();
        let members: Vec<&str> = results.iter().map(|m| m.member.as_str()).collect();
        assert_eq!(members, vec!["b:50", "a:100", "c:200"]);
    }

    #[tokio::test]
    async fn zrangebyscore_respects_min_cutoff() {
        let store = InMemoryKvStore::new();
        store.zadd("rl", "old", 10.0).await.unwrap();
        store.zadd("rl", "new", 90.0).await.unwrap();

        let results = store.zrangebyscore("rl", 50.0, f64::INFINITY).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].member, "new");
    }

    #[tokio::test]
    async fn hash_roundtrip() {
        let store = InMemoryKvStore::new();
        store.hset("workers", "10.0.0.1", "{}").await.unwrap();
        assert_eq!(
            store.hget("workers", "10.0.0.1").await.unwrap(),
            Some("{}".to_owned())
        );
        assert!(store.hdel("workers", "10.0.0.1").await.unwrap());
        assert_eq!(store.hget("workers", "10.0.0.1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_matches_prefix_only() {
        let store = InMemoryKvStore::new();
        store.set_ex("status:greylist:a", "x", Duration::from_secs(60)).await.unwrap();
        store.set_ex("status:greylist:b", "x", Duration::from_secs(60)).await.unwrap();
        store.set_ex("token:a", "x", Duration::from_secs(60)).await.unwrap();

        let mut keys = store.scan("status:greylist:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["status:greylist:a", "status:greylist:b"]);
    }

    #[tokio::test]
    async fn del_removes_key() {
        let store = InMemoryKvStore::new();
        store.set_ex("token:x", "abc", Duration::from_secs(60)).await.unwrap();
        assert!(store.del("token:x").await.unwrap());
        assert_eq!(store.get("token:x").await.unwrap(), None);
    }
}
