//! The `workers` hash and its hydration from the relational store
//! (SPEC_FULL.md §4.9): "the cached representation exists iff the worker's
//! `enabled` flag is true".

use std::sync::Arc;

use relaymesh_kvstore::KVStore;
use relaymesh_model::{Worker, WorkerSnapshot, WorkerStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Kv(#[from] relaymesh_kvstore::KvError),

    #[error(transparent)]
    Store(#[from] relaymesh_model::WorkerStoreError),

    #[error("cached worker snapshot for {0:?} is corrupt: {1}")]
    CorruptSnapshot(String, serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug)]
pub struct WorkerRegistry {
    kv: Arc<dyn KVStore>,
    store: Arc<dyn WorkerStore>,
}

impl WorkerRegistry {
    #[must_use]
    pub fn new(kv: Arc<dyn KVStore>, store: Arc<dyn WorkerStore>) -> Self {
        Self { kv, store }
    }

    /// The enabled-worker set, hydrating the cache from the relational
    /// store the first time it is found empty.
    pub async fn enabled_workers(&self) -> Result<Vec<WorkerSnapshot>> {
        let cached = self.kv.hgetall(&relaymesh_common::keys::workers_hash()).await?;
        if !cached.is_empty() {
            return cached
                .into_iter()
                .map(|(ip, json)| {
                    serde_json::from_str(&json).map_err(|err| RegistryError::CorruptSnapshot(ip, err))
                })
                .collect();
        }

        let workers = self.store.enabled_workers().await?;
        let mut snapshots = Vec::with_capacity(workers.len());
        for worker in &workers {
            self.set_to_cache(worker).await?;
            snapshots.push(worker.to_cache_snapshot());
        }
        Ok(snapshots)
    }

    /// Write `worker`'s snapshot into the cache. Callers that flip
    /// `enabled` to `false` should call [`Self::remove_from_cache`]
    /// instead — the cache only ever holds enabled workers.
    pub async fn set_to_cache(&self, worker: &Worker) -> Result<()> {
        let encoded = serde_json::to_string(&worker.to_cache_snapshot())
            .map_err(|err| RegistryError::CorruptSnapshot(worker.ip.clone(), err))?;
        self.kv
            .hset(&relaymesh_common::keys::workers_hash(), &worker.ip, &encoded)
            .await?;
        Ok(())
    }

    pub async fn remove_from_cache(&self, ip: &str) -> Result<()> {
        self.kv.hdel(&relaymesh_common::keys::workers_hash(), ip).await?;
        Ok(())
    }

    /// Persist `worker` to the relational store and keep the cache in
    /// sync with its `enabled` flag — the single write path every mutation
    /// (enable/disable/create) should go through.
    pub async fn save(&self, worker: Worker) -> Result<()> {
        if worker.enabled {
            self.set_to_cache(&worker).await?;
        } else {
            self.remove_from_cache(&worker.ip).await?;
        }
        self.store.save(worker).await?;
        Ok(())
    }

    pub async fn enable(&self, ip: &str) -> Result<bool> {
        let Some(mut worker) = self.store.find_by_ip(ip).await? else {
            return Ok(false);
        };
        worker.enabled = true;
        worker.update_date = chrono::Utc::now();
        self.save(worker).await?;
        Ok(true)
    }

    pub async fn disable(&self, ip: &str) -> Result<bool> {
        let Some(mut worker) = self.store.find_by_ip(ip).await? else {
            return Ok(false);
        };
        worker.enabled = false;
        worker.update_date = chrono::Utc::now();
        self.save(worker).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_kvstore::InMemoryKvStore;
    use relaymesh_model::InMemoryWorkerStore;

    fn registry_with(workers: Vec<Worker>) -> WorkerRegistry {
        WorkerRegistry::new(
            Arc::new(InMemoryKvStore::new()),
            Arc::new(InMemoryWorkerStore::seeded(workers)),
        )
    }

    #[tokio::test]
    async fn enabled_workers_hydrates_cache_from_store_when_empty() {
        let registry = registry_with(vec![Worker::new("a", "10.0.0.1"), Worker::new("b", "10.0.0.2")]);
        let snapshots = registry.enabled_workers().await.unwrap();
        assert_eq!(snapshots.len(), 2);

        // Second call reads straight from cache; still sees both entries.
        let again = registry.enabled_workers().await.unwrap();
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn disabled_workers_are_not_hydrated_into_cache() {
        let mut disabled = Worker::new("c", "10.0.0.3");
        disabled.enabled = false;
        let registry = registry_with(vec![Worker::new("a", "10.0.0.1"), disabled]);
        let snapshots = registry.enabled_workers().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].ip, "10.0.0.1");
    }

    #[tokio::test]
    async fn disable_removes_the_worker_from_cache() {
        let registry = registry_with(vec![Worker::new("a", "10.0.0.1")]);
        registry.enabled_workers().await.unwrap();
        assert!(registry.disable("10.0.0.1").await.unwrap());
        let snapshots = registry.enabled_workers().await.unwrap();
        assert!(snapshots.is_empty());
    }

    #[tokio::test]
    async fn enable_unknown_ip_returns_false() {
        let registry = registry_with(vec![]);
        assert!(!registry.enable("10.0.0.9").await.unwrap());
    }
}
