//! Durable storage for [`Worker`](crate::worker::Worker) rows.
//!
//! Kept as its own narrow trait, mirroring [`StatusRepository`]
//! (`crate::repository`): the registry only ever needs to list enabled or
//! disabled workers and persist a single row back, never a query
//! language, so the abstraction stays a handful of methods.

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::worker::Worker;

#[derive(Debug, Error)]
pub enum WorkerStoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, WorkerStoreError>;

#[async_trait]
pub trait WorkerStore: Send + Sync + std::fmt::Debug {
    async fn enabled_workers(&self) -> Result<Vec<Worker>>;

    async fn disabled_workers(&self) -> Result<Vec<Worker>>;

    async fn find_by_ip(&self, ip: &str) -> Result<Option<Worker>>;

    /// Insert or update `worker`, keyed by its `ip`.
    async fn save(&self, worker: Worker) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryWorkerStore {
    rows: Mutex<Vec<Worker>>,
}

impl InMemoryWorkerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn seeded(workers: impl IntoIterator<Item = Worker>) -> Self {
        Self {
            rows: Mutex::new(workers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl WorkerStore for InMemoryWorkerStore {
    async fn enabled_workers(&self) -> Result<Vec<Worker>> {
        Ok(self.rows.lock().iter().filter(|w| w.enabled).cloned().collect())
    }

    async fn disabled_workers(&self) -> Result<Vec<Worker>> {
        Ok(self.rows.lock().iter().filter(|w| !w.enabled).cloned().collect())
    }

    async fn find_by_ip(&self, ip: &str) -> Result<Option<Worker>> {
        Ok(self.rows.lock().iter().find(|w| w.ip == ip).cloned())
    }

    async fn save(&self, worker: Worker) -> Result<()> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows.iter_mut().find(|w| w.ip == worker.ip) {
            *existing = worker;
        } else {
            rows.push(worker);
        }
        Ok(())
    }
}
