//! An in-memory `TaskBus`, used by every crate's test suite and by the
//! single-binary sandbox mode.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::bus::{BusError, Command, Result, TaskBus};

struct Scheduled<T> {
    available_at: Instant,
    payload: T,
}

#[derive(Default)]
struct Queues<T> {
    routes: HashMap<String, Vec<Scheduled<T>>>,
}

pub struct InMemoryTaskBus<T> {
    queues: Mutex<Queues<T>>,
    reachable: Mutex<Vec<String>>,
}

impl<T> std::fmt::Debug for InMemoryTaskBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTaskBus").finish_non_exhaustive()
    }
}

impl<T> Default for InMemoryTaskBus<T> {
    fn default() -> Self {
        Self {
            queues: Mutex::new(Queues { routes: HashMap::new() }),
            reachable: Mutex::new(Vec::new()),
        }
    }
}

impl<T> InMemoryTaskBus<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/sandbox helper: mark `name` as responding to `ping`.
    pub fn set_reachable(&self, names: impl IntoIterator<Item = String>) {
        *self.reachable.lock() = names.into_iter().collect();
    }
}

#[async_trait]
impl<T> TaskBus<T> for InMemoryTaskBus<T>
where
    T: Send + Sync + Clone + 'static,
{
    async fn enqueue(&self, route_key: &str, payload: T, delay: Duration) -> Result<()> {
        let available_at = Instant::now() + delay;
        self.queues
            .lock()
            .routes
            .entry(route_key.to_owned())
            .or_default()
            .push(Scheduled { available_at, payload });
        Ok(())
    }

    async fn pop(&self, route_key: &str) -> Result<Option<T>> {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.routes.get_mut(route_key) else {
            return Ok(None);
        };
        let now = Instant::now();
        let Some(index) = queue.iter().position(|entry| entry.available_at <= now) else {
            return Ok(None);
        };
        Ok(Some(queue.remove(index).payload))
    }

    async fn ack(&self, _route_key: &str) -> Result<()> {
        Ok(())
    }

    async fn nack(&self, route_key: &str, payload: T, delay: Duration) -> Result<()> {
        self.enqueue(route_key, payload, delay).await
    }

    async fn ping(&self, names: &[String], _timeout: Duration) -> Result<Vec<String>> {
        let reachable = self.reachable.lock();
        Ok(names
            .iter()
            .filter(|name| reachable.contains(name))
            .cloned()
            .collect())
    }

    async fn broadcast(&self, _command: Command, destination: &str) -> Result<()> {
        if destination.is_empty() {
            return Err(BusError::UnknownQueue(destination.to_owned()));
        }
        Ok(())
    }

    async fn drain(&self, route_key: &str, budget: usize) -> Result<Vec<T>> {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.routes.get_mut(route_key) else {
            return Ok(Vec::new());
        };
        let now = Instant::now();
        let take = budget.min(queue.len());
        let mut drained = Vec::with_capacity(take);
        let mut remaining = Vec::with_capacity(queue.len());
        for entry in queue.drain(..) {
            if drained.len() < take && entry.available_at <= now {
                drained.push(entry.payload);
            } else {
                remaining.push(entry);
            }
        }
        *queue = remaining;
        Ok(drained)
    }

    async fn len(&self, route_key: &str) -> Result<usize> {
        Ok(self
            .queues
            .lock()
            .routes
            .get(route_key)
            .map_or(0, Vec::len))
    }
}
