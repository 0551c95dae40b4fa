//! Periodic garbage-collection sweeps run by the `gc` process
//! (SPEC_FULL.md §4.9.1): liveness pings, disabling unresponsive workers,
//! draining a disabled worker's stranded queues, and flushing the
//! queued-mail backlog back onto the routing queue.

use std::sync::Arc;
use std::time::Duration;

use relaymesh_bus::{queues, DeliveryMessage, Reply, RoutingMessage, TaskBus};
use relaymesh_common::{defaults, keys};
use relaymesh_kvstore::KVStore;
use relaymesh_model::WorkerStore;
use tracing::{info, warn};

use crate::registry::{RegistryError, WorkerRegistry};

pub type Result<T> = std::result::Result<T, GcError>;

#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Kv(#[from] relaymesh_kvstore::KvError),

    #[error(transparent)]
    Store(#[from] relaymesh_model::WorkerStoreError),

    #[error(transparent)]
    Bus(#[from] relaymesh_bus::BusError),
}

pub struct Gc {
    kv: Arc<dyn KVStore>,
    store: Arc<dyn WorkerStore>,
    registry: Arc<WorkerRegistry>,
    delivery_bus: Arc<dyn TaskBus<DeliveryMessage>>,
    routing_bus: Arc<dyn TaskBus<RoutingMessage>>,
    max_ping_failures: u32,
    ping_timeout: Duration,
}

impl Gc {
    #[must_use]
    pub fn new(
        kv: Arc<dyn KVStore>,
        store: Arc<dyn WorkerStore>,
        registry: Arc<WorkerRegistry>,
        delivery_bus: Arc<dyn TaskBus<DeliveryMessage>>,
        routing_bus: Arc<dyn TaskBus<RoutingMessage>>,
    ) -> Self {
        Self {
            kv,
            store,
            registry,
            delivery_bus,
            routing_bus,
            max_ping_failures: defaults::mx_worker_max_ping_failures(),
            ping_timeout: Duration::from_secs(3),
        }
    }

    #[must_use]
    pub fn with_max_ping_failures(mut self, max: u32) -> Self {
        self.max_ping_failures = max;
        self
    }

    /// Ping every enabled worker; disable any that accumulates more than
    /// `max_ping_failures` consecutive misses.
    pub async fn ping_workers(&self) -> Result<()> {
        let enabled = self.registry.enabled_workers().await?;
        let ips: Vec<String> = enabled.iter().map(|w| w.ip.clone()).collect();
        let reachable = self.delivery_bus.ping(&ips, self.ping_timeout).await?;

        for ip in &ips {
            let key = keys::ping_failures(ip);
            if reachable.contains(ip) {
                self.kv.del(&key).await?;
                continue;
            }
            let failures = self.bump(&key, 1, Duration::from_secs(defaults::ping_failure_ttl_secs())).await?;
            if failures as u32 > self.max_ping_failures {
                warn!(worker = %ip, failures, "disabling worker after repeated ping failures");
                self.registry.disable(ip).await?;
                self.kv.del(&key).await?;
            }
        }
        Ok(())
    }

    /// Drain both queues of every disabled worker, re-routing each
    /// stranded message back onto the routing queue with a fresh
    /// identifier's worth of attempts preserved.
    pub async fn check_disabled_workers(&self) -> Result<()> {
        for worker in self.store.disabled_workers().await? {
            for queue in [worker.get_queue_name(), worker.get_retry_queue_name()] {
                let budget = self.delivery_bus.len(&queue).await?;
                if budget == 0 {
                    continue;
                }
                let drained = self.delivery_bus.drain(&queue, budget).await?;
                info!(queue = %queue, count = drained.len(), "draining disabled worker's queue");
                for message in drained {
                    self.requeue(message, None).await?;
                }
            }
        }
        Ok(())
    }

    /// Flush the queued-mail backlog (envelopes parked because no worker
    /// was available at routing time) back onto the routing queue.
    pub async fn dispatch_queued(&self) -> Result<()> {
        let queue = queues::queued_mail_queue();
        let budget = self.routing_bus.len(&queue).await?;
        if budget == 0 {
            return Ok(());
        }
        let drained = self.routing_bus.drain(&queue, budget).await?;
        info!(count = drained.len(), "dispatching queued backlog");
        for message in drained {
            self.routing_bus.enqueue(&queues::routing_queue(), message, Duration::ZERO).await?;
        }
        Ok(())
    }

    async fn requeue(&self, message: DeliveryMessage, reply: Option<Reply>) -> Result<()> {
        let routing = RoutingMessage {
            identifier: message.identifier,
            headers: message.headers,
            sender: message.sender,
            recipient: message.recipient,
            attempts: message.attempts,
            not_before: None,
            reply,
        };
        self.routing_bus
            .enqueue(&queues::routing_queue(), routing, Duration::ZERO)
            .await?;
        Ok(())
    }

    /// `if conn.get(key) is None: conn.set(key, 0, TTL)`, then `INCR` —
    /// the pattern [`KVStore::incr`] documents for counters that need a
    /// TTL stamped on first touch.
    async fn bump(&self, key: &str, by: i64, ttl: Duration) -> Result<i64> {
        let existed = self.kv.get(key).await?.is_some();
        let value = self.kv.incr(key, by).await?;
        if !existed {
            self.kv.expire(key, ttl).await?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_bus::InMemoryTaskBus;
    use relaymesh_common::MailId;
    use relaymesh_kvstore::InMemoryKvStore;
    use relaymesh_model::{InMemoryWorkerStore, Worker};
    use std::collections::HashMap;

    fn harness(
        workers: Vec<Worker>,
    ) -> (
        Gc,
        Arc<InMemoryKvStore>,
        Arc<InMemoryTaskBus<DeliveryMessage>>,
        Arc<InMemoryTaskBus<RoutingMessage>>,
    ) {
        let kv = Arc::new(InMemoryKvStore::new());
        let store = Arc::new(InMemoryWorkerStore::seeded(workers));
        let registry = Arc::new(WorkerRegistry::new(kv.clone(), store.clone()));
        let delivery_bus = Arc::new(InMemoryTaskBus::<DeliveryMessage>::new());
        let routing_bus = Arc::new(InMemoryTaskBus::<RoutingMessage>::new());
        let gc = Gc::new(
            kv.clone(),
            store,
            registry,
            delivery_bus.clone(),
            routing_bus.clone(),
        )
        .with_max_ping_failures(2);
        (gc, kv, delivery_bus, routing_bus)
    }

    #[tokio::test]
    async fn ping_workers_disables_after_exceeding_max_failures() {
        let (gc, _kv, delivery_bus, _routing_bus) = harness(vec![Worker::new("a", "10.0.0.1")]);
        delivery_bus.set_reachable(Vec::<String>::new());

        gc.ping_workers().await.unwrap();
        gc.ping_workers().await.unwrap();
        // Two failures recorded, threshold is 2 (> comparison), still enabled.
        assert_eq!(gc.store.disabled_workers().await.unwrap().len(), 0);

        gc.ping_workers().await.unwrap();
        assert_eq!(gc.store.disabled_workers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ping_workers_resets_failures_once_reachable_again() {
        let (gc, kv, delivery_bus, _routing_bus) = harness(vec![Worker::new("a", "10.0.0.1")]);
        delivery_bus.set_reachable(Vec::<String>::new());
        gc.ping_workers().await.unwrap();
        assert_eq!(kv.get(&keys::ping_failures("10.0.0.1")).await.unwrap(), Some("1".to_owned()));

        delivery_bus.set_reachable(["10.0.0.1".to_owned()]);
        gc.ping_workers().await.unwrap();
        assert_eq!(kv.get(&keys::ping_failures("10.0.0.1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn check_disabled_workers_drains_both_queues_back_onto_routing() {
        let mut disabled = Worker::new("a", "10.0.0.1");
        disabled.enabled = false;
        let (gc, _kv, delivery_bus, routing_bus) = harness(vec![disabled.clone()]);

        let message = DeliveryMessage {
            identifier: MailId::generate(),
            headers: HashMap::new(),
            sender: "from@example.com".to_owned(),
            recipient: "to@example.com".to_owned(),
            attempts: 1,
            source_ip: "10.0.0.1".to_owned(),
            token: relaymesh_common::DeliveryToken::generate(),
        };
        delivery_bus
            .enqueue(&disabled.get_queue_name(), message, Duration::ZERO)
            .await
            .unwrap();

        gc.check_disabled_workers().await.unwrap();

        assert_eq!(delivery_bus.len(&disabled.get_queue_name()).await.unwrap(), 0);
        assert_eq!(routing_bus.len(&queues::routing_queue()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dispatch_queued_moves_backlog_onto_routing_queue() {
        let (gc, _kv, _delivery_bus, routing_bus) = harness(vec![]);
        let message = RoutingMessage {
            identifier: MailId::generate(),
            headers: HashMap::new(),
            sender: "from@example.com".to_owned(),
            recipient: "to@example.com".to_owned(),
            attempts: 0,
            not_before: None,
            reply: None,
        };
        routing_bus
            .enqueue(&queues::queued_mail_queue(), message, Duration::ZERO)
            .await
            .unwrap();

        gc.dispatch_queued().await.unwrap();

        assert_eq!(routing_bus.len(&queues::queued_mail_queue()).await.unwrap(), 0);
        assert_eq!(routing_bus.len(&queues::routing_queue()).await.unwrap(), 1);
    }
}
