//! Assembles the in-memory backends and the policy chain from a
//! [`RelayMeshConfig`] (SPEC_FULL.md §1: the relational store, broker, and
//! cache are out-of-scope external collaborators — every role binary here
//! runs against the workspace's in-memory stand-ins instead).

use std::sync::Arc;

use relaymesh_bus::{DeliveryMessage, InMemoryTaskBus, RoutingMessage};
use relaymesh_kvstore::{InMemoryKvStore, KVStore};
use relaymesh_model::{InMemoryStatusRepository, InMemoryWorkerStore, StatusRepository, Worker, WorkerStore};
use relaymesh_policy::{GreylistPolicy, PolicyDeps, PolicyEngine, PoolPolicy, RateLimitPolicy, WarmUpPolicy, WorkerPolicy};
use relaymesh_registry::WorkerRegistry;
use relaymesh_router::RouterContext;
use relaymesh_worker::{SandboxRelay, WorkerContext};
use thiserror::Error;

use crate::config::RelayMeshConfig;

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("unknown policy {0:?} in policy_chain")]
    UnknownPolicy(String),
}

/// Every collaborator a role process might need, shared across subcommands
/// so `router`, `mx-worker`, `gc`, and the control handler all see the same
/// in-memory state within one invocation.
pub struct Runtime {
    pub kv: Arc<dyn KVStore>,
    pub repository: Arc<dyn StatusRepository>,
    pub worker_store: Arc<dyn WorkerStore>,
    pub registry: Arc<WorkerRegistry>,
    pub policy_engine: Arc<PolicyEngine>,
    pub routing_bus: Arc<InMemoryTaskBus<RoutingMessage>>,
    pub delivery_bus: Arc<InMemoryTaskBus<DeliveryMessage>>,
}

impl Runtime {
    /// # Errors
    /// Returns an error if `config.policy_chain` names an unknown policy.
    pub fn build(config: &RelayMeshConfig) -> Result<Self, WiringError> {
        let kv: Arc<dyn KVStore> = Arc::new(InMemoryKvStore::new());
        let repository: Arc<dyn StatusRepository> = Arc::new(InMemoryStatusRepository::new());
        let seeded: Vec<Worker> = config.workers.iter().cloned().map(Worker::from).collect();
        let worker_store: Arc<dyn WorkerStore> = Arc::new(InMemoryWorkerStore::seeded(seeded));
        let registry = Arc::new(WorkerRegistry::new(kv.clone(), worker_store.clone()));

        let chain = build_chain(config)?;
        let deps = PolicyDeps { kv: kv.clone(), repository: repository.clone() };
        let policy_engine = Arc::new(PolicyEngine::new(deps, registry.clone(), chain));

        Ok(Self {
            kv,
            repository,
            worker_store,
            registry,
            policy_engine,
            routing_bus: Arc::new(InMemoryTaskBus::new()),
            delivery_bus: Arc::new(InMemoryTaskBus::new()),
        })
    }

    #[must_use]
    pub fn router_context(&self, config: &RelayMeshConfig) -> RouterContext {
        RouterContext {
            kv: self.kv.clone(),
            repository: self.repository.clone(),
            policy_engine: self.policy_engine.clone(),
            routing_bus: self.routing_bus.clone(),
            delivery_bus: self.delivery_bus.clone(),
            config: config.router.clone(),
        }
    }

    #[must_use]
    pub fn worker_context(&self, config: &RelayMeshConfig) -> WorkerContext {
        WorkerContext {
            kv: self.kv.clone(),
            repository: self.repository.clone(),
            policy_engine: self.policy_engine.clone(),
            routing_bus: self.routing_bus.clone(),
            relay: Arc::new(SandboxRelay::new()),
            retry_policy: config.worker.retry_policy,
        }
    }
}

fn build_chain(config: &RelayMeshConfig) -> Result<Vec<Arc<dyn WorkerPolicy>>, WiringError> {
    config
        .policy_chain
        .iter()
        .map(|name| match name.as_str() {
            "pool" => Ok(Arc::new(PoolPolicy::new(config.router.pool_header.clone())) as Arc<dyn WorkerPolicy>),
            "greylist" => Ok(Arc::new(GreylistPolicy::new()) as Arc<dyn WorkerPolicy>),
            "rate_limit" => Ok(Arc::new(RateLimitPolicy::new()) as Arc<dyn WorkerPolicy>),
            "warm_up" => Ok(Arc::new(WarmUpPolicy::new(config.warm_up_domains.clone())) as Arc<dyn WorkerPolicy>),
            other => Err(WiringError::UnknownPolicy(other.to_owned())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_runtime() {
        let config = RelayMeshConfig::default();
        assert!(Runtime::build(&config).is_ok());
    }

    #[test]
    fn unknown_policy_name_is_rejected() {
        let mut config = RelayMeshConfig::default();
        config.policy_chain = vec!["not_a_real_policy".to_owned()];
        assert!(matches!(Runtime::build(&config), Err(WiringError::UnknownPolicy(name)) if name == "not_a_real_policy"));
    }
}
