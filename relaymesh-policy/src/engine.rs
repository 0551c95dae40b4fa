//! The policy engine itself (SPEC_FULL.md §4.1): a fixed `First` step that
//! loads the candidate pool, a configurable chain of
//! [`WorkerPolicy`] implementations, and a fixed `Last` step that picks the
//! highest-scoring survivor.

use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use relaymesh_model::MailStatus;
use relaymesh_registry::WorkerRegistry;
use thiserror::Error;

use crate::context::{PolicyContext, PolicyDeps, WorkerView};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Registry(#[from] relaymesh_registry::RegistryError),

    #[error(transparent)]
    Kv(#[from] relaymesh_kvstore::KvError),

    #[error(transparent)]
    Repository(#[from] relaymesh_model::RepositoryError),
}

pub type Result<T> = std::result::Result<T, PolicyError>;

/// One policy in the chain. `apply` narrows and/or reorders the candidate
/// list; the save hooks drive the non-idempotent counters some policies
/// (warm-up) keep alongside `MailStatus` rows.
#[async_trait]
pub trait WorkerPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(
        &self,
        ctx: &PolicyContext,
        deps: &PolicyDeps,
        workers: Vec<WorkerView>,
    ) -> Result<Vec<WorkerView>>;

    async fn on_status_pre_save(&self, _ctx: &PolicyContext, _deps: &PolicyDeps, _status: &MailStatus) -> Result<()> {
        Ok(())
    }

    async fn on_status_post_save(&self, _ctx: &PolicyContext, _deps: &PolicyDeps, _status: &MailStatus) -> Result<()> {
        Ok(())
    }
}

pub struct PolicyEngine {
    deps: PolicyDeps,
    registry: Arc<WorkerRegistry>,
    chain: Vec<Arc<dyn WorkerPolicy>>,
}

impl PolicyEngine {
    #[must_use]
    pub fn new(deps: PolicyDeps, registry: Arc<WorkerRegistry>, chain: Vec<Arc<dyn WorkerPolicy>>) -> Self {
        Self { deps, registry, chain }
    }

    #[must_use]
    pub fn deps(&self) -> &PolicyDeps {
        &self.deps
    }

    /// First: load the enabled-worker pool. Chain: run each configured
    /// policy in order. Last: pick the highest-scoring survivor, breaking
    /// ties at random.
    pub async fn find_worker(&self, ctx: &PolicyContext) -> Result<Option<WorkerView>> {
        let snapshots = self.registry.enabled_workers().await?;
        let mut workers: Vec<WorkerView> = snapshots
            .into_iter()
            .map(|snapshot| WorkerView {
                ip: snapshot.ip,
                name: snapshot.name,
                policies_settings: snapshot.policies_settings,
                next_available: ctx.not_before.unwrap_or(ctx.now),
                score: 0.0,
            })
            .collect();

        for policy in &self.chain {
            workers = policy.apply(ctx, &self.deps, workers).await?;
        }

        Ok(pick_highest_scoring(workers))
    }

    /// Runs every policy's pre-save hook, appends `status` to the durable
    /// log, then runs every policy's post-save hook. This is the single
    /// path through which a `MailStatus` row is ever written, so counters
    /// that must stay consistent with the log (warm-up's daily tallies)
    /// can hook in here instead of re-deriving state from the log.
    pub async fn record_status(&self, ctx: &PolicyContext, status: MailStatus) -> Result<()> {
        for policy in &self.chain {
            policy.on_status_pre_save(ctx, &self.deps, &status).await?;
        }
        self.deps.repository.append(status.clone()).await?;
        for policy in &self.chain {
            policy.on_status_post_save(ctx, &self.deps, &status).await?;
        }
        Ok(())
    }
}

fn pick_highest_scoring(workers: Vec<WorkerView>) -> Option<WorkerView> {
    let max_score = workers
        .iter()
        .map(|worker| worker.score)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max_score.is_finite() {
        return None;
    }
    let tied: Vec<&WorkerView> = workers
        .iter()
        .filter(|worker| (worker.score - max_score).abs() < f64::EPSILON)
        .collect();
    tied.choose(&mut rand::rng()).map(|&worker| worker.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relaymesh_common::{Domain, MailId};
    use relaymesh_kvstore::InMemoryKvStore;
    use relaymesh_model::{InMemoryStatusRepository, InMemoryWorkerStore, Worker};

    fn engine(workers: Vec<Worker>, chain: Vec<Arc<dyn WorkerPolicy>>) -> PolicyEngine {
        let kv = Arc::new(InMemoryKvStore::new());
        let repository = Arc::new(InMemoryStatusRepository::new());
        let registry = Arc::new(WorkerRegistry::new(kv.clone(), Arc::new(InMemoryWorkerStore::seeded(workers))));
        PolicyEngine::new(PolicyDeps { kv, repository }, registry, chain)
    }

    #[tokio::test]
    async fn find_worker_returns_none_when_no_workers_enabled() {
        let engine = engine(vec![], vec![]);
        let ctx = PolicyContext::new(MailId::generate(), Default::default(), Domain::new("example.com"));
        assert!(engine.find_worker(&ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_worker_with_empty_chain_picks_among_zero_scored_candidates() {
        let engine = engine(vec![Worker::new("a", "10.0.0.1")], vec![]);
        let ctx = PolicyContext::new(MailId::generate(), Default::default(), Domain::new("example.com"));
        let worker = engine.find_worker(&ctx).await.unwrap().unwrap();
        assert_eq!(worker.ip, "10.0.0.1");
    }

    #[tokio::test]
    async fn record_status_appends_to_repository() {
        let engine = engine(vec![], vec![]);
        let ctx = PolicyContext::new(MailId::generate(), Default::default(), Domain::new("example.com"));
        let status = MailStatus::new(ctx.identifier.clone(), relaymesh_model::Status::Sending, "10.0.0.1", ctx.destination_domain.clone())
            .with_creation_date(Utc::now());
        engine.record_status(&ctx, status).await.unwrap();
        assert!(engine.deps.repository.find_terminal(&ctx.identifier).await.unwrap().is_none());
    }
}
