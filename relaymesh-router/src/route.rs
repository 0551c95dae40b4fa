//! `route_envelope` (SPEC_FULL.md §4.6): find a worker for an envelope and
//! schedule its first delivery attempt, or reschedule the routing task
//! itself when the destination's lock is contended or no worker qualifies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use relaymesh_bus::{queues, DeliveryMessage, RoutingMessage, TaskBus};
use relaymesh_common::{defaults, keys, DeliveryToken, Domain};
use relaymesh_kvstore::KVStore;
use relaymesh_model::{MailStatus, Status, StatusRepository};
use relaymesh_policy::{PolicyContext, PolicyEngine};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::RouterConfig;
use crate::lock;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Policy(#[from] relaymesh_policy::PolicyError),

    #[error(transparent)]
    Kv(#[from] relaymesh_kvstore::KvError),

    #[error(transparent)]
    Bus(#[from] relaymesh_bus::BusError),

    #[error(transparent)]
    Repository(#[from] relaymesh_model::RepositoryError),

    #[error("recipient {0:?} has no domain part")]
    InvalidRecipient(String),
}

pub type Result<T> = std::result::Result<T, RouteError>;

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Already terminal; no-op.
    AlreadyDone,
    /// Routed to a worker's first-attempt or retry queue.
    Routed { worker_ip: String },
    /// The lock was contended; the envelope was re-enqueued.
    LockContended,
    /// No enabled worker currently qualifies; re-enqueued for later.
    NoWorkerAvailable,
}

pub struct RouterContext {
    pub kv: Arc<dyn KVStore>,
    pub repository: Arc<dyn StatusRepository>,
    pub policy_engine: Arc<PolicyEngine>,
    pub routing_bus: Arc<dyn TaskBus<RoutingMessage>>,
    pub delivery_bus: Arc<dyn TaskBus<DeliveryMessage>>,
    pub config: RouterConfig,
}

#[instrument(skip(ctx, message), fields(identifier = %message.identifier, attempts = message.attempts))]
pub async fn route_envelope(ctx: &RouterContext, message: RoutingMessage) -> Result<RouteOutcome> {
    if ctx.repository.find_terminal(&message.identifier).await?.is_some() {
        return Ok(RouteOutcome::AlreadyDone);
    }

    let destination_domain = Domain::from_address(&message.recipient)
        .map_err(|_| RouteError::InvalidRecipient(message.recipient.clone()))?;
    let pool = message
        .headers
        .get(&ctx.config.pool_header)
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "default".to_owned());

    let lock_key = keys::routing_lock(destination_domain.as_str(), &pool);
    let acquired = lock::acquire(ctx.kv.as_ref(), &lock_key, ctx.config.lock_timeout(), ctx.config.lock_waiting()).await?;
    if !acquired {
        reschedule(ctx, &message, Duration::from_secs(rand::rng().random_range(1..=6))).await?;
        return Ok(RouteOutcome::LockContended);
    }

    let result = route_under_lock(ctx, &message, destination_domain).await;
    lock::release(ctx.kv.as_ref(), &lock_key).await?;
    result
}

async fn route_under_lock(ctx: &RouterContext, message: &RoutingMessage, destination_domain: Domain) -> Result<RouteOutcome> {
    let policy_ctx = PolicyContext::new(message.identifier.clone(), message.headers.clone(), destination_domain.clone())
        .with_not_before(message.not_before)
        .with_reply(message.reply.clone());

    let Some(worker) = ctx.policy_engine.find_worker(&policy_ctx).await? else {
        warn!(identifier = %message.identifier, "no worker available, rescheduling");
        reschedule(ctx, message, ctx.config.no_worker_retry()).await?;
        return Ok(RouteOutcome::NoWorkerAvailable);
    };

    let now = Utc::now();
    let countdown = (worker.next_available - now).to_std().unwrap_or(Duration::ZERO);
    let queue = if message.attempts == 0 {
        format!("{}:{}", defaults::mx_worker_queue_prefix(), worker.ip)
    } else {
        format!("{}:{}", defaults::mx_worker_queue_retry_prefix(), worker.ip)
    };

    let token = DeliveryToken::generate();
    ctx.kv
        .set_ex(
            &keys::token(message.identifier.as_str()),
            &token.to_string(),
            Duration::from_secs(defaults::token_cache_timeout_secs()),
        )
        .await?;

    let status = MailStatus::new(message.identifier.clone(), Status::Sending, &worker.ip, destination_domain)
        .with_creation_date(worker.next_available);
    ctx.policy_engine.record_status(&policy_ctx, status).await?;

    let delivery = DeliveryMessage {
        identifier: message.identifier.clone(),
        headers: message.headers.clone(),
        sender: message.sender.clone(),
        recipient: message.recipient.clone(),
        attempts: message.attempts,
        source_ip: worker.ip.clone(),
        token,
    };
    ctx.delivery_bus.enqueue(&queue, delivery, countdown).await?;

    info!(worker = %worker.ip, queue = %queue, "routed envelope");
    Ok(RouteOutcome::Routed { worker_ip: worker.ip })
}

async fn reschedule(ctx: &RouterContext, message: &RoutingMessage, delay: Duration) -> Result<()> {
    ctx.routing_bus
        .enqueue(&queues::routing_queue(), message.clone(), delay)
        .await?;
    Ok(())
}
