//! `send_email` (SPEC_FULL.md §4.7): deliver one envelope through the
//! configured [`Relay`], recording the outcome and re-routing on
//! transient failure via the exponential back-off schedule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relaymesh_bus::{queues, DeliveryMessage, Reply, RoutingMessage, TaskBus};
use relaymesh_common::{keys, Domain, MailId};
use relaymesh_kvstore::KVStore;
use relaymesh_model::{MailStatus, Status, StatusRepository};
use relaymesh_policy::{PolicyContext, PolicyEngine};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::backoff::{self, RetryPolicy};
use crate::relay::{Envelope, Relay, RelayError};

#[derive(Debug, Error)]
pub enum DeliveryError {
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

pub type Result<T> = std::result::Result<T, DeliveryError>;

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    AlreadyTerminal,
    /// The token in the cache didn't match this message's: a superseded
    /// delivery task, discarded silently.
    StaleDuplicate,
    Delivered,
    Bounced,
    /// Transient failure, re-routed for another attempt.
    Delayed,
    /// Transient failure, but the cumulative back-off budget is spent.
    Dropped,
}

pub struct WorkerContext {
    pub kv: Arc<dyn KVStore>,
    pub repository: Arc<dyn StatusRepository>,
    pub policy_engine: Arc<PolicyEngine>,
    pub routing_bus: Arc<dyn TaskBus<RoutingMessage>>,
    pub relay: Arc<dyn Relay>,
    pub retry_policy: RetryPolicy,
}

#[instrument(skip(ctx, message), fields(identifier = %message.identifier, attempts = message.attempts))]
pub async fn send_email(ctx: &WorkerContext, message: DeliveryMessage) -> Result<DeliveryOutcome> {
    if ctx.repository.find_terminal(&message.identifier).await?.is_some() {
        return Ok(DeliveryOutcome::AlreadyTerminal);
    }

    let destination_domain = Domain::from_address(&message.recipient)
        .map_err(|_| DeliveryError::InvalidRecipient(message.recipient.clone()))?;

    let token_key = keys::token(message.identifier.as_str());
    let reply = match ctx.kv.get(&token_key).await? {
        None => {
            warn!(identifier = %message.identifier, "delivery token missing, treating as transient");
            Err(Reply {
                code: 400,
                enhanced_status_code: Some("4.0.0".to_owned()),
                message: "no delivery token on record".to_owned(),
            })
        }
        Some(stored) if stored != message.token.to_string() => return Ok(DeliveryOutcome::StaleDuplicate),
        Some(_) => {
            let envelope = Envelope {
                sender: message.sender.clone(),
                recipient: message.recipient.clone(),
                headers: message.headers.clone(),
            };
            ctx.relay.deliver(&envelope, message.attempts).await.map_err(|err| match err {
                RelayError::Transient(reply) | RelayError::Permanent(reply) => reply,
                RelayError::Io(detail) => Reply {
                    code: 421,
                    enhanced_status_code: None,
                    message: detail,
                },
            })
        }
    };

    match classify(reply) {
        Classified::Delivered(reply) => {
            finalize(ctx, &message, &destination_domain, Status::Delivered, reply).await?;
            Ok(DeliveryOutcome::Delivered)
        }
        Classified::Permanent(reply) => {
            finalize(ctx, &message, &destination_domain, Status::Bounced, reply).await?;
            Ok(DeliveryOutcome::Bounced)
        }
        Classified::Transient(reply) => handle_transient(ctx, message, destination_domain, reply).await,
    }
}

enum Classified {
    Delivered(Reply),
    Permanent(Reply),
    Transient(Reply),
}

/// The relay's own `Ok`/`Err` split already tells transient from
/// permanent apart for real deliveries; the synthetic missing-token and
/// I/O replies above are folded into this by their status code instead.
fn classify(reply: std::result::Result<Reply, Reply>) -> Classified {
    match reply {
        Ok(reply) => Classified::Delivered(reply),
        Err(reply) if (500..600).contains(&reply.code) => Classified::Permanent(reply),
        Err(reply) => Classified::Transient(reply),
    }
}

async fn handle_transient(
    ctx: &WorkerContext,
    message: DeliveryMessage,
    destination_domain: Domain,
    reply: Reply,
) -> Result<DeliveryOutcome> {
    if reply.message.to_ascii_lowercase().contains("greylist") {
        let key = keys::greylist(message.identifier.as_str());
        let value = format!("{}:{}", message.source_ip, Utc::now().timestamp());
        ctx.kv
            .set_ex(&key, &value, std::time::Duration::from_secs(relaymesh_common::defaults::mailstatus_cache_timeout_secs()))
            .await?;
    }

    let attempt_number = message.attempts + 1;
    let Some(wait_secs) = backoff::next_delay_secs(attempt_number, &ctx.retry_policy) else {
        finalize(ctx, &message, &destination_domain, Status::Dropped, reply.clone()).await?;
        warn!(identifier = %message.identifier, "retry budget exhausted, dropping");
        return Ok(DeliveryOutcome::Dropped);
    };

    let not_before = Utc::now() + chrono::Duration::seconds(wait_secs.round() as i64);
    record_delayed(ctx, &message, &destination_domain, &reply, not_before).await?;

    let identifier = message.identifier.clone();
    let routing = RoutingMessage {
        identifier: message.identifier,
        headers: message.headers,
        sender: message.sender,
        recipient: message.recipient,
        attempts: attempt_number,
        not_before: Some(not_before),
        reply: Some(reply),
    };
    ctx.routing_bus.enqueue(&queues::routing_queue(), routing, std::time::Duration::ZERO).await?;
    info!(identifier = %identifier, "re-routed after transient failure");
    Ok(DeliveryOutcome::Delayed)
}

async fn record_delayed(
    ctx: &WorkerContext,
    message: &DeliveryMessage,
    destination_domain: &Domain,
    reply: &Reply,
    not_before: DateTime<Utc>,
) -> Result<()> {
    let policy_ctx = policy_ctx_for(message, destination_domain, Some(reply.clone()));
    let status = MailStatus::new(message.identifier.clone(), Status::Delayed, &message.source_ip, destination_domain.clone())
        .with_creation_date(not_before)
        .with_reply(Some(reply.code.to_string()), Some(reply.message.clone()));
    ctx.policy_engine.record_status(&policy_ctx, status).await?;
    Ok(())
}

async fn finalize(
    ctx: &WorkerContext,
    message: &DeliveryMessage,
    destination_domain: &Domain,
    status: Status,
    reply: Reply,
) -> Result<()> {
    let policy_ctx = policy_ctx_for(message, destination_domain, None);
    let mail_status = MailStatus::new(message.identifier.clone(), status, &message.source_ip, destination_domain.clone())
        .with_reply(Some(reply.code.to_string()), Some(reply.message));
    ctx.policy_engine.record_status(&policy_ctx, mail_status).await?;
    ctx.kv.del(&keys::token(message.identifier.as_str())).await?;
    Ok(())
}

fn policy_ctx_for(message: &DeliveryMessage, destination_domain: &Domain, reply: Option<Reply>) -> PolicyContext {
    PolicyContext::new(message.identifier.clone(), message.headers.clone(), destination_domain.clone()).with_reply(reply)
}
