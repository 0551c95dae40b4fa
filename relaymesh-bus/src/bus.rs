//! The `TaskBus` abstraction (§9): enqueue/ack/nack/ping/broadcast plus a
//! bounded `drain` used by the registry's GC sweeps (§9.1 decision 4).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("queue {0:?} does not exist")]
    UnknownQueue(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

pub type Result<T> = std::result::Result<T, BusError>;

/// A broadcastable control command, delivered to a named worker's control
/// channel rather than a work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Shutdown,
    Ping,
}

#[async_trait]
pub trait TaskBus<T>: Send + Sync + std::fmt::Debug
where
    T: Send + Sync + Clone + 'static,
{
    /// Schedule `payload` onto `route_key`, visible to consumers after
    /// `delay` elapses.
    async fn enqueue(&self, route_key: &str, payload: T, delay: Duration) -> Result<()>;

    /// Remove and return up to one message from `route_key`, if any is
    /// currently visible.
    async fn pop(&self, route_key: &str) -> Result<Option<T>>;

    /// Acknowledge successful processing of a previously popped message.
    /// The in-memory bus has nothing to do here since `pop` already
    /// removed it; kept for parity with at-least-once broker semantics.
    async fn ack(&self, route_key: &str) -> Result<()>;

    /// Requeue a message after a failed processing attempt.
    async fn nack(&self, route_key: &str, payload: T, delay: Duration) -> Result<()>;

    /// Send a liveness probe to each named destination, returning the
    /// subset that replied within `timeout`.
    async fn ping(&self, names: &[String], timeout: Duration) -> Result<Vec<String>>;

    /// Send `command` to `destination`'s control channel.
    async fn broadcast(&self, command: Command, destination: &str) -> Result<()>;

    /// Drain up to `budget` currently-visible messages from `route_key`
    /// (§9.1 decision 4: bounded by the queue size sampled at call time,
    /// not chased if the queue grows mid-drain).
    async fn drain(&self, route_key: &str, budget: usize) -> Result<Vec<T>>;

    /// Number of currently-visible messages on `route_key`.
    async fn len(&self, route_key: &str) -> Result<usize>;
}
