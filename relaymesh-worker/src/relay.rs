//! The `Relay` trait boundary (SPEC_FULL.md §4.7.1): the SMTP client
//! itself is out of scope, so delivery is expressed against this trait and
//! a [`SandboxRelay`] stands in for it in tests and the sandbox binary.

use std::collections::HashMap;

use async_trait::async_trait;
use relaymesh_bus::Reply;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: String,
    pub recipient: String,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("transient: {0:?}")]
    Transient(Reply),

    #[error("permanent: {0:?}")]
    Permanent(Reply),

    #[error("connection error: {0}")]
    Io(String),
}

#[async_trait]
pub trait Relay: Send + Sync {
    async fn deliver(&self, envelope: &Envelope, attempt: u32) -> Result<Reply, RelayError>;
}

/// Always succeeds with a synthetic `250` reply; used by the single-binary
/// sandbox mode and every delivery-task test, since no concrete SMTP
/// client is part of this crate's scope.
#[derive(Debug, Default)]
pub struct SandboxRelay;

impl SandboxRelay {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Relay for SandboxRelay {
    async fn deliver(&self, envelope: &Envelope, _attempt: u32) -> Result<Reply, RelayError> {
        Ok(Reply {
            code: 250,
            enhanced_status_code: Some("2.0.0".to_owned()),
            message: format!("sandbox accepted delivery to {}", envelope.recipient),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sandbox_relay_always_succeeds() {
        let relay = SandboxRelay::new();
        let envelope = Envelope {
            sender: "from@example.com".to_owned(),
            recipient: "to@example.com".to_owned(),
            headers: HashMap::new(),
        };
        let reply = relay.deliver(&envelope, 0).await.unwrap();
        assert_eq!(reply.code, 250);
    }
}
