//! Payloads carried by the task bus.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relaymesh_common::{DeliveryToken, MailId};
use serde::{Deserialize, Serialize};

/// An SMTP reply carried alongside a re-route, so the policy engine (the
/// greylist policy in particular) can react to the failure that triggered
/// it without re-parsing the delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub enhanced_status_code: Option<String>,
    pub message: String,
}

/// Enqueued onto the routing queue: "find a worker for this envelope".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingMessage {
    pub identifier: MailId,
    pub headers: HashMap<String, String>,
    pub sender: String,
    pub recipient: String,
    pub attempts: u32,
    /// Floor set by a failed delivery attempt's back-off calculation; no
    /// policy may schedule this envelope earlier than this instant.
    pub not_before: Option<DateTime<Utc>>,
    /// The reply that caused this re-route, if any.
    pub reply: Option<Reply>,
}

/// Enqueued onto a worker's first-attempt or retry queue: "deliver this".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryMessage {
    pub identifier: MailId,
    pub headers: HashMap<String, String>,
    pub sender: String,
    pub recipient: String,
    pub attempts: u32,
    /// The worker IP this message was routed to; lets the consuming worker
    /// process confirm it is indeed the intended recipient of its own
    /// queue before it spends an SMTP connection.
    pub source_ip: String,
    #[serde(with = "token_as_string")]
    pub token: DeliveryToken,
}

mod token_as_string {
    use relaymesh_common::DeliveryToken;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(token: &DeliveryToken, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(token)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DeliveryToken, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DeliveryToken::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// A dequeued message together with the delay it was scheduled with, used
/// by `TaskBus::drain` (§9.1 decision 4).
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub route_key: String,
    pub delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_message_token_roundtrips_through_json() {
        let message = DeliveryMessage {
            identifier: MailId::generate(),
            headers: HashMap::new(),
            sender: "a@example.com".to_owned(),
            recipient: "b@example.com".to_owned(),
            attempts: 0,
            source_ip: "10.0.0.1".to_owned(),
            token: DeliveryToken::generate(),
        };
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: DeliveryMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(message, decoded);
    }
}
