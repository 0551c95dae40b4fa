//! Per-envelope context threaded through the policy engine (SPEC_FULL.md
//! §4.1) and the worker-side view each policy narrows and reorders.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use relaymesh_bus::Reply;
use relaymesh_common::{Domain, MailId};
use relaymesh_kvstore::KVStore;
use relaymesh_model::{PolicySettings, StatusRepository};

/// Everything a policy needs to know about the envelope being routed,
/// independent of any particular candidate worker.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub identifier: MailId,
    pub headers: HashMap<String, String>,
    pub destination_domain: Domain,
    /// The earliest instant this envelope may be scheduled, set by a
    /// prior failed delivery attempt's back-off calculation.
    pub not_before: Option<DateTime<Utc>>,
    /// The SMTP reply that triggered this re-route, if any.
    pub reply: Option<Reply>,
    /// Frozen once per `find_worker` call so every policy in the chain
    /// reasons about the same instant.
    pub now: DateTime<Utc>,
}

impl PolicyContext {
    #[must_use]
    pub fn new(identifier: MailId, headers: HashMap<String, String>, destination_domain: Domain) -> Self {
        Self {
            identifier,
            headers,
            destination_domain,
            not_before: None,
            reply: None,
            now: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_not_before(mut self, not_before: Option<DateTime<Utc>>) -> Self {
        self.not_before = not_before;
        self
    }

    #[must_use]
    pub fn with_reply(mut self, reply: Option<Reply>) -> Self {
        self.reply = reply;
        self
    }

    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// One candidate worker as policies see it: narrowed from the cached
/// `WorkerSnapshot`, plus the two fields the chain actually mutates.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerView {
    pub ip: String,
    pub name: String,
    pub policies_settings: PolicySettings,
    pub next_available: DateTime<Utc>,
    pub score: f64,
}

impl WorkerView {
    #[must_use]
    pub fn settings_for<T: serde::de::DeserializeOwned>(&self, policy_name: &str) -> Option<T> {
        self.policies_settings
            .get(policy_name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Shared collaborators every policy needs: the cache and the durable
/// status log.
#[derive(Clone)]
pub struct PolicyDeps {
    pub kv: Arc<dyn KVStore>,
    pub repository: Arc<dyn StatusRepository>,
}
