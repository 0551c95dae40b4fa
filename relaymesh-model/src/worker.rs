//! `Worker`: a persistent record identifying one SMTP-capable source
//! (SPEC_FULL.md §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-policy settings, keyed by the policy's short name (`pool`,
/// `rate_limit`, `greylist`, `warm_up`). Each value is an arbitrary JSON
/// document; policies parse their own slice of it.
pub type PolicySettings = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub name: String,
    pub ip: String,
    pub creation_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
    pub enabled: bool,
    #[serde(default)]
    pub policies_settings: PolicySettings,
}

impl Worker {
    #[must_use]
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            ip: ip.into(),
            creation_date: now,
            update_date: now,
            enabled: true,
            policies_settings: PolicySettings::new(),
        }
    }

    #[must_use]
    pub fn get_queue_name(&self) -> String {
        format!(
            "{}:{}",
            relaymesh_common::defaults::mx_worker_queue_prefix(),
            self.ip
        )
    }

    #[must_use]
    pub fn get_retry_queue_name(&self) -> String {
        format!(
            "{}:{}",
            relaymesh_common::defaults::mx_worker_queue_retry_prefix(),
            self.ip
        )
    }

    /// The cached worker-view snapshot persisted in the `workers` hash
    /// (SPEC_FULL.md §3.1: a JSON document, not a pickled blob).
    #[must_use]
    pub fn to_cache_snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            name: self.name.clone(),
            ip: self.ip.clone(),
            policies_settings: self.policies_settings.clone(),
        }
    }
}

/// The subset of a [`Worker`] that is actually cached, mirroring the
/// reference's `{pk, ip, name, policies_settings}` dict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSnapshot {
    pub name: String,
    pub ip: String,
    pub policies_settings: PolicySettings,
}
