//! Router process configuration (SPEC_FULL.md §6.1).

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod defaults {
    pub const fn lock_timeout_secs() -> u64 {
        relaymesh_common::defaults::router_lock_timeout_secs()
    }

    pub const fn lock_waiting_secs() -> u64 {
        relaymesh_common::defaults::router_lock_waiting_secs()
    }

    pub const fn no_worker_retry_secs() -> u64 {
        300
    }

    pub fn pool_header() -> String {
        "X-Pool".to_owned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// The header carrying the sender-requested pool name (`X_POOL_HEADER`).
    #[serde(default = "defaults::pool_header")]
    pub pool_header: String,
    #[serde(default = "defaults::lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default = "defaults::lock_waiting_secs")]
    pub lock_waiting_secs: u64,
    /// How long to wait before retrying an envelope for which no worker
    /// was found at all.
    #[serde(default = "defaults::no_worker_retry_secs")]
    pub no_worker_retry_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pool_header: defaults::pool_header(),
            lock_timeout_secs: defaults::lock_timeout_secs(),
            lock_waiting_secs: defaults::lock_waiting_secs(),
            no_worker_retry_secs: defaults::no_worker_retry_secs(),
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    #[must_use]
    pub const fn lock_waiting(&self) -> Duration {
        Duration::from_secs(self.lock_waiting_secs)
    }

    #[must_use]
    pub const fn no_worker_retry(&self) -> Duration {
        Duration::from_secs(self.no_worker_retry_secs)
    }
}
