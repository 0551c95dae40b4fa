//! Worker process configuration (SPEC_FULL.md §6.1, §4.7).

use serde::{Deserialize, Serialize};

use crate::backoff::RetryPolicy;

mod defaults {
    pub fn ehlo_as() -> String {
        "localhost".to_owned()
    }

    pub const fn relay_connect_timeout_secs() -> f64 {
        relaymesh_common::defaults::relay_connect_timeout_secs()
    }

    pub const fn relay_command_timeout_secs() -> f64 {
        relaymesh_common::defaults::relay_command_timeout_secs()
    }

    pub const fn sandbox() -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// The hostname sent in the SMTP `EHLO` greeting.
    #[serde(default = "defaults::ehlo_as")]
    pub ehlo_as: String,
    #[serde(default = "defaults::relay_connect_timeout_secs")]
    pub relay_connect_timeout_secs: f64,
    #[serde(default = "defaults::relay_command_timeout_secs")]
    pub relay_command_timeout_secs: f64,
    /// When `true`, deliveries are handed to [`crate::relay::SandboxRelay`]
    /// instead of a real SMTP client.
    #[serde(default = "defaults::sandbox")]
    pub sandbox: bool,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ehlo_as: defaults::ehlo_as(),
            relay_connect_timeout_secs: defaults::relay_connect_timeout_secs(),
            relay_command_timeout_secs: defaults::relay_command_timeout_secs(),
            sandbox: defaults::sandbox(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ron_round_trips() {
        let config = WorkerConfig::default();
        let encoded = ron::to_string(&config).unwrap();
        let decoded: WorkerConfig = ron::from_str(&encoded).unwrap();
        assert_eq!(decoded.ehlo_as, config.ehlo_as);
        assert_eq!(decoded.retry_policy.min_retry_interval_secs, config.retry_policy.min_retry_interval_secs);
    }

    #[test]
    fn defaults_to_a_real_relay_not_the_sandbox() {
        assert!(!WorkerConfig::default().sandbox);
    }
}
