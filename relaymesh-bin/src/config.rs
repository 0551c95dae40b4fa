//! Top-level process configuration (SPEC_FULL.md §1.1, §6.1): a single TOML
//! document describing the router, the worker fleet, and the policy chain,
//! loaded the way `empath`'s `find_config_file` locates its own RON file —
//! an env var override, then a cwd-relative default, then an `/etc` default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use relaymesh_model::{PolicySettings, Worker};
use relaymesh_router::RouterConfig;
use relaymesh_worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_ENV_VAR: &str = "RELAYMESH_CONFIG";
const DEFAULT_CONFIG_NAMES: &[&str] = &["./relaymesh.toml", "/etc/relaymesh/relaymesh.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find a configuration file: tried {0}")]
    NotFound(String),

    #[error("{0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

mod defaults {
    pub fn control_socket() -> String {
        relaymesh_control::DEFAULT_CONTROL_SOCKET.to_owned()
    }

    pub fn policy_chain() -> Vec<String> {
        vec!["pool".to_owned(), "greylist".to_owned(), "rate_limit".to_owned(), "warm_up".to_owned()]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSeed {
    pub name: String,
    pub ip: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub policies_settings: PolicySettings,
}

const fn default_true() -> bool {
    true
}

impl From<WorkerSeed> for Worker {
    fn from(seed: WorkerSeed) -> Self {
        let mut worker = Self::new(seed.name, seed.ip);
        worker.enabled = seed.enabled;
        worker.policies_settings = seed.policies_settings;
        worker
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayMeshConfig {
    #[serde(default = "defaults::control_socket")]
    pub control_socket: String,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub workers: Vec<WorkerSeed>,
    /// Warm-up domain groups, keyed by group name (SPEC_FULL.md §4.5).
    #[serde(default)]
    pub warm_up_domains: HashMap<String, Vec<String>>,
    /// Policy names, in evaluation order, drawn from `pool`, `greylist`,
    /// `rate_limit`, `warm_up`. Unknown names abort startup (§7).
    #[serde(default = "defaults::policy_chain")]
    pub policy_chain: Vec<String>,
}

impl Default for RelayMeshConfig {
    fn default() -> Self {
        Self {
            control_socket: defaults::control_socket(),
            router: RouterConfig::default(),
            worker: WorkerConfig::default(),
            workers: Vec::new(),
            warm_up_domains: HashMap::new(),
            policy_chain: defaults::policy_chain(),
        }
    }
}

impl RelayMeshConfig {
    /// # Errors
    /// Returns an error if no config file is found at any of the tried
    /// locations, if it cannot be read, or if it fails to parse.
    pub fn load() -> Result<Self, ConfigError> {
        let path = find_config_file()?;
        let raw = std::fs::read_to_string(&path).map_err(|err| ConfigError::Read(path.clone(), err))?;
        toml::from_str(&raw).map_err(|err| ConfigError::Parse(path, err))
    }
}

fn find_config_file() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return if Path::new(&path).is_file() {
            Ok(PathBuf::from(path))
        } else {
            Err(ConfigError::NotFound(format!("{CONFIG_ENV_VAR}={path} (file not found)")))
        };
    }

    for candidate in DEFAULT_CONFIG_NAMES {
        if Path::new(candidate).is_file() {
            return Ok(PathBuf::from(candidate));
        }
    }

    Err(ConfigError::NotFound(DEFAULT_CONFIG_NAMES.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trips() {
        let config = RelayMeshConfig::default();
        let encoded = toml::to_string(&config).unwrap();
        let decoded: RelayMeshConfig = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.control_socket, config.control_socket);
        assert_eq!(decoded.policy_chain, config.policy_chain);
    }

    #[test]
    fn missing_env_var_file_is_an_error() {
        std::env::set_var(CONFIG_ENV_VAR, "/definitely/not/a/real/path.toml");
        let result = find_config_file();
        std::env::remove_var(CONFIG_ENV_VAR);
        assert!(result.is_err());
    }

    #[test]
    fn worker_seed_defaults_to_enabled() {
        let seed: WorkerSeed = toml::from_str(r#"name = "a"
ip = "10.0.0.1""#)
            .unwrap();
        assert!(seed.enabled);
    }
}
