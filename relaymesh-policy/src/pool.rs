//! The pool policy (SPEC_FULL.md §4.2): restrict the candidate set to
//! workers whose `pool` setting includes the sender-specified pool header,
//! defaulting to the `"default"` pool when the header is absent or blank.

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::{PolicyContext, PolicyDeps, WorkerView};
use crate::engine::{Result, WorkerPolicy};

const DEFAULT_POOL: &str = "default";

fn default_pools() -> Vec<String> {
    vec![DEFAULT_POOL.to_owned()]
}

#[derive(Debug, Clone, Deserialize)]
struct PoolSettings {
    #[serde(default = "default_pools")]
    pools: Vec<String>,
}

pub struct PoolPolicy {
    pool_header: String,
}

impl PoolPolicy {
    #[must_use]
    pub fn new(pool_header: impl Into<String>) -> Self {
        Self {
            pool_header: pool_header.into(),
        }
    }

    fn requested_pool(&self, ctx: &PolicyContext) -> String {
        ctx.headers
            .get(&self.pool_header)
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_POOL.to_owned())
    }
}

#[async_trait]
impl WorkerPolicy for PoolPolicy {
    fn name(&self) -> &'static str {
        "pool"
    }

    async fn apply(&self, ctx: &PolicyContext, _deps: &PolicyDeps, workers: Vec<WorkerView>) -> Result<Vec<WorkerView>> {
        let requested = self.requested_pool(ctx);
        Ok(workers
            .into_iter()
            .filter(|worker| {
                let settings = worker.settings_for::<PoolSettings>(self.name()).unwrap_or(PoolSettings {
                    pools: default_pools(),
                });
                settings.pools.iter().any(|pool| pool.trim().eq_ignore_ascii_case(&requested))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_common::{Domain, MailId};
    use std::collections::HashMap;

    fn worker(ip: &str, pools: &[&str]) -> WorkerView {
        let mut settings = relaymesh_model::PolicySettings::new();
        settings.insert("pool".to_owned(), serde_json::json!({"pools": pools}));
        WorkerView {
            ip: ip.to_owned(),
            name: ip.to_owned(),
            policies_settings: settings,
            next_available: chrono::Utc::now(),
            score: 0.0,
        }
    }

    fn ctx(headers: HashMap<String, String>) -> PolicyContext {
        PolicyContext::new(MailId::generate(), headers, Domain::new("example.com"))
    }

    #[tokio::test]
    async fn keeps_only_workers_in_the_requested_pool() {
        let policy = PoolPolicy::new("X-Pool");
        let deps_kv = std::sync::Arc::new(relaymesh_kvstore::InMemoryKvStore::new());
        let deps = PolicyDeps {
            kv: deps_kv,
            repository: std::sync::Arc::new(relaymesh_model::InMemoryStatusRepository::new()),
        };
        let mut headers = HashMap::new();
        headers.insert("X-Pool".to_owned(), "bulk".to_owned());

        let workers = vec![worker("10.0.0.1", &["bulk"]), worker("10.0.0.2", &["default"])];
        let kept = policy.apply(&ctx(headers), &deps, workers).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ip, "10.0.0.1");
    }

    #[tokio::test]
    async fn missing_header_falls_back_to_default_pool() {
        let policy = PoolPolicy::new("X-Pool");
        let deps = PolicyDeps {
            kv: std::sync::Arc::new(relaymesh_kvstore::InMemoryKvStore::new()),
            repository: std::sync::Arc::new(relaymesh_model::InMemoryStatusRepository::new()),
        };
        let workers = vec![worker("10.0.0.1", &["bulk"]), worker("10.0.0.2", &["default"])];
        let kept = policy.apply(&ctx(HashMap::new()), &deps, workers).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ip, "10.0.0.2");
    }

    #[tokio::test]
    async fn worker_without_pool_settings_defaults_to_default_pool() {
        let policy = PoolPolicy::new("X-Pool");
        let deps = PolicyDeps {
            kv: std::sync::Arc::new(relaymesh_kvstore::InMemoryKvStore::new()),
            repository: std::sync::Arc::new(relaymesh_model::InMemoryStatusRepository::new()),
        };
        let bare = WorkerView {
            ip: "10.0.0.3".to_owned(),
            name: "c".to_owned(),
            policies_settings: relaymesh_model::PolicySettings::new(),
            next_available: chrono::Utc::now(),
            score: 0.0,
        };
        let kept = policy.apply(&ctx(HashMap::new()), &deps, vec![bare]).await.unwrap();
        assert_eq!(kept.len(), 1);
    }
}
