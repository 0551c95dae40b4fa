//! The greylist policy (SPEC_FULL.md §4.4): when a prior attempt's reply
//! mentioned greylisting, hold every worker sharing that reply's source IP
//! back past the greylist's minimum retry interval, and nudge their score
//! up so the engine prefers retrying from the same IP that was greylisted
//! (most receiving MTAs whitelist the exact (IP, sender, recipient) tuple
//! once the retry succeeds).

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde::Deserialize;

use crate::context::{PolicyContext, PolicyDeps, WorkerView};
use crate::engine::{Result, WorkerPolicy};

fn default_min_retry_interval_secs() -> i64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
struct GreylistSettings {
    #[serde(default = "default_min_retry_interval_secs")]
    min_retry_interval_secs: i64,
}

impl Default for GreylistSettings {
    fn default() -> Self {
        Self {
            min_retry_interval_secs: default_min_retry_interval_secs(),
        }
    }
}

pub struct GreylistPolicy;

impl Default for GreylistPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl GreylistPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn was_greylisted(ctx: &PolicyContext) -> bool {
        ctx.reply
            .as_ref()
            .is_some_and(|reply| reply.message.to_ascii_lowercase().contains("greylist"))
    }

    /// `status:greylist:<identifier>` holds `"<src_ip>:<unix_ts>"`, written
    /// by the delivery task when it observes a greylist reply.
    async fn greylisted_source(&self, ctx: &PolicyContext, deps: &PolicyDeps) -> Result<Option<String>> {
        let key = relaymesh_common::keys::greylist(ctx.identifier.as_str());
        let Some(raw) = deps.kv.get(&key).await? else {
            return Ok(None);
        };
        Ok(raw.split_once(':').map(|(ip, _ts)| ip.to_owned()))
    }
}

#[async_trait]
impl WorkerPolicy for GreylistPolicy {
    fn name(&self) -> &'static str {
        "greylist"
    }

    async fn apply(&self, ctx: &PolicyContext, deps: &PolicyDeps, workers: Vec<WorkerView>) -> Result<Vec<WorkerView>> {
        if !Self::was_greylisted(ctx) {
            return Ok(workers);
        }
        let Some(source_ip) = self.greylisted_source(ctx, deps).await? else {
            return Ok(workers);
        };

        if !workers.iter().any(|w| w.ip == source_ip) {
            return Ok(workers);
        }
        let total = workers.len();

        Ok(workers
            .into_iter()
            .map(|mut worker| {
                if worker.ip != source_ip {
                    return worker;
                }
                let settings = worker.settings_for::<GreylistSettings>(self.name()).unwrap_or_default();
                let floor = ctx.now + ChronoDuration::seconds(settings.min_retry_interval_secs);
                worker.next_available = worker.next_available.max(floor);
                worker.score += 0.5 * total as f64;
                worker
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_bus::Reply;
    use relaymesh_common::{Domain, MailId};
    use relaymesh_kvstore::{InMemoryKvStore, KVStore};
    use relaymesh_model::{InMemoryStatusRepository, PolicySettings};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn worker(ip: &str) -> WorkerView {
        WorkerView {
            ip: ip.to_owned(),
            name: ip.to_owned(),
            policies_settings: PolicySettings::new(),
            next_available: chrono::Utc::now(),
            score: 0.0,
        }
    }

    #[tokio::test]
    async fn non_greylist_reply_leaves_workers_untouched() {
        let policy = GreylistPolicy::new();
        let deps = PolicyDeps {
            kv: Arc::new(InMemoryKvStore::new()),
            repository: Arc::new(InMemoryStatusRepository::new()),
        };
        let id = MailId::generate();
        let ctx = PolicyContext::new(id, HashMap::new(), Domain::new("example.com")).with_reply(Some(Reply {
            code: 450,
            enhanced_status_code: None,
            message: "mailbox temporarily unavailable".to_owned(),
        }));
        let before = worker("10.0.0.1");
        let result = policy.apply(&ctx, &deps, vec![before.clone()]).await.unwrap();
        assert_eq!(result[0], before);
    }

    #[tokio::test]
    async fn greylisted_source_gets_delayed_and_boosted() {
        let policy = GreylistPolicy::new();
        let kv = Arc::new(InMemoryKvStore::new());
        let deps = PolicyDeps {
            kv: kv.clone(),
            repository: Arc::new(InMemoryStatusRepository::new()),
        };
        let id = MailId::generate();
        kv.set_ex(
            &relaymesh_common::keys::greylist(id.as_str()),
            "10.0.0.1:1000",
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        let now = chrono::Utc::now();
        let ctx = PolicyContext::new(id, HashMap::new(), Domain::new("example.com"))
            .with_now(now)
            .with_reply(Some(Reply {
                code: 450,
                enhanced_status_code: Some("4.2.1".to_owned()),
                message: "greylisted, try again later".to_owned(),
            }));

        let workers = vec![worker("10.0.0.1"), worker("10.0.0.2")];
        let result = policy.apply(&ctx, &deps, workers).await.unwrap();

        let affected = result.iter().find(|w| w.ip == "10.0.0.1").unwrap();
        let unaffected = result.iter().find(|w| w.ip == "10.0.0.2").unwrap();
        assert!(affected.next_available >= now + ChronoDuration::seconds(300));
        assert!(affected.score > 0.0);
        assert_eq!(unaffected.score, 0.0);
    }
}
