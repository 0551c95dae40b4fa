//! The rate-limit policy (SPEC_FULL.md §4.3): space out sends to the same
//! destination domain from the same source IP, queueing at most
//! `max_queued` envelopes ahead and optionally favoring workers whose next
//! slot comes up soonest.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use regex::Regex;
use serde::Deserialize;

use crate::context::{PolicyContext, PolicyDeps, WorkerView};
use crate::engine::{Result, WorkerPolicy};

fn default_max_queued() -> u64 {
    50
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Prioritize {
    Equal,
    #[default]
    Earlier,
}

#[derive(Debug, Clone, Deserialize)]
struct RateLimitSettings {
    /// `(domain_regex, interval_seconds)` pairs, checked in order; the
    /// first match sets the minimum spacing between sends. Domains that
    /// match nothing are unrestricted.
    #[serde(default)]
    domains: Vec<(String, u64)>,
    #[serde(default = "default_max_queued")]
    max_queued: u64,
    #[serde(default)]
    prioritize: Prioritize,
}

pub struct RateLimitPolicy;

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn domain_limit(settings: &RateLimitSettings, domain: &str) -> u64 {
        for (pattern, interval) in &settings.domains {
            if Regex::new(pattern).is_ok_and(|regex| regex.is_match(domain)) {
                return *interval;
            }
        }
        0
    }
}

/// Find the earliest instant at or after `not_before` that respects a
/// `domain_limit`-second spacing from every entry in `scheduled` (sorted
/// ascending), per SPEC_FULL.md §4.3 steps 2-4.
fn next_open_slot(scheduled: &[DateTime<Utc>], domain_limit: u64, not_before: DateTime<Utc>) -> DateTime<Utc> {
    if domain_limit == 0 || scheduled.is_empty() {
        return not_before;
    }
    let spacing = ChronoDuration::seconds(domain_limit as i64);

    if not_before + spacing * 2 < scheduled[0] {
        let candidate = not_before + spacing;
        if candidate >= not_before {
            return candidate;
        }
    }

    for window in scheduled.windows(2) {
        let (a, b) = (window[0], window[1]);
        if b - a > spacing * 2 {
            let candidate = a + spacing;
            if candidate >= not_before {
                return candidate;
            }
        }
    }

    let last = *scheduled.last().expect("scheduled is non-empty");
    (last + spacing).max(not_before)
}

#[async_trait]
impl WorkerPolicy for RateLimitPolicy {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn apply(&self, ctx: &PolicyContext, deps: &PolicyDeps, workers: Vec<WorkerView>) -> Result<Vec<WorkerView>> {
        let not_before = ctx.not_before.unwrap_or(ctx.now);
        let domain = ctx.destination_domain.as_str().to_owned();
        let mut scored = Vec::with_capacity(workers.len());

        for mut worker in workers {
            let settings = worker
                .settings_for::<RateLimitSettings>(self.name())
                .unwrap_or(RateLimitSettings { domains: Vec::new(), max_queued: default_max_queued(), prioritize: Prioritize::default() });
            let domain_limit = Self::domain_limit(&settings, &domain);

            let scheduled: Vec<DateTime<Utc>> = deps
                .repository
                .recent_sends(&worker.ip, &ctx.destination_domain, ctx.now - ChronoDuration::seconds(domain_limit as i64))
                .await?
                .into_iter()
                .filter(|status| status.status == relaymesh_model::Status::Sending)
                .map(|status| status.creation_date)
                .collect();

            let slot = next_open_slot(&scheduled, domain_limit, not_before).max(worker.next_available).max(ctx.now);

            let horizon = ctx.now + ChronoDuration::seconds(settings.max_queued as i64);
            if slot > horizon {
                continue;
            }

            worker.next_available = slot;
            scored.push((worker, settings.prioritize));
        }

        scored.sort_by_key(|(worker, _)| worker.next_available);
        let total = scored.len();
        let mut result = Vec::with_capacity(total);
        for (index, (mut worker, prioritize)) in scored.into_iter().enumerate() {
            if prioritize == Prioritize::Earlier {
                worker.score += (0.1 * (total - index) as f64 * 100.0).round() / 100.0;
            }
            result.push(worker);
        }
        Ok(result)
    }
}

/// Used by tests and by [`RateLimitPolicy`] callers that want a
/// deterministic small jitter independent of `rand::rng()`'s default seed.
#[must_use]
pub fn jitter_seconds(min: u64, max: u64) -> u64 {
    rand::rng().random_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymesh_common::{Domain, MailId};
    use relaymesh_kvstore::InMemoryKvStore;
    use relaymesh_model::{InMemoryStatusRepository, MailStatus, PolicySettings, Status};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn deps() -> PolicyDeps {
        PolicyDeps {
            kv: Arc::new(InMemoryKvStore::new()),
            repository: Arc::new(InMemoryStatusRepository::new()),
        }
    }

    fn worker_with_limit(ip: &str, domain_pattern: &str, interval: u64) -> WorkerView {
        let mut settings = PolicySettings::new();
        settings.insert(
            "rate_limit".to_owned(),
            serde_json::json!({"domains": [[domain_pattern, interval]], "max_queued": 3600}),
        );
        WorkerView {
            ip: ip.to_owned(),
            name: ip.to_owned(),
            policies_settings: settings,
            next_available: Utc::now(),
            score: 0.0,
        }
    }

    #[tokio::test]
    async fn unrestricted_worker_gets_not_before_as_slot() {
        let policy = RateLimitPolicy::new();
        let deps = deps();
        let worker = WorkerView {
            ip: "10.0.0.1".to_owned(),
            name: "a".to_owned(),
            policies_settings: PolicySettings::new(),
            next_available: Utc::now(),
            score: 0.0,
        };
        let ctx = PolicyContext::new(MailId::generate(), HashMap::new(), Domain::new("example.com"));
        let result = policy.apply(&ctx, &deps, vec![worker]).await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn recent_send_pushes_next_available_out_by_the_domain_interval() {
        let policy = RateLimitPolicy::new();
        let deps = deps();
        let domain = Domain::new("example.com");
        let now = Utc::now();

        deps.repository
            .append(
                MailStatus::new(MailId::generate(), Status::Sending, "10.0.0.1", domain.clone())
                    .with_creation_date(now),
            )
            .await
            .unwrap();

        let worker = worker_with_limit("10.0.0.1", "example\\.com", 60);
        let ctx = PolicyContext::new(MailId::generate(), HashMap::new(), domain).with_now(now);
        let result = policy.apply(&ctx, &deps, vec![worker]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].next_available >= now + ChronoDuration::seconds(60));
    }

    #[tokio::test]
    async fn prioritize_earlier_adds_an_ordinal_score_bonus() {
        let policy = RateLimitPolicy::new();
        let deps = deps();
        let domain = Domain::new("example.com");
        let now = Utc::now();

        let mut earlier_settings = PolicySettings::new();
        earlier_settings.insert("rate_limit".to_owned(), serde_json::json!({"prioritize": "earlier", "max_queued": 3600}));
        let slow = WorkerView {
            ip: "10.0.0.2".to_owned(),
            name: "slow".to_owned(),
            policies_settings: earlier_settings.clone(),
            next_available: now + ChronoDuration::seconds(120),
            score: 0.0,
        };
        let fast = WorkerView {
            ip: "10.0.0.1".to_owned(),
            name: "fast".to_owned(),
            policies_settings: earlier_settings,
            next_available: now,
            score: 0.0,
        };

        let ctx = PolicyContext::new(MailId::generate(), HashMap::new(), domain).with_now(now);
        let result = policy.apply(&ctx, &deps, vec![slow, fast]).await.unwrap();
        let fast_score = result.iter().find(|w| w.ip == "10.0.0.1").unwrap().score;
        let slow_score = result.iter().find(|w| w.ip == "10.0.0.2").unwrap().score;
        assert!(fast_score > slow_score);
    }
}
