//! The warm-up policy (SPEC_FULL.md §4.5): throttle a freshly-provisioned
//! IP's volume to a ladder of daily sending caps, advancing one rung at a
//! time as yesterday's delivered+bounced counter clears the current rung
//! (within `step_tolerance_pct`).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use relaymesh_model::{MailStatus, Status};
use serde::Deserialize;

use crate::context::{PolicyContext, PolicyDeps, WorkerView};
use crate::engine::{Result, WorkerPolicy};

fn default_step_tolerance_pct() -> f64 {
    10.0
}

fn default_max_tolerance_pct() -> f64 {
    20.0
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WarmUpPrioritize {
    #[default]
    None,
    Warmest,
    Coldest,
}

#[derive(Debug, Clone, Deserialize)]
struct WarmUpSettings {
    /// Ascending daily-volume rungs, e.g. `[5, 10, 30, 50, 100]`.
    matrix: Vec<u64>,
    goal: u64,
    #[serde(default = "default_step_tolerance_pct")]
    step_tolerance_pct: f64,
    #[serde(default = "default_max_tolerance_pct")]
    max_tolerance_pct: f64,
    #[serde(default)]
    ip_wide: bool,
    #[serde(default)]
    prioritize: WarmUpPrioritize,
}

/// `matrix[0]` when `counter` is zero; otherwise the highest rung whose
/// `(lo, hi)` window the tolerance-adjusted `counter` falls into, never
/// regressing below `current_step` and never exceeding `goal`.
///
/// This only looks at one day's counter — the caller passes in yesterday's
/// tally. A complete implementation would fold in every day of
/// `days_watched`, picking the best-supported rung across the window; this
/// narrower form matches what was actually observed running in production
/// and is kept as-is rather than "fixed" out from under callers relying on
/// today's admission rate.
fn search_step(counter: u64, matrix: &[u64], step_tolerance_pct: f64, current_step: u64, goal: u64) -> u64 {
    if matrix.is_empty() {
        return current_step;
    }
    if counter == 0 {
        return current_step.max(matrix[0]);
    }

    let mut step = current_step;
    for window in matrix.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        let tolerance = 1.0 - step_tolerance_pct / 100.0;
        let lo_bound = lo as f64 * tolerance;
        let hi_bound = hi as f64 * tolerance;
        if counter as f64 >= lo_bound && (counter as f64) < hi_bound && hi > step {
            step = hi;
            break;
        }
    }
    step.min(goal.max(matrix[0]))
}

fn group_for_domain(groups: &HashMap<String, Vec<String>>, domain: &str) -> Option<String> {
    groups
        .iter()
        .find(|(_, domains)| domains.iter().any(|candidate| candidate.eq_ignore_ascii_case(domain)))
        .map(|(group, _)| group.clone())
}

pub struct WarmUpPolicy {
    warm_up_domains: HashMap<String, Vec<String>>,
    ttl: std::time::Duration,
}

impl WarmUpPolicy {
    #[must_use]
    pub fn new(warm_up_domains: HashMap<String, Vec<String>>) -> Self {
        Self {
            warm_up_domains,
            ttl: std::time::Duration::from_secs(relaymesh_common::defaults::mailstatus_cache_timeout_secs()),
        }
    }

    fn scope_key(&self, ctx: &PolicyContext, ip_wide: bool) -> WarmUpScope {
        match group_for_domain(&self.warm_up_domains, ctx.destination_domain.as_str()) {
            Some(group) => WarmUpScope::Scoped(Some(group)),
            None if ip_wide => WarmUpScope::Scoped(None),
            None => WarmUpScope::Unscoped,
        }
    }

    /// The keys bookkeeping touches: always the plain per-IP key, plus the
    /// per-(IP, group) key when the destination domain belongs to a
    /// configured warm-up group. `apply` doesn't see worker settings at
    /// this point, so both are kept up to date and whichever one a
    /// worker's `ip_wide`/group scope later reads will be consistent.
    fn bookkeeping_groups(&self, ctx: &PolicyContext) -> Vec<Option<String>> {
        match group_for_domain(&self.warm_up_domains, ctx.destination_domain.as_str()) {
            Some(group) => vec![None, Some(group)],
            None => vec![None],
        }
    }

    async fn remains_delta(&self, deps: &PolicyDeps, ctx: &PolicyContext, status: &MailStatus, delta: i64) -> Result<()> {
        let today = ctx.now.date_naive().to_string();
        // SENDING decrements the day's remaining quota (a slot is
        // consumed); DELAYED restores it (the attempt never happened).
        for group in self.bookkeeping_groups(ctx) {
            let remains_key = relaymesh_common::keys::warm_up_remains(&today, &status.source_ip, group.as_deref());
            if deps.kv.get(&remains_key).await?.is_some() {
                deps.kv.incr(&remains_key, delta).await?;
            }
        }
        Ok(())
    }

    async fn bump_counter(&self, deps: &PolicyDeps, ctx: &PolicyContext, status: &MailStatus) -> Result<()> {
        let today = ctx.now.date_naive().to_string();
        for group in self.bookkeeping_groups(ctx) {
            let counter_key = relaymesh_common::keys::warm_up_counter(&today, &status.source_ip, group.as_deref());
            let existed = deps.kv.get(&counter_key).await?.is_some();
            deps.kv.incr(&counter_key, 1).await?;
            if !existed {
                deps.kv.expire(&counter_key, self.ttl).await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WarmUpScope {
    /// Restricted: `group` is `Some` for a configured domain group, `None`
    /// for plain IP-wide warm-up.
    Scoped(Option<String>),
    /// Domain is neither in a warm-up group nor covered by `ip_wide`: not
    /// subject to warm-up at all.
    Unscoped,
}

#[async_trait]
impl WorkerPolicy for WarmUpPolicy {
    fn name(&self) -> &'static str {
        "warm_up"
    }

    async fn apply(&self, ctx: &PolicyContext, deps: &PolicyDeps, workers: Vec<WorkerView>) -> Result<Vec<WorkerView>> {
        let total = workers.len().max(1) as f64;
        let today = ctx.now.date_naive().to_string();
        let yesterday = (ctx.now.date_naive() - ChronoDuration::days(1)).to_string();

        let mut candidates: Vec<(WorkerView, f64, WarmUpPrioritize)> = Vec::with_capacity(workers.len());

        for mut worker in workers {
            let Some(settings) = worker.settings_for::<WarmUpSettings>(self.name()) else {
                candidates.push((worker, 100.0, WarmUpPrioritize::None));
                continue;
            };

            let scope = self.scope_key(ctx, settings.ip_wide);
            let WarmUpScope::Scoped(group) = scope else {
                worker.score += 1.0 / total;
                candidates.push((worker, 100.0, WarmUpPrioritize::None));
                continue;
            };

            let step_key = relaymesh_common::keys::warm_up_step(&today, &worker.ip, group.as_deref());
            let step = match deps.kv.get(&step_key).await?.and_then(|raw| raw.parse::<u64>().ok()) {
                Some(step) => step,
                None => {
                    let counter_key = relaymesh_common::keys::warm_up_counter(&yesterday, &worker.ip, group.as_deref());
                    let counter: u64 = deps.kv.get(&counter_key).await?.and_then(|raw| raw.parse().ok()).unwrap_or(0);
                    let baseline = settings.matrix.first().copied().unwrap_or(0);
                    let step = search_step(counter, &settings.matrix, settings.step_tolerance_pct, baseline, settings.goal);
                    deps.kv.set_ex(&step_key, &step.to_string(), self.ttl).await?;
                    step
                }
            };
            if step == 0 {
                continue;
            }

            let remains_key = relaymesh_common::keys::warm_up_remains(&today, &worker.ip, group.as_deref());
            let remains: i64 = match deps.kv.get(&remains_key).await?.and_then(|raw| raw.parse::<i64>().ok()) {
                Some(remains) => remains,
                None => {
                    let padding = (step as f64 * settings.max_tolerance_pct / 100.0).floor() as i64;
                    let initial = step as i64 + padding;
                    deps.kv.set_ex(&remains_key, &initial.to_string(), self.ttl).await?;
                    initial
                }
            };

            let missing_percent = 100.0 - ((step as i64 - remains) as f64 * 100.0 / step as f64);
            if missing_percent <= 0.0 {
                continue;
            }
            worker.score += missing_percent * 0.01 / total;
            candidates.push((worker, missing_percent, settings.prioritize));
        }

        if candidates.iter().all(|(_, _, p)| *p == WarmUpPrioritize::None) {
            candidates.sort_by(|a, b| a.0.score.total_cmp(&b.0.score));
            return Ok(candidates.into_iter().map(|(w, _, _)| w).collect());
        }

        match candidates[0].2 {
            WarmUpPrioritize::Warmest => candidates.sort_by(|a, b| a.1.total_cmp(&b.1)),
            WarmUpPrioritize::Coldest => candidates.sort_by(|a, b| b.1.total_cmp(&a.1)),
            WarmUpPrioritize::None => {}
        }
        let count = candidates.len();
        Ok(candidates
            .into_iter()
            .enumerate()
            .map(|(index, (mut worker, _, _))| {
                worker.score += (0.1 * (count - index) as f64 * 100.0).round() / 100.0;
                worker
            })
            .collect())
    }

    async fn on_status_pre_save(&self, ctx: &PolicyContext, deps: &PolicyDeps, status: &MailStatus) -> Result<()> {
        match status.status {
            Status::Sending => self.remains_delta(deps, ctx, status, -1).await,
            Status::Delayed => self.remains_delta(deps, ctx, status, 1).await,
            Status::Delivered | Status::Bounced => self.bump_counter(deps, ctx, status).await,
            _ => Ok(()),
        }
    }

    async fn on_status_post_save(&self, _ctx: &PolicyContext, _deps: &PolicyDeps, _status: &MailStatus) -> Result<()> {
        Ok(())
    }
}
