//! Exponential back-off (SPEC_FULL.md §4.8).
//!
//! `delay(n) = min(A * e^n + B, max_retry_interval)`, where
//! `B = min(250, min_retry_interval - 1)` and `A = (min_retry_interval - B) / e`.
//! A retry at attempt `n` is only scheduled if the sum of every prior
//! delay (`0..n`) has not already exceeded `time_before_drop`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub min_retry_interval_secs: u64,
    pub max_retry_interval_secs: u64,
    pub time_before_drop_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_retry_interval_secs: relaymesh_common::defaults::min_retry_interval_secs(),
            max_retry_interval_secs: relaymesh_common::defaults::max_retry_interval_secs(),
            time_before_drop_secs: relaymesh_common::defaults::time_before_drop_secs(),
        }
    }
}

fn delay_secs(n: u32, policy: &RetryPolicy) -> f64 {
    let min = policy.min_retry_interval_secs as f64;
    let base = min.min(250.0).min(min - 1.0).max(0.0);
    let scale = (min - base) / std::f64::consts::E;
    (scale * std::f64::consts::E.powi(n as i32) + base).min(policy.max_retry_interval_secs as f64)
}

/// Returns the delay to use for the `attempt_number`th retry (1-indexed),
/// or `None` if the cumulative delay already spent on prior attempts has
/// exceeded `time_before_drop_secs` and the envelope should be dropped.
#[must_use]
pub fn next_delay_secs(attempt_number: u32, policy: &RetryPolicy) -> Option<f64> {
    let prior_cumulative: f64 = (0..attempt_number).map(|n| delay_secs(n, policy)).sum();
    if prior_cumulative <= policy.time_before_drop_secs as f64 {
        Some(delay_secs(attempt_number, policy))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            min_retry_interval_secs: 600,
            max_retry_interval_secs: 3600,
            time_before_drop_secs: 172_800,
        }
    }

    #[test]
    fn first_retry_delay_is_close_to_min_retry_interval() {
        let delay = next_delay_secs(1, &policy()).unwrap();
        assert!((delay - 600.0).abs() < 1.0, "delay was {delay}");
    }

    #[test]
    fn delay_is_clamped_to_max_retry_interval() {
        let delay = next_delay_secs(20, &policy()).unwrap();
        assert!((delay - 3600.0).abs() < 1.0, "delay was {delay}");
    }

    #[test]
    fn cumulative_delay_eventually_exceeds_time_before_drop() {
        let policy = policy();
        let mut attempt = 1;
        loop {
            if next_delay_secs(attempt, &policy).is_none() {
                break;
            }
            attempt += 1;
            assert!(attempt < 1000, "back-off never exceeded time_before_drop");
        }
    }

    #[test]
    fn ron_round_trips() {
        let policy = policy();
        let encoded = ron::to_string(&policy).unwrap();
        let decoded: RetryPolicy = ron::from_str(&encoded).unwrap();
        assert_eq!(decoded.min_retry_interval_secs, policy.min_retry_interval_secs);
    }
}
