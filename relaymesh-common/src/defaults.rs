//! Concrete configuration defaults recorded in SPEC_FULL.md §6.1.
//!
//! Kept as plain `const fn`s, mirroring the `mod defaults { pub const fn
//! foo() -> T }` pattern used for `serde(default = "...")` fields throughout
//! this codebase (see `empath_delivery::policy::retry::defaults`).

pub const fn cache_prefix() -> &'static str {
    "ms"
}

pub const fn mailstatus_cache_prefix() -> &'static str {
    "status"
}

/// 15 days, in seconds.
pub const fn mailstatus_cache_timeout_secs() -> u64 {
    60 * 60 * 24 * 15
}

/// 10 days, in seconds.
pub const fn token_cache_timeout_secs() -> u64 {
    60 * 60 * 24 * 10
}

pub const fn router_lock_timeout_secs() -> u64 {
    300
}

pub const fn router_lock_waiting_secs() -> u64 {
    7
}

pub const fn mx_worker_max_ping_failures() -> u32 {
    10
}

pub const fn mx_worker_queue_prefix() -> &'static str {
    "mailsend.mail.send.first"
}

pub const fn mx_worker_queue_retry_prefix() -> &'static str {
    "mailsend.mail.send.retry"
}

pub const fn routing_queue() -> &'static str {
    "mailsend.mail.routing"
}

pub const fn queued_mail_queue() -> &'static str {
    "mailsend.mail.queued"
}

pub const fn min_retry_interval_secs() -> u64 {
    600
}

pub const fn max_retry_interval_secs() -> u64 {
    3600
}

/// 2 days, in seconds.
pub const fn time_before_drop_secs() -> u64 {
    2 * 24 * 3600
}

pub const fn relay_connect_timeout_secs() -> f64 {
    30.0
}

pub const fn relay_command_timeout_secs() -> f64 {
    30.0
}

/// Broker-level autoretry delay for unexpected router/delivery task errors
/// (SPEC_FULL.md §4.6.2); not to be confused with the exponential back-off
/// of §4.8, which governs only SMTP-transient failures.
pub const fn autoretry_delay_secs() -> u64 {
    180
}

/// 2 weeks / 180s, rounded down.
pub const fn autoretry_max_retries() -> u32 {
    (2 * 7 * 24 * 60 * 60) / 180
}

pub const fn ping_failure_ttl_secs() -> u64 {
    5 * 60
}
