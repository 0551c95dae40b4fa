//! Cache key construction (SPEC_FULL.md §3, §9.1 decision 3).
//!
//! Every `KVStore` call site builds its key through one of these functions
//! rather than hand-formatting a string, so the `TOKEN_CACHE_TIMEOUT` vs.
//! `MAILSTATUS_CACHE_TIMEOUT` TTL each key uses can never be confused the
//! way the reference implementation's shared `CACHE_TIMEOUT` alias invited.

use crate::defaults;

fn prefixed(parts: &[&str]) -> String {
    let mut key = defaults::cache_prefix().to_owned();
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

/// `workers` hash: the enabled-worker registry.
#[must_use]
pub fn workers_hash() -> String {
    prefixed(&["workers"])
}

/// `token:<identifier>`: the authoritative delivery token. TTL:
/// `TOKEN_CACHE_TIMEOUT`.
#[must_use]
pub fn token(identifier: &str) -> String {
    prefixed(&["token", identifier])
}

/// `lock:routing:<domain>:<pool>`: the per-destination-domain routing
/// mutex. TTL: `ROUTER_LOCK_TIMEOUT`.
#[must_use]
pub fn routing_lock(domain: &str, pool: &str) -> String {
    prefixed(&["lock", "routing", domain, pool])
}

/// `status:greylist:<identifier>`. TTL: `MAILSTATUS_CACHE_TIMEOUT`.
#[must_use]
pub fn greylist(identifier: &str) -> String {
    prefixed(&["status", "greylist", identifier])
}

/// `status:warm_up:counter:<date>:<src_ip>[:<group>]`. TTL:
/// `MAILSTATUS_CACHE_TIMEOUT`.
#[must_use]
pub fn warm_up_counter(date: &str, src_ip: &str, group: Option<&str>) -> String {
    warm_up_keyed("counter", date, src_ip, group)
}

/// `status:warm_up:remains:<date>:<src_ip>[:<group>]`. TTL:
/// `MAILSTATUS_CACHE_TIMEOUT`.
#[must_use]
pub fn warm_up_remains(date: &str, src_ip: &str, group: Option<&str>) -> String {
    warm_up_keyed("remains", date, src_ip, group)
}

/// `status:warm_up:step:<date>:<src_ip>[:<group>]`. TTL:
/// `MAILSTATUS_CACHE_TIMEOUT`.
#[must_use]
pub fn warm_up_step(date: &str, src_ip: &str, group: Option<&str>) -> String {
    warm_up_keyed("step", date, src_ip, group)
}

fn warm_up_keyed(kind: &str, date: &str, src_ip: &str, group: Option<&str>) -> String {
    group.map_or_else(
        || prefixed(&["status", "warm_up", kind, date, src_ip]),
        |group| prefixed(&["status", "warm_up", kind, date, src_ip, group]),
    )
}

/// `worker:ping_failures:<ip>`. TTL: fixed 5 minutes
/// (`ping_failure_ttl_secs`), not `MAILSTATUS_CACHE_TIMEOUT`.
#[must_use]
pub fn ping_failures(ip: &str) -> String {
    prefixed(&["worker", "ping_failures", ip])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_the_configured_prefix() {
        assert_eq!(workers_hash(), "ms:workers");
        assert_eq!(token("abc"), "ms:token:abc");
        assert_eq!(routing_lock("example.com", "default"), "ms:lock:routing:example.com:default");
    }

    #[test]
    fn warm_up_keys_omit_group_segment_when_absent() {
        assert_eq!(warm_up_remains("2026-08-01", "10.0.0.1", None), "ms:status:warm_up:remains:2026-08-01:10.0.0.1");
        assert_eq!(
            warm_up_remains("2026-08-01", "10.0.0.1", Some("tier1")),
            "ms:status:warm_up:remains:2026-08-01:10.0.0.1:tier1"
        );
    }
}
