//! Shared error taxonomy
//!
//! Every crate in this workspace that can fail in a way the router or
//! delivery task must branch on (transient vs. permanent vs. configuration)
//! converts its local errors into a [`RoutingError`] rather than inventing
//! its own disposition logic, so `is_transient`/`is_permanent` are the only
//! place that distinction is encoded.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    /// 4xx SMTP reply, connection reset, DNS failure, or any other
    /// temporarily-retryable condition.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// 5xx SMTP reply: terminal, the envelope is bounced.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    /// Could not acquire `lock:routing:<domain>:<pool>` within the
    /// configured blocking budget.
    #[error("lock contention on {0}")]
    LockContention(String),

    /// `record_status` raised a soft validation failure: discard silently,
    /// do not retry.
    #[error("soft validation failure: {0}")]
    Soft(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    System(#[from] std::io::Error),
}

impl RoutingError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::LockContention(_))
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::Soft(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognized RELAY_TIMEOUTS key: {0:?}")]
    UnknownTimeoutKey(String),

    #[error("missing required MX worker setting: {0}")]
    MissingMxSetting(&'static str),

    #[error("missing mandatory setting: {0}")]
    MissingMandatory(&'static str),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, RoutingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_predicate() {
        let err = RoutingError::Transient("connection reset".into());
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn lock_contention_counts_as_transient() {
        assert!(RoutingError::LockContention("example.com:default".into()).is_transient());
    }

    #[test]
    fn permanent_predicate() {
        let err = RoutingError::Permanent("550 mailbox unknown".into());
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }
}
