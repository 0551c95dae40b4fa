//! `Mail` and `MailStatus` (SPEC_FULL.md §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use relaymesh_common::{Domain, MailId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mail {
    pub identifier: MailId,
    pub headers: HashMap<String, String>,
    pub sender: String,
    pub recipient: String,
    /// Cleared once a terminal `MailStatus` exists for this identifier.
    pub raw_mail_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Queued,
    Sending,
    Delayed,
    Delivered,
    Bounced,
    Dropped,
    Deleted,
}

impl Status {
    /// Terminal states: a `Mail` reaches one of these at most once
    /// (SPEC_FULL.md §3 invariant).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::Bounced | Self::Dropped | Self::Deleted
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailStatus {
    pub identifier: MailId,
    pub status: Status,
    pub source_ip: String,
    pub destination_domain: Domain,
    pub status_code: Option<String>,
    pub raw_msg: Option<String>,
    pub creation_date: DateTime<Utc>,
}

impl MailStatus {
    #[must_use]
    pub fn new(
        identifier: MailId,
        status: Status,
        source_ip: impl Into<String>,
        destination_domain: Domain,
    ) -> Self {
        Self {
            identifier,
            status,
            source_ip: source_ip.into(),
            destination_domain,
            status_code: None,
            raw_msg: None,
            creation_date: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_creation_date(mut self, at: DateTime<Utc>) -> Self {
        self.creation_date = at;
        self
    }

    #[must_use]
    pub fn with_reply(mut self, status_code: Option<String>, raw_msg: Option<String>) -> Self {
        self.status_code = status_code;
        self.raw_msg = raw_msg;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_match_spec() {
        assert!(Status::Delivered.is_terminal());
        assert!(Status::Bounced.is_terminal());
        assert!(Status::Dropped.is_terminal());
        assert!(Status::Deleted.is_terminal());
        assert!(!Status::Sending.is_terminal());
        assert!(!Status::Delayed.is_terminal());
        assert!(!Status::Queued.is_terminal());
    }
}
