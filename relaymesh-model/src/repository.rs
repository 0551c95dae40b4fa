//! Durable storage for [`MailStatus`](crate::mail::MailStatus) rows.
//!
//! The rate-limit policy needs to scan recent sends per source/destination
//! pair, and routing needs to check whether a mail already reached a
//! terminal state before re-entering the pipeline; both are modeled as a
//! single small trait so the router and policy engine never depend on a
//! concrete storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relaymesh_common::{Domain, MailId};
use thiserror::Error;

use crate::mail::MailStatus;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait StatusRepository: Send + Sync + std::fmt::Debug {
    async fn find_terminal(&self, identifier: &MailId) -> Result<Option<MailStatus>>;

    async fn append(&self, status: MailStatus) -> Result<()>;

    /// All statuses recorded for `(source_ip, destination_domain)` with
    /// `creation_date >= since`, oldest first.
    async fn recent_sends(
        &self,
        source_ip: &str,
        destination_domain: &Domain,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailStatus>>;
}

#[derive(Debug, Default)]
pub struct InMemoryStatusRepository {
    rows: Mutex<Vec<MailStatus>>,
}

impl InMemoryStatusRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusRepository for InMemoryStatusRepository {
    async fn find_terminal(&self, identifier: &MailId) -> Result<Option<MailStatus>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|row| &row.identifier == identifier && row.status.is_terminal())
            .max_by_key(|row| row.creation_date)
            .cloned())
    }

    async fn append(&self, status: MailStatus) -> Result<()> {
        self.rows.lock().push(status);
        Ok(())
    }

    async fn recent_sends(
        &self,
        source_ip: &str,
        destination_domain: &Domain,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailStatus>> {
        let mut matching: Vec<MailStatus> = self
            .rows
            .lock()
            .iter()
            .filter(|row| {
                row.source_ip == source_ip
                    && &row.destination_domain == destination_domain
                    && row.creation_date >= since
            })
            .cloned()
            .collect();
        matching.sort_by_key(|row| row.creation_date);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::Status;
    use chrono::Duration as ChronoDuration;

    fn domain() -> Domain {
        Domain::new("example.com")
    }

    #[tokio::test]
    async fn find_terminal_ignores_non_terminal_rows() {
        let repo = InMemoryStatusRepository::new();
        let id = MailId::generate();
        repo.append(MailStatus::new(id.clone(), Status::Queued, "10.0.0.1", domain()))
            .await
            .unwrap();
        assert!(repo.find_terminal(&id).await.unwrap().is_none());

        repo.append(MailStatus::new(
            id.clone(),
            Status::Delivered,
            "10.0.0.1",
            domain(),
        ))
        .await
        .unwrap();
        let found = repo.find_terminal(&id).await.unwrap().unwrap();
        assert_eq!(found.status, Status::Delivered);
    }

    #[tokio::test]
    async fn recent_sends_filters_by_source_domain_and_window() {
        let repo = InMemoryStatusRepository::new();
        let now = Utc::now();
        let old = MailStatus::new(MailId::generate(), Status::Delivered, "10.0.0.1", domain())
            .with_creation_date(now - ChronoDuration::hours(2));
        let recent = MailStatus::new(MailId::generate(), Status::Delivered, "10.0.0.1", domain())
            .with_creation_date(now - ChronoDuration::minutes(1));
        let other_source = MailStatus::new(MailId::generate(), Status::Delivered, "10.0.0.2", domain())
            .with_creation_date(now - ChronoDuration::minutes(1));
        repo.append(old).await.unwrap();
        repo.append(recent.clone()).await.unwrap();
        repo.append(other_source).await.unwrap();

        let results = repo
            .recent_sends("10.0.0.1", &domain(), now - ChronoDuration::minutes(30))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identifier, recent.identifier);
    }
}
