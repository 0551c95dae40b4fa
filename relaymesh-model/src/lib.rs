//! Core domain types shared by the router, worker, and registry crates:
//! `Worker`, `Mail`/`MailStatus`, and the `StatusRepository` abstraction.

pub mod mail;
pub mod repository;
pub mod worker;
pub mod worker_store;

pub use mail::{Mail, MailStatus, Status};
pub use repository::{InMemoryStatusRepository, RepositoryError, StatusRepository};
pub use worker::{PolicySettings, Worker, WorkerSnapshot};
pub use worker_store::{InMemoryWorkerStore, WorkerStore, WorkerStoreError};
