//! The delivery worker (SPEC_FULL.md §4.7): pops a [`relaymesh_bus::DeliveryMessage`]
//! off a worker's queue, hands it to a [`relay::Relay`], and records the
//! outcome through the policy engine's [`relaymesh_policy::PolicyEngine::record_status`],
//! re-routing transient failures through the exponential back-off schedule
//! in [`backoff`].

pub mod backoff;
pub mod config;
pub mod delivery;
pub mod relay;

pub use backoff::RetryPolicy;
pub use config::WorkerConfig;
pub use delivery::{send_email, DeliveryError, DeliveryOutcome, WorkerContext};
pub use relay::{Envelope, Relay, RelayError, SandboxRelay};
