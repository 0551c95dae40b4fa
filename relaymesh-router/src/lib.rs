//! The router task (SPEC_FULL.md §4.6): finds a worker for an inbound
//! envelope under the per-(domain, pool) routing lock, mints a delivery
//! token, records the `SENDING` status, and enqueues the delivery task.

pub mod config;
pub mod lock;
pub mod route;

pub use config::RouterConfig;
pub use route::{route_envelope, RouteError, RouteOutcome, RouterContext};
