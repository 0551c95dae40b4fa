//! The worker registry (SPEC_FULL.md §4.9) and its garbage-collection
//! sweeps (§4.9.1): hydrating the `workers` hash from the relational store,
//! keeping it in sync as workers are enabled/disabled, pinging workers for
//! liveness, and draining a disabled worker's stranded queues back onto
//! the routing queue.

pub mod gc;
pub mod registry;

pub use gc::Gc;
pub use registry::{RegistryError, WorkerRegistry};
