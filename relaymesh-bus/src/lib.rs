//! The `TaskBus` abstraction (§9) used to enqueue routing and delivery
//! tasks, an in-memory implementation, and the well-known queue names and
//! message payloads the router/worker/registry crates pass across it.

pub mod bus;
pub mod memory;
pub mod message;
pub mod queues;

pub use bus::{BusError, Command, Result, TaskBus};
pub use memory::InMemoryTaskBus;
pub use message::{DeliveryMessage, Envelope, Reply, RoutingMessage};
