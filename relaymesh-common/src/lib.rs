//! Shared types, error taxonomy, and process wiring used by every crate in
//! the relaymesh workspace.

pub mod defaults;
pub mod domain;
pub mod error;
pub mod identifier;
pub mod keys;
pub mod logging;
pub mod signal;

pub use domain::Domain;
pub use error::{ConfigError, Result, RoutingError};
pub use identifier::{DeliveryToken, MailId};
pub use signal::Signal;
