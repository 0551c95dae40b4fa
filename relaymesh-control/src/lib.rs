//! Control-plane transport (SPEC_FULL.md §6.2): a Unix-domain-socket,
//! length-prefixed-`bincode` request/response protocol, a [`CommandHandler`]
//! trait dispatched server-side, and a matching one-shot client.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    DkimCommand, MailstatusCommand, MessageSummary, QueueCommand, QueueSummary, Request, RequestCommand, Response,
    ResponseData, ResponsePayload, WorkerCommand, WorkerSummary, PROTOCOL_VERSION,
};
pub use server::{CommandHandler, ControlServer};

pub const DEFAULT_CONTROL_SOCKET: &str = "/tmp/relaymesh.sock";
