//! Control protocol types and their `bincode` wire encoding (SPEC_FULL.md
//! §6.2): the same versioned `Request`/`Response` envelope shape
//! `empath_control` uses, resized to the commands this binary actually
//! owns.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub version: u32,
    pub command: RequestCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    Worker(WorkerCommand),
    Queue(QueueCommand),
    /// Served as a stub returning `Response::error` (§6.2): DKIM signing
    /// is an out-of-scope external collaborator.
    Dkim(DkimCommand),
    /// Served as a stub returning `Response::error` (§6.2): the
    /// relational-store-backed mailstatus cache commands are an
    /// out-of-scope external collaborator.
    Mailstatus(MailstatusCommand),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerCommand {
    ListWorkers,
    EnableWorker { ip: String },
    DisableWorker { ip: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueueCommand {
    ListQueues,
    ListMessages { ip: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DkimCommand {
    Sign { domain: String },
    Verify { domain: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MailstatusCommand {
    Cache { identifier: String },
    Clear { identifier: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub version: u32,
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    Ok,
    Data(Box<ResponseData>),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    Workers(Vec<WorkerSummary>),
    Queues(Vec<QueueSummary>),
    Messages(Vec<MessageSummary>),
    Message(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSummary {
    pub ip: String,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSummary {
    pub name: String,
    pub len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageSummary {
    pub identifier: String,
    pub attempts: u32,
    pub headers: HashMap<String, String>,
}

impl Request {
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self { version: PROTOCOL_VERSION, command }
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    #[must_use]
    pub const fn ok() -> Self {
        Self { version: PROTOCOL_VERSION, payload: ResponsePayload::Ok }
    }

    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_is_not_success() {
        assert!(!Response::error("boom").is_success());
        assert!(Response::ok().is_success());
    }

    #[test]
    fn bincode_round_trips_a_request() {
        let request = Request::new(RequestCommand::Worker(WorkerCommand::EnableWorker {
            ip: "10.0.0.1".to_owned(),
        }));
        let encoded = bincode::serde::encode_to_vec(&request, bincode::config::legacy()).unwrap();
        let (decoded, _): (Request, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::legacy()).unwrap();
        assert!(decoded.is_version_compatible());
        assert!(matches!(
            decoded.command,
            RequestCommand::Worker(WorkerCommand::EnableWorker { ip }) if ip == "10.0.0.1"
        ));
    }
}
