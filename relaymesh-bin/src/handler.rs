//! The concrete [`CommandHandler`] (SPEC_FULL.md §6.2): dispatches worker
//! and queue commands against this process's [`Runtime`], and returns the
//! documented stub error for the DKIM and mailstatus-cache commands, which
//! are external collaborators this workspace doesn't implement.
//!
//! Grounded in style (not trait shape — see DESIGN.md) on
//! `empath::control_handler::EmpathControlHandler`'s per-command dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use relaymesh_bus::{queues, TaskBus};
use relaymesh_control::{
    CommandHandler, DkimCommand, MailstatusCommand, MessageSummary, QueueCommand, QueueSummary, Request, RequestCommand,
    Response, ResponseData, Result as ControlResult, WorkerCommand, WorkerSummary,
};
use relaymesh_model::WorkerStore;
use tracing::info;

use crate::wiring::Runtime;

pub struct RelayMeshControlHandler {
    runtime: Arc<Runtime>,
}

impl RelayMeshControlHandler {
    #[must_use]
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    async fn handle_worker(&self, command: WorkerCommand) -> ControlResult<Response> {
        match command {
            WorkerCommand::ListWorkers => {
                let enabled = self.runtime.registry.enabled_workers().await.map_err(stringify)?;
                let disabled = self.runtime.worker_store.disabled_workers().await.map_err(stringify)?;
                let mut workers: Vec<WorkerSummary> = enabled
                    .into_iter()
                    .map(|w| WorkerSummary { ip: w.ip, name: w.name, enabled: true })
                    .collect();
                workers.extend(disabled.into_iter().map(|w| WorkerSummary { ip: w.ip, name: w.name, enabled: false }));
                Ok(Response::data(ResponseData::Workers(workers)))
            }
            WorkerCommand::EnableWorker { ip } => {
                if self.runtime.registry.enable(&ip).await.map_err(stringify)? {
                    info!(worker = %ip, "enabled worker via control command");
                    Ok(Response::ok())
                } else {
                    Ok(Response::error(format!("no such worker: {ip}")))
                }
            }
            WorkerCommand::DisableWorker { ip } => {
                if self.runtime.registry.disable(&ip).await.map_err(stringify)? {
                    info!(worker = %ip, "disabled worker via control command");
                    Ok(Response::ok())
                } else {
                    Ok(Response::error(format!("no such worker: {ip}")))
                }
            }
        }
    }

    async fn handle_queue(&self, command: QueueCommand) -> ControlResult<Response> {
        match command {
            QueueCommand::ListQueues => {
                let mut queues = vec![QueueSummary {
                    name: queues::routing_queue(),
                    len: self.runtime.routing_bus.len(&queues::routing_queue()).await.map_err(stringify)?,
                }];
                for worker in self.runtime.registry.enabled_workers().await.map_err(stringify)? {
                    for name in [queues::worker_first_queue(&worker.ip), queues::worker_retry_queue(&worker.ip)] {
                        let len = self.runtime.delivery_bus.len(&name).await.map_err(stringify)?;
                        queues.push(QueueSummary { name, len });
                    }
                }
                Ok(Response::data(ResponseData::Queues(queues)))
            }
            QueueCommand::ListMessages { ip } => {
                let budget = self.runtime.delivery_bus.len(&queues::worker_first_queue(&ip)).await.map_err(stringify)?;
                let drained = self.runtime.delivery_bus.drain(&queues::worker_first_queue(&ip), budget).await.map_err(stringify)?;
                let messages: Vec<MessageSummary> = drained
                    .iter()
                    .map(|message| MessageSummary {
                        identifier: message.identifier.to_string(),
                        attempts: message.attempts,
                        headers: message.headers.clone(),
                    })
                    .collect();
                for message in drained {
                    self.runtime
                        .delivery_bus
                        .enqueue(&queues::worker_first_queue(&ip), message, std::time::Duration::ZERO)
                        .await
                        .map_err(stringify)?;
                }
                Ok(Response::data(ResponseData::Messages(messages)))
            }
        }
    }
}

fn stringify<E: std::fmt::Display>(err: E) -> relaymesh_control::ControlError {
    relaymesh_control::ControlError::ServerError(err.to_string())
}

#[async_trait]
impl CommandHandler for RelayMeshControlHandler {
    async fn handle_request(&self, request: Request) -> ControlResult<Response> {
        match request.command {
            RequestCommand::Worker(command) => self.handle_worker(command).await,
            RequestCommand::Queue(command) => self.handle_queue(command).await,
            RequestCommand::Dkim(DkimCommand::Sign { .. } | DkimCommand::Verify { .. }) => {
                Ok(Response::error("external collaborator not implemented"))
            }
            RequestCommand::Mailstatus(MailstatusCommand::Cache { .. } | MailstatusCommand::Clear { .. }) => {
                Ok(Response::error("external collaborator not implemented"))
            }
        }
    }
}
