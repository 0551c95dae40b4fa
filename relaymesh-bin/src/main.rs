//! The `relaymesh` binary (SPEC_FULL.md §1.1, §2.1, §6): four subcommands
//! sharing one process-wiring pattern — `router`, `mx-worker`, and `gc` each
//! run a `tokio::select!` loop over a periodic tick and a shutdown
//! broadcast, while `ctl` dials the control socket for a single
//! request/response round trip and exits without joining the signal group.
//!
//! The relational store, broker, and cache are out-of-scope external
//! collaborators (SPEC_FULL.md §1); this binary wires every role against
//! this workspace's in-memory stand-ins instead of a real Redis/broker/SQL
//! deployment (see DESIGN.md).

mod config;
mod handler;
mod wiring;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use relaymesh_bus::{queues, TaskBus};
use relaymesh_common::Signal;
use relaymesh_control::{
    ControlClient, ControlServer, DkimCommand, MailstatusCommand, QueueCommand, Request, RequestCommand, ResponseData,
    ResponsePayload, WorkerCommand,
};
use relaymesh_registry::Gc;
use relaymesh_router::route_envelope;
use relaymesh_worker::send_email;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::RelayMeshConfig;
use crate::handler::RelayMeshControlHandler;
use crate::wiring::Runtime;

#[derive(Parser)]
#[command(name = "relaymesh", about = "A distributed mass-email delivery engine")]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Consume the routing queue, run the policy chain, and dispatch
    /// delivery tasks. Also hosts the control-plane socket.
    Router,
    /// Consume a single source IP's delivery queues and perform SMTP
    /// delivery via the sandbox relay.
    MxWorker {
        #[arg(long)]
        ip: String,
    },
    /// Run the periodic liveness, stranded-queue, and backlog sweeps.
    Gc,
    /// Dial the control socket for one request/response round trip.
    Ctl {
        #[command(subcommand)]
        command: CtlCommand,
    },
}

#[derive(Subcommand)]
enum CtlCommand {
    ListWorkers,
    EnableWorker { ip: String },
    DisableWorker { ip: String },
    ListQueues,
    ListMessages { ip: String },
    SignDkim { domain: String },
    VerifyDkim { domain: String },
    CacheMailstatus { identifier: String },
    ClearMailstatus { identifier: String },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    relaymesh_common::logging::init();

    let cli = Cli::parse();
    let config = RelayMeshConfig::load()?;

    if let Role::Ctl { command } = cli.role {
        return run_ctl(&config, command).await;
    }

    let runtime = Arc::new(Runtime::build(&config)?);
    let (shutdown_tx, _) = broadcast::channel(4);
    spawn_shutdown_listener(shutdown_tx.clone());

    match cli.role {
        Role::Router => run_router(runtime, config, shutdown_tx).await,
        Role::MxWorker { ip } => run_mx_worker(runtime, config, ip, shutdown_tx.subscribe()).await,
        Role::Gc => run_gc(runtime, shutdown_tx.subscribe()).await,
        Role::Ctl { .. } => unreachable!("handled above"),
    }
}

fn spawn_shutdown_listener(tx: broadcast::Sender<Signal>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, shutting down");
            let _ = tx.send(Signal::Shutdown);
        }
    });
}

/// Runs the router loop and, alongside it, the control-plane server: the
/// in-memory backends only exist within this process, so this is where
/// `ctl` commands are actually served from.
async fn run_router(runtime: Arc<Runtime>, config: RelayMeshConfig, shutdown_tx: broadcast::Sender<Signal>) -> anyhow::Result<()> {
    let handler = Arc::new(RelayMeshControlHandler::new(runtime.clone()));
    let server = ControlServer::new(config.control_socket.clone(), handler);
    let server_shutdown = shutdown_tx.subscribe();
    let control_task = tokio::spawn(async move {
        if let Err(err) = server.serve(server_shutdown).await {
            error!(%err, "control server exited with an error");
        }
    });

    let ctx = runtime.router_context(&config);
    let mut shutdown = shutdown_tx.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match ctx.routing_bus.pop(&queues::routing_queue()).await {
                    Ok(Some(message)) => {
                        if let Err(err) = route_envelope(&ctx, message).await {
                            error!(%err, "error routing envelope");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => error!(%err, "error popping routing queue"),
                }
            }
            signal = shutdown.recv() => {
                match signal {
                    Ok(Signal::Shutdown | Signal::Finalised) => { info!("router shutting down"); break; }
                    Err(err) => { error!(%err, "router shutdown channel error"); break; }
                }
            }
        }
    }

    let _ = control_task.await;
    Ok(())
}

async fn run_mx_worker(
    runtime: Arc<Runtime>,
    config: RelayMeshConfig,
    ip: String,
    mut shutdown: broadcast::Receiver<Signal>,
) -> anyhow::Result<()> {
    let ctx = runtime.worker_context(&config);
    let queue_names = [queues::worker_first_queue(&ip), queues::worker_retry_queue(&ip)];
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for queue in &queue_names {
                    let popped = runtime.delivery_bus.pop(queue).await;
                    match popped {
                        Ok(Some(message)) => {
                            if let Err(err) = send_email(&ctx, message).await {
                                error!(%err, worker = %ip, "error delivering envelope");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => error!(%err, worker = %ip, "error popping delivery queue"),
                    }
                }
            }
            signal = shutdown.recv() => {
                match signal {
                    Ok(Signal::Shutdown | Signal::Finalised) => { info!(worker = %ip, "mx worker shutting down"); break; }
                    Err(err) => { error!(%err, "mx worker shutdown channel error"); break; }
                }
            }
        }
    }
    Ok(())
}

async fn run_gc(runtime: Arc<Runtime>, mut shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
    let gc = Gc::new(
        runtime.kv.clone(),
        runtime.worker_store.clone(),
        runtime.registry.clone(),
        runtime.delivery_bus.clone(),
        runtime.routing_bus.clone(),
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = gc.ping_workers().await {
                    error!(%err, "gc: error pinging workers");
                }
                if let Err(err) = gc.check_disabled_workers().await {
                    error!(%err, "gc: error draining disabled workers");
                }
                if let Err(err) = gc.dispatch_queued().await {
                    error!(%err, "gc: error dispatching queued backlog");
                }
            }
            signal = shutdown.recv() => {
                match signal {
                    Ok(Signal::Shutdown | Signal::Finalised) => { info!("gc shutting down"); break; }
                    Err(err) => { error!(%err, "gc shutdown channel error"); break; }
                }
            }
        }
    }
    Ok(())
}

async fn run_ctl(config: &RelayMeshConfig, command: CtlCommand) -> anyhow::Result<()> {
    let client = ControlClient::new(config.control_socket.clone());
    client.check_socket_exists()?;

    let request_command = match command {
        CtlCommand::ListWorkers => RequestCommand::Worker(WorkerCommand::ListWorkers),
        CtlCommand::EnableWorker { ip } => RequestCommand::Worker(WorkerCommand::EnableWorker { ip }),
        CtlCommand::DisableWorker { ip } => RequestCommand::Worker(WorkerCommand::DisableWorker { ip }),
        CtlCommand::ListQueues => RequestCommand::Queue(QueueCommand::ListQueues),
        CtlCommand::ListMessages { ip } => RequestCommand::Queue(QueueCommand::ListMessages { ip }),
        CtlCommand::SignDkim { domain } => RequestCommand::Dkim(DkimCommand::Sign { domain }),
        CtlCommand::VerifyDkim { domain } => RequestCommand::Dkim(DkimCommand::Verify { domain }),
        CtlCommand::CacheMailstatus { identifier } => RequestCommand::Mailstatus(MailstatusCommand::Cache { identifier }),
        CtlCommand::ClearMailstatus { identifier } => RequestCommand::Mailstatus(MailstatusCommand::Clear { identifier }),
    };

    let response = client.send_request(Request::new(request_command)).await?;
    match response.payload {
        ResponsePayload::Ok => println!("ok"),
        ResponsePayload::Error(message) => println!("error: {message}"),
        ResponsePayload::Data(data) => print_response_data(&data),
    }
    Ok(())
}

fn print_response_data(data: &ResponseData) {
    match data {
        ResponseData::Workers(workers) => {
            for worker in workers {
                println!("{}\t{}\t{}", worker.ip, worker.name, if worker.enabled { "enabled" } else { "disabled" });
            }
        }
        ResponseData::Queues(queues) => {
            for queue in queues {
                println!("{}\t{}", queue.name, queue.len);
            }
        }
        ResponseData::Messages(messages) => {
            for message in messages {
                println!("{}\t{}", message.identifier, message.attempts);
            }
        }
        ResponseData::Message(message) => println!("{message}"),
    }
}
