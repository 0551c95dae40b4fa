//! The control server: a Unix-domain-socket, length-prefixed-`bincode`
//! transport (SPEC_FULL.md §6.2), grounded directly on
//! `empath_control::server`.

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::broadcast,
};
use tracing::{debug, error, info, trace, warn};

use crate::{ControlError, Request, Response, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REQUEST_BYTES: u32 = 1_000_000;

/// Implemented once per binary, dispatching each decoded [`Request`] against
/// whatever this process actually owns (SPEC_FULL.md §6.2 draws the line at
/// `WorkerRegistry`/`KVStore`/`TaskBus`).
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle_request(&self, request: Request) -> Result<Response>;
}

pub struct ControlServer {
    socket_path: String,
    handler: Arc<dyn CommandHandler>,
}

impl ControlServer {
    #[must_use]
    pub fn new(socket_path: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self { socket_path: socket_path.into(), handler }
    }

    /// Runs until `shutdown` fires. Detects and removes a stale socket file
    /// left behind by a crashed prior instance, refusing to bind if another
    /// instance is actually listening.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<relaymesh_common::Signal>) -> Result<()> {
        let socket_path = Path::new(&self.socket_path);
        if socket_path.exists() {
            if UnixStream::connect(socket_path).await.is_ok() {
                return Err(ControlError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!("socket already in use by a running instance: {}", self.socket_path),
                )));
            }
            info!(socket = %self.socket_path, "removing stale socket file");
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(&self.socket_path).await?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.socket_path, perms).await?;
        }
        info!(socket = %self.socket_path, "control server listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Err(err) = Self::handle_connection(stream, handler).await {
                                    error!(%err, "error handling control connection");
                                }
                            });
                        }
                        Err(err) => error!(%err, "error accepting control connection"),
                    }
                }
                signal = shutdown.recv() => {
                    match signal {
                        Ok(relaymesh_common::Signal::Shutdown | relaymesh_common::Signal::Finalised) => {
                            info!("control server shutting down");
                            break;
                        }
                        Err(err) => {
                            error!(%err, "control server shutdown channel error");
                            break;
                        }
                    }
                }
            }
        }

        if socket_path.exists() {
            debug!(socket = %self.socket_path, "removing socket file");
            let _ = tokio::fs::remove_file(socket_path).await;
        }
        Ok(())
    }

    async fn handle_connection(mut stream: UnixStream, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let request = tokio::time::timeout(REQUEST_TIMEOUT, Self::read_request(&mut stream))
            .await
            .map_err(|_| ControlError::Timeout)??;

        trace!(?request, "received control request");

        let response = match handler.handle_request(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "error handling control request");
                Response::error(err.to_string())
            }
        };

        tokio::time::timeout(REQUEST_TIMEOUT, Self::write_response(&mut stream, &response))
            .await
            .map_err(|_| ControlError::Timeout)??;
        Ok(())
    }

    async fn read_request(stream: &mut UnixStream) -> Result<Request> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                ControlError::ConnectionClosed
            } else {
                ControlError::Io(err)
            }
        })?;

        let request_len = u32::from_be_bytes(len_buf);
        if request_len > MAX_REQUEST_BYTES {
            return Err(ControlError::ProtocolDeserialization(bincode::error::DecodeError::OtherString(
                format!("request too large: {request_len} bytes"),
            )));
        }

        let mut request_bytes = vec![0u8; request_len as usize];
        stream.read_exact(&mut request_bytes).await?;
        let (request, _): (Request, _) = bincode::serde::decode_from_slice(&request_bytes, bincode::config::legacy())?;
        Ok(request)
    }

    async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
        let response_bytes = bincode::serde::encode_to_vec(response, bincode::config::legacy())?;
        let response_len = u32::try_from(response_bytes.len())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

        stream.write_all(&response_len.to_be_bytes()).await?;
        stream.write_all(&response_bytes).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestCommand, WorkerCommand};

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler for EchoHandler {
        async fn handle_request(&self, request: Request) -> Result<Response> {
            match request.command {
                RequestCommand::Worker(WorkerCommand::ListWorkers) => Ok(Response::ok()),
                _ => Ok(Response::error("unhandled in test")),
            }
        }
    }

    #[tokio::test]
    async fn round_trips_a_request_over_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("control.sock");
        let server = ControlServer::new(socket_path.to_str().unwrap(), Arc::new(EchoHandler));
        let (_tx, rx) = broadcast::channel(1);

        let socket_path_clone = socket_path.clone();
        let handle = tokio::spawn(async move { server.serve(rx).await });

        // Give the listener a moment to bind.
        for _ in 0..50 {
            if UnixStream::connect(&socket_path_clone).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let client = crate::ControlClient::new(socket_path.to_str().unwrap());
        let response = client
            .send_request(Request::new(RequestCommand::Worker(WorkerCommand::ListWorkers)))
            .await
            .unwrap();
        assert!(response.is_success());

        _tx.send(relaymesh_common::Signal::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }
}
