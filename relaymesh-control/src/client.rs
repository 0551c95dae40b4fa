//! One-shot client for the control socket (SPEC_FULL.md §6.2), grounded on
//! `empath_control::client` minus its persistent-connection mode (the CLI
//! surface here is one request per invocation).

use std::{path::Path, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
};
use tracing::trace;

use crate::{ControlError, Request, Response, Result};

const MAX_RESPONSE_BYTES: u32 = 10_000_000;

pub struct ControlClient {
    socket_path: String,
    timeout: Duration,
}

impl ControlClient {
    #[must_use]
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self { socket_path: socket_path.into(), timeout: Duration::from_secs(10) }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn send_request(&self, request: Request) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.send_request_internal(request))
            .await
            .map_err(|_| ControlError::Timeout)?
    }

    async fn send_request_internal(&self, request: Request) -> Result<Response> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_bytes = bincode::serde::encode_to_vec(&request, bincode::config::legacy())?;
        let request_len = u32::try_from(request_bytes.len())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

        trace!(bytes = request_len, "sending control request");
        stream.write_all(&request_len.to_be_bytes()).await?;
        stream.write_all(&request_bytes).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let response_len = u32::from_be_bytes(len_buf);
        if response_len > MAX_RESPONSE_BYTES {
            return Err(ControlError::ProtocolDeserialization(bincode::error::DecodeError::OtherString(
                format!("response too large: {response_len} bytes"),
            )));
        }

        let mut response_bytes = vec![0u8; response_len as usize];
        stream.read_exact(&mut response_bytes).await?;
        let (response, _): (Response, _) =
            bincode::serde::decode_from_slice(&response_bytes, bincode::config::legacy())?;

        if !response.is_version_compatible() {
            return Err(ControlError::ServerError(format!(
                "incompatible protocol version: server={}, client={}",
                response.version,
                crate::PROTOCOL_VERSION
            )));
        }

        if let crate::ResponsePayload::Error(ref message) = response.payload {
            return Err(ControlError::ServerError(message.clone()));
        }

        Ok(response)
    }

    /// # Errors
    /// Returns an error if the socket file does not exist.
    pub fn check_socket_exists(&self) -> Result<()> {
        if !Path::new(&self.socket_path).exists() {
            return Err(ControlError::InvalidSocketPath(format!("socket does not exist: {}", self.socket_path)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_carries_its_configured_timeout() {
        let client = ControlClient::new("/tmp/test.sock").with_timeout(Duration::from_secs(5));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_socket_is_reported_before_connecting() {
        let client = ControlClient::new("/tmp/relaymesh-definitely-missing.sock");
        assert!(client.check_socket_exists().is_err());
    }
}
