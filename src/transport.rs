use crate::config::Config;
use crate::error::{GatewayError, GatewayResult};
use crate::resp;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Largest reply the transport will buffer before giving up (64MB).
const MAX_REPLY_LEN: usize = 64 * 1024 * 1024;

/// One-shot connection to the store: connect, write one command, read one
/// reply, close.
#[derive(Debug, Clone)]
pub struct Transport {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Transport {
    pub fn new(config: &Config) -> Self {
        Transport {
            host: config.store_host.clone(),
            port: config.store_port,
            timeout: config.store_timeout(),
        }
    }

    /// Send `command` on a fresh connection and return the raw reply.
    ///
    /// Reads accumulate until the buffer holds a structurally complete reply
    /// or the store closes the connection. The stream is dropped, and so
    /// closed, on every return path.
    pub async fn execute(&self, command: &[u8]) -> GatewayResult<BytesMut> {
        self.round_trip(command)
            .await
            .map_err(|source| GatewayError::Transport {
                host: self.host.clone(),
                port: self.port,
                command: String::from_utf8_lossy(command).trim_end().to_string(),
                source,
            })
    }

    async fn round_trip(&self, command: &[u8]) -> io::Result<BytesMut> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = self
            .bounded("connect", TcpStream::connect(&addr))
            .await?;

        self.bounded("write", stream.write_all(command)).await?;

        let mut buf = BytesMut::with_capacity(4096);
        loop {
            let n = self.bounded("read", stream.read_buf(&mut buf)).await?;
            if n == 0 {
                debug!("Store at {addr} closed the connection after {} bytes", buf.len());
                break;
            }
            if resp::is_complete(&buf) {
                break;
            }
            if buf.len() > MAX_REPLY_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("reply exceeds {MAX_REPLY_LEN} bytes"),
                ));
            }
        }

        // Best effort; the socket closes on drop either way.
        let _ = stream.shutdown().await;
        debug!("Store round trip to {addr}: {} bytes", buf.len());
        Ok(buf)
    }

    async fn bounded<T, F>(&self, stage: &str, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{stage} timed out after {}ms", self.timeout.as_millis()),
            )),
        }
    }
}
