use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::error::{ClusterError, Result};
use crate::protocol::{Request, Response};
use crate::transport::codec::JsonCodec;

/// Default deadline for connecting and for a full request round-trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum message size (100 MB)
const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Async TCP transport for pinmesh RPC.
///
/// The client side of the wire protocol: opens a fresh connection per
/// request, writes one length-prefixed frame, reads one back. Opening a
/// connection per request keeps concurrent calls to the same peer fully
/// independent, which the broadcast engine relies on.
///
/// # Wire Protocol
///
/// Messages are sent with a 4-byte length prefix (big-endian u32) followed
/// by the JSON-encoded data:
///
/// ```text
/// [4-byte length] [JSON data]
/// ```
///
/// # Example
///
/// ```no_run
/// use pinmesh_common::transport::TcpTransport;
/// use pinmesh_common::protocol::Request;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let addr = "127.0.0.1:9096".parse()?;
/// let request = Request::new("Cluster.Pins", json!(null));
/// let response = TcpTransport::call(addr, &request).await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport;

impl TcpTransport {
    /// Connects, sends one request, and waits for its response.
    ///
    /// The whole exchange is bounded by the request's `timeout_ms` if set,
    /// otherwise by [`DEFAULT_TIMEOUT`].
    pub async fn call(addr: std::net::SocketAddr, request: &Request) -> Result<Response> {
        let deadline = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);

        tokio::time::timeout(deadline, Self::call_inner(addr, request))
            .await
            .map_err(|_| ClusterError::Timeout(deadline.as_millis() as u64))?
    }

    async fn call_inner(addr: std::net::SocketAddr, request: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClusterError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

        let encoded = JsonCodec::encode_request(request)?;
        Self::send_message(&mut stream, &encoded).await?;

        let response_data = Self::receive_message(&mut stream).await?;
        JsonCodec::decode_response(&response_data)
    }

    /// Sends a message with length prefix.
    ///
    /// Wire format: `[4-byte length as u32 big-endian] + [data]`
    pub async fn send_message(stream: &mut TcpStream, data: &[u8]) -> Result<()> {
        let len = data.len() as u32;

        stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| Self::map_io_error(e, "writing length prefix"))?;

        stream
            .write_all(data)
            .await
            .map_err(|e| Self::map_io_error(e, "writing data"))?;

        stream
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Receives a message with length prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Reading the length prefix fails
    /// - Message exceeds maximum size (100 MB)
    /// - Reading the data fails
    pub async fn receive_message(stream: &mut TcpStream) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| Self::map_io_error(e, "reading length prefix"))?;

        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(ClusterError::InvalidResponse(format!(
                "message too large: {} bytes (max {} bytes)",
                len, MAX_MESSAGE_SIZE
            )));
        }

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| Self::map_io_error(e, "reading data"))?;

        Ok(buf)
    }

    /// Map IO errors to appropriate ClusterError variants
    fn map_io_error(err: std::io::Error, context: &str) -> ClusterError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ClusterError::Timeout(DEFAULT_TIMEOUT.as_millis() as u64)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => {
                ClusterError::Connection(format!("{}: connection lost", context))
            }
            _ => ClusterError::Io(err),
        }
    }
}
