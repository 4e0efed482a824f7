use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::protocol::error::{ClusterError, Result};
use crate::protocol::{Request, Response};
use crate::transport::codec::JsonCodec;
use crate::transport::tcp::TcpTransport;

/// Maximum message size (100 MB)
const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Async TCP server carrying the pinmesh RPC protocol.
///
/// Accepts connections in a loop and spawns a task per connection. Each
/// connection processes multiple requests (keep-alive) until the peer
/// closes it.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    pub async fn bind(bind_addr: std::net::SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| ClusterError::Connection(format!("failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ClusterError::Connection(format!("failed to get local addr: {}", e)))
    }

    /// Runs the server with the given request handler.
    ///
    /// Never returns under normal operation; callers spawn it and abort the
    /// task to stop accepting.
    pub async fn run_with_handler<F, Fut>(self, handler: F) -> Result<()>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Response>> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| ClusterError::Connection(format!("failed to accept connection: {}", e)))?;

            debug!("connection established from {}", peer_addr);

            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handler).await {
                    debug!("connection from {} ended: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle a single TCP connection.
///
/// Processes multiple requests until the connection is closed.
async fn handle_connection<F, Fut>(mut stream: TcpStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Response>> + Send + 'static,
{
    loop {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // connection closed by peer
                return Ok(());
            }
            Err(e) => {
                return Err(ClusterError::Connection(format!("failed to read length: {}", e)));
            }
        }

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
            .map_err(|e| ClusterError::Connection(format!("failed to read data: {}", e)))?;

        let request = match JsonCodec::decode_request(&buf) {
            Ok(req) => req,
            Err(e) => {
                warn!("failed to decode request: {}", e);
                let error_response = Response::error(0, e.to_string());
                let encoded = JsonCodec::encode_response(&error_response)?;
                let _ = TcpTransport::send_message(&mut stream, &encoded).await;
                continue;
            }
        };

        let request_id = request.id;
        let response = match handler(request).await {
            Ok(resp) => resp,
            Err(e) => Response::error(request_id, e.to_string()),
        };

        let encoded = JsonCodec::encode_response(&response)?;
        TcpTransport::send_message(&mut stream, &encoded).await?;
    }
}
