//! Pinmesh Request Types
//!
//! This module defines the RPC request structure and unique ID generation.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::multiaddr::Multiaddr;

/// Unique identifier for an RPC request
///
/// Each request is assigned a unique 64-bit ID that combines a timestamp
/// with a counter to ensure uniqueness across the system.
pub type RequestId = u64;

/// Name of the RPC method to call
///
/// Method names have the form `"Service.Method"`, e.g. `"Cluster.Pin"`.
/// Both parts are part of the wire contract.
pub type MethodName = String;

/// RPC method arguments (JSON value)
///
/// Arguments are passed as a JSON value and can contain any
/// JSON-serializable data.
pub type RpcArgs = serde_json::Value;

/// Global counter for ensuring unique request IDs
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// An RPC request sent from one cluster peer to another.
///
/// # Request Flow
///
/// 1. A peer creates a `Request` with a `"Service.Method"` name and
///    arguments
/// 2. The request is serialized to JSON and sent with a length prefix
/// 3. The receiving peer records the sender's address (if present),
///    dispatches to the named service and executes the method
/// 4. The receiver returns a `Response` with the same request ID
///
/// # Fields
///
/// - `id`: Unique identifier (combines timestamp + counter for uniqueness)
/// - `method`: Full name of the method to call (`"Cluster.Status"`)
/// - `args`: Arguments to pass to the method (JSON value)
/// - `from`: Optional composite multiaddr of the sender. Receivers use it
///   to learn how to dial the sender back, the same way a connection-level
///   identify exchange would.
/// - `timeout_ms`: Optional timeout for request execution
///
/// # Example
///
/// ```
/// use pinmesh_common::protocol::requests::Request;
/// use serde_json::json;
///
/// // Create a basic request
/// let request = Request::new("Cluster.Status", json!("QmFoo"));
///
/// // Create a request with timeout
/// let request = Request::new("Cluster.Status", json!("QmFoo"))
///     .with_timeout(5000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Unique request identifier
    pub id: RequestId,
    /// Full method name to call
    pub method: MethodName,
    /// Method arguments
    pub args: RpcArgs,
    /// Composite multiaddr of the sender, if it wants to be dialled back
    pub from: Option<Multiaddr>,
    /// Optional timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

impl Request {
    /// Creates a new RPC request.
    ///
    /// Automatically generates a unique request ID by combining the current
    /// timestamp with an atomic counter.
    ///
    /// # Arguments
    ///
    /// * `method` - The full method name to call (e.g., `"Cluster.Pin"`)
    /// * `args` - The method arguments as a JSON value
    pub fn new(method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id: generate_request_id(),
            method: method.into(),
            args,
            from: None,
            timeout_ms: None,
        }
    }

    /// Attaches the sender's composite multiaddr.
    ///
    /// Receivers insert this address into their address book before
    /// dispatching, so that a peer which has been called once can always be
    /// answered with `Cluster.RemoteMultiaddrForPeer`.
    pub fn with_from(mut self, from: Multiaddr) -> Self {
        self.from = Some(from);
        self
    }

    /// Sets the timeout for this request.
    ///
    /// If the request takes longer than the specified timeout, it will be
    /// cancelled and a timeout error will be returned.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Generates a unique request ID.
///
/// The ID combines:
/// - Upper 32 bits: Timestamp (seconds since UNIX epoch, valid until 2106)
/// - Lower 32 bits: Atomic counter
///
/// This ensures uniqueness across restarts and within the same runtime.
fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    // Relaxed ordering is sufficient since we only need uniqueness, not
    // synchronization
    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    (timestamp << 32) | (counter & 0xFFFFFFFF)
}
