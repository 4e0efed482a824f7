//! Pinmesh Transport Layer
//!
//! TCP transport and codec for sending/receiving RPC messages between
//! cluster peers.
//!
//! # Architecture
//!
//! - **Transport**: async TCP, one connection per request on the client
//!   side, keep-alive on the server side
//! - **Codec**: JSON serialization for protocol messages
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//!
//! # Message Size Limits
//!
//! All transport implementations enforce a maximum message size of 100 MB
//! to prevent memory exhaustion attacks.
//!
//! # Timeouts
//!
//! Connect and request round-trips are bounded by a per-call deadline
//! ([`tcp::DEFAULT_TIMEOUT`] unless the request carries its own
//! `timeout_ms`). The orchestrator above this layer never cancels
//! individual calls; this is where slow peers are cut off.

pub mod codec;
pub mod tcp;
pub mod tcp_server;

pub use codec::JsonCodec;
pub use tcp::TcpTransport;
pub use tcp_server::TcpServer;
