//! Pinmesh Protocol Definitions
//!
//! This module defines the core protocol types for pinmesh, including
//! requests, responses, and the error type used throughout the system.
//!
//! # Protocol Types
//!
//! The protocol uses JSON for serialization with the following core types:
//!
//! - **[`Request`]**: RPC requests with a `"Service.Method"` name, JSON
//!   arguments, the sender's composite multiaddr, and an optional timeout
//! - **[`Response`]**: RPC responses with result or error
//! - **[`ClusterError`]**: error type covering configuration, membership,
//!   consensus, transport and collaborator failures
//!
//! # Error Handling
//!
//! Mutating operations (pin, unpin, membership changes) fail fast and
//! surface the first error. Query operations fail soft: per-peer errors are
//! embedded in the returned records and never abort the whole query.

pub mod error;
pub mod requests;
pub mod responses;


pub use error::{ClusterError, Result};
pub use requests::{MethodName, Request, RequestId, RpcArgs};
pub use responses::{Response, RpcResult};
