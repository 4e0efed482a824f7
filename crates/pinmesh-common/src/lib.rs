//! Pinmesh Common Types and Transport
//!
//! This crate provides everything that crosses the wire between pinmesh
//! peers or is shared by every component of the system:
//!
//! - **Protocol Layer**: the RPC `Request`/`Response` envelope, error
//!   handling, and type definitions
//! - **Transport Layer**: length-prefixed TCP framing with JSON
//!   serialization
//! - **Identity**: ed25519-backed [`PeerId`]s and composite [`Multiaddr`]s
//! - **Pin data model**: [`Cid`], [`PinInfo`], [`GlobalPinInfo`] and the
//!   peer self-description record [`PeerInfo`]
//!
//! # Overview
//!
//! A pinmesh cluster is a set of peers that agree, through a replicated
//! log, on a shared set of content identifiers to keep pinned. Peers talk
//! to each other over a small JSON-over-TCP RPC protocol; this crate holds
//! the protocol and the records that travel over it. The orchestrator
//! itself lives in `pinmesh-cluster`.
//!
//! # Example
//!
//! ```
//! use pinmesh_common::{Request, Response};
//! use serde_json::json;
//!
//! // Create a request for a remote peer
//! let request = Request::new("Cluster.Pin", json!("QmFoo"));
//!
//! // Process and create a response
//! let response = Response::success(request.id, json!(null));
//! ```

pub mod multiaddr;
pub mod peer;
pub mod pin;
pub mod protocol;
pub mod transport;

pub use multiaddr::Multiaddr;
pub use peer::PeerId;
pub use pin::{Cid, GlobalPinInfo, PeerInfo, PinInfo, StoreId, TrackerStatus};
pub use protocol::{ClusterError, Request, Response, Result};
