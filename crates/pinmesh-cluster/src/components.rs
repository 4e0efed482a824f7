//! Collaborator contracts.
//!
//! The orchestrator composes a peer out of four external collaborators: the
//! replicated consensus engine, the local pin tracker, the block-store
//! connector and the external API surface. Each is consumed through one of
//! the traits below; pinmesh never looks inside them.
//!
//! Every collaborator receives an [`RpcClient`] after construction via
//! `set_client`, so it can reach any cluster peer (including the local one)
//! through the same RPC surface the orchestrator exposes.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pinmesh_common::{Cid, Multiaddr, PeerId, PinInfo, Result, StoreId};

use crate::rpc::RpcClient;

/// A snapshot of the shared pin set, read through [`Consensus::state`].
///
/// Any snapshot reflects a committed prefix of the replicated log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSet {
    cids: BTreeSet<Cid>,
}

impl PinSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cid: Cid) {
        self.cids.insert(cid);
    }

    pub fn remove(&mut self, cid: &Cid) {
        self.cids.remove(cid);
    }

    pub fn has_pin(&self, cid: &Cid) -> bool {
        self.cids.contains(cid)
    }

    pub fn list_pins(&self) -> Vec<Cid> {
        self.cids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cids.is_empty()
    }
}

/// The replicated log with leader semantics that owns the shared pin set.
///
/// All mutations of the shared state go through `log_*`; reads go through
/// `state`. The engine is expected to apply committed membership entries to
/// every peer's roster itself (through the `Cluster.PeerManager*` RPC
/// methods or equivalent hooks).
#[async_trait]
pub trait Consensus: Send + Sync {
    /// Injects the RPC client. Called once during cluster startup.
    fn set_client(&self, client: RpcClient);

    /// Commits "pin this CID" to the log.
    async fn log_pin(&self, cid: &Cid) -> Result<()>;

    /// Commits "unpin this CID" to the log.
    async fn log_unpin(&self, cid: &Cid) -> Result<()>;

    /// Commits a new member's composite address to the log.
    async fn log_add_peer(&self, addr: &Multiaddr) -> Result<()>;

    /// Commits a member's removal to the log.
    async fn log_rm_peer(&self, pid: &PeerId) -> Result<()>;

    /// A snapshot of the committed pin set.
    async fn state(&self) -> Result<PinSet>;

    /// Resolves once a leader is known and the engine is serving.
    async fn wait_ready(&self) -> Result<()>;

    /// Blocks until local state has caught up with the leader.
    async fn wait_for_sync(&self) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;
}

/// The local state machine that drives the block-store daemon, one state
/// per CID.
///
/// The reconciler fires `track`/`untrack` without joining them, so
/// implementations must tolerate overlapping and redundant calls for the
/// same CID and coalesce them.
///
/// Failures talking to the daemon are reported *inside* the returned
/// [`PinInfo`] (status `PinError`/`UnpinError` plus the `error` field);
/// `Err` is reserved for hard failures such as unknown CIDs.
#[async_trait]
pub trait PinTracker: Send + Sync {
    fn set_client(&self, client: RpcClient);

    async fn track(&self, cid: &Cid) -> Result<()>;

    async fn untrack(&self, cid: &Cid) -> Result<()>;

    /// The current record for `cid`; `Unpinned` if unknown.
    async fn status(&self, cid: &Cid) -> PinInfo;

    async fn status_all(&self) -> Vec<PinInfo>;

    /// Verifies `cid` against the daemon and returns the updated record.
    async fn sync(&self, cid: &Cid) -> Result<PinInfo>;

    async fn sync_all(&self) -> Result<Vec<PinInfo>>;

    /// Retries a pin/unpin that previously errored.
    async fn recover(&self, cid: &Cid) -> Result<PinInfo>;

    async fn shutdown(&self) -> Result<()>;
}

/// The connector to the local content-addressed block store daemon.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    fn set_client(&self, client: RpcClient);

    /// The daemon's own identity record.
    async fn id(&self) -> Result<StoreId>;

    async fn shutdown(&self) -> Result<()>;
}

/// The external API surface (HTTP or otherwise). The orchestrator only
/// manages its lifecycle.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    fn set_client(&self, client: RpcClient);

    async fn shutdown(&self) -> Result<()>;
}
