//! The pin data model.
//!
//! These records describe what a cluster keeps pinned and how far along
//! each peer is in realizing that promise: [`Cid`] names content,
//! [`PinInfo`] is one peer's view of one pin, [`GlobalPinInfo`] aggregates
//! the whole cluster's view, and [`PeerInfo`] is a peer's self-description
//! as returned by the `Cluster.ID` RPC.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::multiaddr::Multiaddr;
use crate::peer::PeerId;
use crate::protocol::error::{ClusterError, Result};

/// A content identifier: an opaque, content-addressed hash string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(ClusterError::Address(format!("invalid cid '{}'", s)));
        }
        Ok(Cid(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

impl FromStr for Cid {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        Cid::new(s)
    }
}

/// State of one CID in one peer's tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// The tracker does not know this CID
    Unpinned,
    /// A pin request has been handed to the block-store daemon
    Pinning,
    /// The block-store daemon holds the content
    Pinned,
    /// An unpin request has been handed to the block-store daemon
    Unpinning,
    /// The daemon failed to pin
    PinError,
    /// The daemon failed to unpin
    UnpinError,
    /// The peer itself could not be reached; synthesized by broadcast
    /// queries, never reported by a tracker about itself
    ClusterError,
    /// An impossible state; treated as ClusterError when seen in a reply
    Bug,
}

/// One peer's record for one CID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinInfo {
    pub cid: Cid,
    pub peer: PeerId,
    pub status: TrackerStatus,
    pub timestamp: SystemTime,
    pub error: Option<String>,
}

impl PinInfo {
    /// A record synthesized for a peer that could not be reached.
    pub fn cluster_error(cid: &Cid, peer: PeerId, error: impl Into<String>) -> Self {
        PinInfo {
            cid: cid.clone(),
            peer,
            status: TrackerStatus::ClusterError,
            timestamp: SystemTime::now(),
            error: Some(error.into()),
        }
    }
}

/// Cluster-wide view of one CID: one [`PinInfo`] per current member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalPinInfo {
    pub cid: Cid,
    pub peer_map: HashMap<PeerId, PinInfo>,
}

impl GlobalPinInfo {
    pub fn new(cid: Cid) -> Self {
        GlobalPinInfo {
            cid,
            peer_map: HashMap::new(),
        }
    }
}

/// The block-store daemon's own identity record, relayed verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreId {
    pub id: String,
    pub addresses: Vec<String>,
    pub error: Option<String>,
}

/// Self-description of a cluster peer, returned by `Cluster.ID`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    /// Base64 ed25519 public key; absent on synthesized error records
    pub public_key: Option<String>,
    /// Listen addresses, each decorated with the peer id suffix
    pub addresses: Vec<Multiaddr>,
    /// Composite addresses of the other cluster members
    pub cluster_peers: Vec<Multiaddr>,
    pub version: String,
    pub rpc_protocol_version: String,
    /// ID record of the underlying block-store daemon
    pub store: Option<StoreId>,
    pub error: Option<String>,
}

impl PeerInfo {
    /// A record synthesized for a member whose `ID` broadcast failed.
    pub fn from_error(id: PeerId, error: impl Into<String>) -> Self {
        PeerInfo {
            id,
            public_key: None,
            addresses: Vec::new(),
            cluster_peers: Vec::new(),
            version: String::new(),
            rpc_protocol_version: String::new(),
            store: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    fn fresh_id() -> PeerId {
        PeerId::from_keypair(&SigningKey::generate(&mut OsRng))
    }

    #[test]
    fn test_cid_rejects_empty_and_whitespace() {
        assert!(Cid::new("").is_err());
        assert!(Cid::new("Qm foo").is_err());
        assert!(Cid::new("QmFoo").is_ok());
    }

    #[test]
    fn test_tracker_status_wire_names() {
        let json = serde_json::to_string(&TrackerStatus::PinError).unwrap();
        assert_eq!(json, "\"pin_error\"");
        let back: TrackerStatus = serde_json::from_str("\"cluster_error\"").unwrap();
        assert_eq!(back, TrackerStatus::ClusterError);
    }

    #[test]
    fn test_pin_info_roundtrip() {
        let info = PinInfo {
            cid: Cid::new("QmFoo").unwrap(),
            peer: fresh_id(),
            status: TrackerStatus::Pinned,
            timestamp: SystemTime::now(),
            error: None,
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: PinInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn test_global_pin_info_peer_map_keys() {
        let cid = Cid::new("QmFoo").unwrap();
        let pid = fresh_id();
        let mut gpi = GlobalPinInfo::new(cid.clone());
        gpi.peer_map
            .insert(pid, PinInfo::cluster_error(&cid, pid, "unreachable"));

        let json = serde_json::to_string(&gpi).unwrap();
        let back: GlobalPinInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.peer_map.len(), 1);
        assert_eq!(back.peer_map[&pid].status, TrackerStatus::ClusterError);
    }

    #[test]
    fn test_peer_info_error_record() {
        let pid = fresh_id();
        let info = PeerInfo::from_error(pid, "connection refused");
        assert_eq!(info.id, pid);
        assert!(info.addresses.is_empty());
        assert_eq!(info.error.as_deref(), Some("connection refused"));
    }
}
