//! The broadcast engine.
//!
//! Fan-out of one RPC call to every cluster member, in parallel, with
//! per-destination error capture. Reply slot *i* always corresponds to
//! destination *i*; this positional alignment is the only cross-task
//! ordering the orchestrator relies on.
//!
//! The combinators on top ([`Cluster::global_pin_info_cid`],
//! [`Cluster::global_pin_info_slice`]) merge per-peer replies into
//! cluster-wide [`GlobalPinInfo`] views. They are fail-soft: an unreachable
//! member becomes a synthesized `ClusterError` entry, and the merged view
//! always contains one entry per current member.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::error;

use pinmesh_common::{Cid, GlobalPinInfo, PeerId, PinInfo, Result, TrackerStatus};

use crate::cluster::Cluster;
use crate::rpc::CLUSTER_SERVICE;

impl Cluster {
    /// Performs the same RPC call against every destination concurrently.
    ///
    /// The returned vector has exactly one entry per destination, in
    /// destination order. No retries, no aggregation: the transport's
    /// per-call deadline is the only thing that bounds a slow peer.
    pub(crate) async fn multi_rpc(
        &self,
        dests: &[PeerId],
        service: &str,
        method: &str,
        args: Value,
    ) -> Vec<Result<Value>> {
        let calls = dests.iter().map(|pid| {
            let client = self.client().clone();
            let pid = *pid;
            let service = service.to_string();
            let method = method.to_string();
            let args = args.clone();
            async move { client.call(&pid, &service, &method, args).await }
        });

        futures::future::join_all(calls).await
    }

    /// Broadcasts a single-CID tracker query and merges the replies.
    pub(crate) async fn global_pin_info_cid(&self, method: &str, cid: &Cid) -> Result<GlobalPinInfo> {
        let members = self.members();
        let replies = self
            .multi_rpc(&members, CLUSTER_SERVICE, method, serde_json::to_value(cid)?)
            .await;

        for (pid, reply) in members.iter().zip(&replies) {
            if let Err(e) = reply {
                error!("{}: error in broadcast response from {}: {}", self.id().short(), pid.short(), e);
            }
        }

        Ok(merge_cid_replies(cid, &members, replies))
    }

    /// Broadcasts a list-returning tracker query and merges the replies,
    /// keyed by CID.
    pub(crate) async fn global_pin_info_slice(&self, method: &str) -> Result<Vec<GlobalPinInfo>> {
        let members = self.members();
        let replies = self.multi_rpc(&members, CLUSTER_SERVICE, method, Value::Null).await;

        for (pid, reply) in members.iter().zip(&replies) {
            if let Err(e) = reply {
                error!("{}: error in broadcast response from {}: {}", self.id().short(), pid.short(), e);
            }
        }

        Ok(merge_slice_replies(&members, replies))
    }
}

/// One entry per member: the reply if it parsed cleanly, a synthesized
/// `ClusterError` record otherwise. A reply claiming the impossible `Bug`
/// status is replaced wholesale.
fn merge_cid_replies(cid: &Cid, members: &[PeerId], replies: Vec<Result<Value>>) -> GlobalPinInfo {
    assert_eq!(members.len(), replies.len(), "broadcast replies must align with destinations");

    let mut global = GlobalPinInfo::new(cid.clone());
    for (pid, reply) in members.iter().zip(replies) {
        let info = match reply.and_then(|v| Ok(serde_json::from_value::<PinInfo>(v)?)) {
            Ok(info) if info.status == TrackerStatus::Bug => {
                PinInfo::cluster_error(cid, *pid, "impossible tracker status in reply")
            }
            Ok(info) => info,
            Err(e) => PinInfo::cluster_error(cid, *pid, e.to_string()),
        };
        global.peer_map.insert(*pid, info);
    }
    global
}

/// Merges per-peer pin listings keyed by CID. Members whose call failed
/// get a `ClusterError` entry under every CID known after the merge.
fn merge_slice_replies(members: &[PeerId], replies: Vec<Result<Value>>) -> Vec<GlobalPinInfo> {
    assert_eq!(members.len(), replies.len(), "broadcast replies must align with destinations");

    let mut merged: BTreeMap<Cid, GlobalPinInfo> = BTreeMap::new();
    let mut errored: Vec<(PeerId, String)> = Vec::new();

    for (pid, reply) in members.iter().zip(replies) {
        let infos = match reply.and_then(|v| Ok(serde_json::from_value::<Vec<PinInfo>>(v)?)) {
            Ok(infos) => infos,
            Err(e) => {
                errored.push((*pid, e.to_string()));
                continue;
            }
        };
        for info in infos {
            let info = if info.status == TrackerStatus::Bug {
                PinInfo::cluster_error(&info.cid, *pid, "impossible tracker status in reply")
            } else {
                info
            };
            merged
                .entry(info.cid.clone())
                .or_insert_with(|| GlobalPinInfo::new(info.cid.clone()))
                .peer_map
                .insert(*pid, info);
        }
    }

    for (pid, msg) in errored {
        for (cid, global) in merged.iter_mut() {
            global.peer_map.insert(pid, PinInfo::cluster_error(cid, pid, msg.clone()));
        }
    }

    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use serde_json::json;
    use std::time::SystemTime;

    use pinmesh_common::ClusterError;

    fn fresh_id() -> PeerId {
        PeerId::from_keypair(&SigningKey::generate(&mut OsRng))
    }

    fn cid(s: &str) -> Cid {
        s.parse().unwrap()
    }

    fn info(c: &Cid, pid: PeerId, status: TrackerStatus) -> PinInfo {
        PinInfo {
            cid: c.clone(),
            peer: pid,
            status,
            timestamp: SystemTime::now(),
            error: None,
        }
    }

    #[test]
    fn test_merge_cid_all_ok() {
        let c = cid("QmZ");
        let members = vec![fresh_id(), fresh_id()];
        let replies = members
            .iter()
            .map(|pid| Ok(serde_json::to_value(info(&c, *pid, TrackerStatus::Pinned)).unwrap()))
            .collect();

        let global = merge_cid_replies(&c, &members, replies);
        assert_eq!(global.peer_map.len(), 2);
        for pid in &members {
            assert_eq!(global.peer_map[pid].status, TrackerStatus::Pinned);
        }
    }

    #[test]
    fn test_merge_cid_synthesizes_cluster_error() {
        let c = cid("QmZ");
        let alive = fresh_id();
        let dead = fresh_id();
        let members = vec![alive, dead];
        let replies = vec![
            Ok(serde_json::to_value(info(&c, alive, TrackerStatus::Pinned)).unwrap()),
            Err(ClusterError::Connection("connection refused".to_string())),
        ];

        let global = merge_cid_replies(&c, &members, replies);
        assert_eq!(global.peer_map.len(), 2);
        assert_eq!(global.peer_map[&alive].status, TrackerStatus::Pinned);

        let dead_entry = &global.peer_map[&dead];
        assert_eq!(dead_entry.status, TrackerStatus::ClusterError);
        assert!(dead_entry.error.as_ref().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_merge_cid_replaces_bug_status() {
        let c = cid("QmZ");
        let pid = fresh_id();
        let replies = vec![Ok(serde_json::to_value(info(&c, pid, TrackerStatus::Bug)).unwrap())];

        let global = merge_cid_replies(&c, &[pid], replies);
        assert_eq!(global.peer_map[&pid].status, TrackerStatus::ClusterError);
    }

    #[test]
    fn test_merge_cid_unparseable_reply() {
        let c = cid("QmZ");
        let pid = fresh_id();
        let replies = vec![Ok(json!("definitely not a pin info"))];

        let global = merge_cid_replies(&c, &[pid], replies);
        assert_eq!(global.peer_map[&pid].status, TrackerStatus::ClusterError);
    }

    #[test]
    fn test_merge_slice_by_cid() {
        let a = fresh_id();
        let b = fresh_id();
        let members = vec![a, b];
        let replies = vec![
            Ok(json!([
                info(&cid("QmX"), a, TrackerStatus::Pinned),
                info(&cid("QmY"), a, TrackerStatus::Pinning),
            ])),
            Ok(json!([info(&cid("QmX"), b, TrackerStatus::Pinned)])),
        ];

        let merged = merge_slice_replies(&members, replies);
        assert_eq!(merged.len(), 2);

        let x = merged.iter().find(|g| g.cid == cid("QmX")).unwrap();
        assert_eq!(x.peer_map.len(), 2);
        let y = merged.iter().find(|g| g.cid == cid("QmY")).unwrap();
        assert_eq!(y.peer_map.len(), 1);
    }

    #[test]
    fn test_merge_slice_errored_peer_appears_under_every_cid() {
        let alive = fresh_id();
        let dead = fresh_id();
        let members = vec![alive, dead];
        let replies = vec![
            Ok(json!([
                info(&cid("QmX"), alive, TrackerStatus::Pinned),
                info(&cid("QmY"), alive, TrackerStatus::Pinned),
            ])),
            Err(ClusterError::Timeout(5000)),
        ];

        let merged = merge_slice_replies(&members, replies);
        assert_eq!(merged.len(), 2);
        for global in &merged {
            assert_eq!(global.peer_map.len(), 2, "every member must be represented");
            assert_eq!(global.peer_map[&dead].status, TrackerStatus::ClusterError);
        }
    }

    #[test]
    fn test_merge_slice_empty_cluster_view() {
        let dead = fresh_id();
        let replies = vec![Err(ClusterError::Timeout(5000))];
        // No CIDs known at all: nothing to attach the error to.
        let merged = merge_slice_replies(&[dead], replies);
        assert!(merged.is_empty());
    }
}
