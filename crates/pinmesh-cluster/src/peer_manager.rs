//! The membership roster.
//!
//! The peer manager is the canonical in-memory list of cluster members plus
//! the bookkeeping that lets the RPC client dial them. It is deliberately
//! dumb: membership *decisions* (join, add, remove) live in the cluster
//! façade and in the consensus engine; the manager only records their
//! outcome and persists the roster across restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use pinmesh_common::{ClusterError, Multiaddr, PeerId, Result};

use crate::rpc::AddressBook;

pub struct PeerManager {
    local: PeerId,
    local_addr: Multiaddr,
    peers: RwLock<BTreeMap<PeerId, Vec<Multiaddr>>>,
    address_book: AddressBook,
    store_path: PathBuf,
}

impl PeerManager {
    /// Creates a roster containing only the local peer.
    pub fn new(local: PeerId, local_addr: Multiaddr, address_book: AddressBook, store_path: PathBuf) -> Self {
        let local_addr = local_addr.transport();
        address_book.add(local, local_addr.socket_addr());

        let mut peers = BTreeMap::new();
        peers.insert(local, vec![local_addr.clone()]);

        PeerManager {
            local,
            local_addr,
            peers: RwLock::new(peers),
            address_book,
            store_path,
        }
    }

    /// Records every address in `addrs`, splitting each into peer id and
    /// transport address. A malformed address is fatal for that address
    /// only.
    pub fn add_from_multiaddrs(&self, addrs: &[Multiaddr]) {
        for addr in addrs {
            match addr.split() {
                Ok((pid, transport)) => self.record(pid, transport),
                Err(e) => warn!("skipping address {}: {}", addr, e),
            }
        }
    }

    /// Adds a single peer from its composite address.
    ///
    /// Fails if the address is malformed, or if it names this peer at its
    /// own listen address.
    pub fn add_peer(&self, addr: &Multiaddr) -> Result<PeerId> {
        let (pid, transport) = addr.split()?;
        if pid == self.local && transport == self.local_addr {
            return Err(ClusterError::Address(format!(
                "{} is our own listen address",
                addr
            )));
        }
        self.record(pid, transport);
        Ok(pid)
    }

    fn record(&self, pid: PeerId, transport: Multiaddr) {
        self.address_book.add(pid, transport.socket_addr());
        let mut peers = self.peers.write().unwrap();
        let entry = peers.entry(pid).or_default();
        if !entry.contains(&transport) {
            entry.push(transport);
        }
    }

    /// Drops a peer from the roster. Its address-book entries stay: they
    /// are still needed to deliver the shutdown push to a removed peer.
    pub fn rm_peer(&self, pid: &PeerId) {
        self.peers.write().unwrap().remove(pid);
        debug!("removed peer {}", pid.short());
    }

    /// All current members, local peer included, in stable order.
    ///
    /// Broadcast reply vectors are positionally aligned with this list, so
    /// the ordering must not depend on insertion history.
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.read().unwrap().keys().copied().collect()
    }

    /// Composite addresses of every member except the local peer.
    pub fn peers_addrs(&self) -> Vec<Multiaddr> {
        let peers = self.peers.read().unwrap();
        peers
            .iter()
            .filter(|(pid, _)| **pid != self.local)
            .flat_map(|(pid, addrs)| addrs.iter().map(|a| a.with_peer(*pid)))
            .collect()
    }

    pub fn is_peer(&self, pid: &PeerId) -> bool {
        self.peers.read().unwrap().contains_key(pid)
    }

    /// Persists the roster snapshot. Errors are logged and swallowed: a
    /// failed save must never abort a shutdown.
    pub fn save_peers(&self) {
        let addrs = self.peers_addrs();
        let write = || -> Result<()> {
            if let Some(parent) = self.store_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.store_path, serde_json::to_vec_pretty(&addrs)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!("could not save peer roster to {}: {}", self.store_path.display(), e);
        }
    }

    /// Resets the roster to only the local peer.
    pub fn reset_peers(&self) {
        let mut peers = self.peers.write().unwrap();
        peers.clear();
        peers.insert(self.local, vec![self.local_addr.clone()]);
    }

    /// Reads a previously saved roster snapshot. A missing or unreadable
    /// file yields an empty list.
    pub fn saved_peers(store_path: &Path) -> Vec<Multiaddr> {
        match std::fs::read(store_path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(addrs) => addrs,
                Err(e) => {
                    warn!("ignoring corrupt peer roster {}: {}", store_path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
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

    fn addr(port: u16) -> Multiaddr {
        format!("/ip4/127.0.0.1/tcp/{}", port).parse().unwrap()
    }

    fn manager(local: PeerId, dir: &Path) -> PeerManager {
        PeerManager::new(local, addr(9096), AddressBook::new(), dir.join("peerstore.json"))
    }

    #[test]
    fn test_local_peer_always_present() {
        let dir = tempfile::tempdir().unwrap();
        let local = fresh_id();
        let pm = manager(local, dir.path());

        assert_eq!(pm.peers(), vec![local]);
        assert!(pm.is_peer(&local));
        assert!(pm.peers_addrs().is_empty());
    }

    #[test]
    fn test_add_and_remove_peer() {
        let dir = tempfile::tempdir().unwrap();
        let local = fresh_id();
        let other = fresh_id();
        let pm = manager(local, dir.path());

        let pid = pm.add_peer(&addr(9097).with_peer(other)).unwrap();
        assert_eq!(pid, other);
        assert!(pm.is_peer(&other));
        assert_eq!(pm.peers().len(), 2);
        assert_eq!(pm.peers_addrs(), vec![addr(9097).with_peer(other)]);

        pm.rm_peer(&other);
        assert!(!pm.is_peer(&other));
        assert_eq!(pm.peers(), vec![local]);
    }

    #[test]
    fn test_add_peer_rejects_own_listen_address() {
        let dir = tempfile::tempdir().unwrap();
        let local = fresh_id();
        let pm = manager(local, dir.path());

        assert!(pm.add_peer(&addr(9096).with_peer(local)).is_err());
        // A different address for ourselves is allowed.
        assert!(pm.add_peer(&addr(9999).with_peer(local)).is_ok());
    }

    #[test]
    fn test_add_from_multiaddrs_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let local = fresh_id();
        let other = fresh_id();
        let pm = manager(local, dir.path());

        // One composite address, one bare address with no peer component.
        pm.add_from_multiaddrs(&[addr(9097).with_peer(other), addr(9098)]);
        assert_eq!(pm.peers().len(), 2);
        assert!(pm.is_peer(&other));
    }

    #[test]
    fn test_peers_order_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let local = fresh_id();
        let pm = manager(local, dir.path());

        let mut ids = vec![local];
        for port in 9100..9105 {
            let pid = fresh_id();
            ids.push(pid);
            pm.add_peer(&addr(port).with_peer(pid)).unwrap();
        }
        ids.sort();

        assert_eq!(pm.peers(), ids);
        assert_eq!(pm.peers(), pm.peers());
    }

    #[test]
    fn test_save_and_reload_roster() {
        let dir = tempfile::tempdir().unwrap();
        let local = fresh_id();
        let other = fresh_id();
        let pm = manager(local, dir.path());

        pm.add_peer(&addr(9097).with_peer(other)).unwrap();
        pm.save_peers();

        let saved = PeerManager::saved_peers(&dir.path().join("peerstore.json"));
        assert_eq!(saved, vec![addr(9097).with_peer(other)]);
    }

    #[test]
    fn test_saved_peers_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PeerManager::saved_peers(&dir.path().join("nope.json")).is_empty());
    }

    #[test]
    fn test_reset_peers() {
        let dir = tempfile::tempdir().unwrap();
        let local = fresh_id();
        let other = fresh_id();
        let pm = manager(local, dir.path());

        pm.add_peer(&addr(9097).with_peer(other)).unwrap();
        pm.reset_peers();
        assert_eq!(pm.peers(), vec![local]);

        pm.save_peers();
        let saved = PeerManager::saved_peers(&dir.path().join("peerstore.json"));
        assert!(saved.is_empty());
    }
}
