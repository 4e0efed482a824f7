//! Test doubles for the collaborator contracts, plus a harness that stands
//! up complete peers on loopback TCP.
//!
//! The consensus double is a shared in-memory log: every instance built
//! over the same [`SharedLog`] sees the same pin set, as if the entries had
//! replicated. Committed membership entries are pushed to the members
//! through the injected RPC client, the way a real engine applies them via
//! the `Cluster.PeerManager*` methods.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tempfile::TempDir;

use pinmesh_cluster::components::{ClusterApi, Consensus, PinSet, PinTracker, StoreConnector};
use pinmesh_cluster::rpc::{RpcClient, CLUSTER_SERVICE};
use pinmesh_cluster::{Cluster, ClusterConfig};
use pinmesh_common::{Cid, ClusterError, Multiaddr, PeerId, PinInfo, Result, StoreId, TrackerStatus};

/// The cluster's "durable replicated log", shared by every peer in a test.
#[derive(Default)]
pub struct SharedLog {
    pins: Mutex<BTreeSet<Cid>>,
    members: Mutex<BTreeSet<PeerId>>,
}

impl SharedLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub struct MockConsensus {
    shared: Arc<SharedLog>,
    client: Mutex<Option<RpcClient>>,
    down: AtomicBool,
    never_ready: bool,
}

impl MockConsensus {
    pub fn new(shared: Arc<SharedLog>, start_peers: &[PeerId], never_ready: bool) -> Arc<Self> {
        shared.members.lock().unwrap().extend(start_peers.iter().copied());
        Arc::new(MockConsensus {
            shared,
            client: Mutex::new(None),
            down: AtomicBool::new(false),
            never_ready,
        })
    }

    fn client(&self) -> Result<RpcClient> {
        self.client
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClusterError::Consensus("no rpc client injected".to_string()))
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(ClusterError::Consensus("consensus is shutdown".to_string()))
        } else {
            Ok(())
        }
    }

    fn current_members(&self) -> Vec<PeerId> {
        self.shared.members.lock().unwrap().iter().copied().collect()
    }
}

#[async_trait]
impl Consensus for MockConsensus {
    fn set_client(&self, client: RpcClient) {
        *self.client.lock().unwrap() = Some(client);
    }

    async fn log_pin(&self, cid: &Cid) -> Result<()> {
        self.check_up()?;
        self.shared.pins.lock().unwrap().insert(cid.clone());
        Ok(())
    }

    async fn log_unpin(&self, cid: &Cid) -> Result<()> {
        self.check_up()?;
        self.shared.pins.lock().unwrap().remove(cid);
        Ok(())
    }

    async fn log_add_peer(&self, addr: &Multiaddr) -> Result<()> {
        self.check_up()?;
        let (pid, _) = addr.split()?;
        let members = {
            let mut members = self.shared.members.lock().unwrap();
            members.insert(pid);
            members.iter().copied().collect::<Vec<_>>()
        };

        // Apply the committed entry on every member. The joining peer gets
        // the full list from PeerAdd itself.
        let client = self.client()?;
        let args = serde_json::to_value(vec![addr.clone()])?;
        for member in members {
            if member == pid {
                continue;
            }
            let _ = client
                .call(&member, CLUSTER_SERVICE, "PeerManagerAddFromMultiaddrs", args.clone())
                .await;
        }
        Ok(())
    }

    async fn log_rm_peer(&self, pid: &PeerId) -> Result<()> {
        self.check_up()?;
        let members = self.current_members();
        self.shared.members.lock().unwrap().remove(pid);

        // The removed peer is told as well: that push is what tears it
        // down.
        let client = self.client()?;
        let args = serde_json::to_value(pid)?;
        for member in members {
            let _ = client
                .call(&member, CLUSTER_SERVICE, "PeerManagerRmPeerShutdown", args.clone())
                .await;
        }
        Ok(())
    }

    async fn state(&self) -> Result<PinSet> {
        self.check_up()?;
        let mut set = PinSet::new();
        for cid in self.shared.pins.lock().unwrap().iter() {
            set.add(cid.clone());
        }
        Ok(set)
    }

    async fn wait_ready(&self) -> Result<()> {
        if self.never_ready {
            // A peerset with no reachable leader: readiness never fires.
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        Ok(())
    }

    async fn wait_for_sync(&self) -> Result<()> {
        self.check_up()
    }

    async fn shutdown(&self) -> Result<()> {
        self.down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Map-backed tracker: `track` pins immediately, `untrack` forgets.
#[derive(Default)]
pub struct MockPinTracker {
    peer: Mutex<Option<PeerId>>,
    entries: Mutex<HashMap<Cid, PinInfo>>,
}

impl MockPinTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn peer(&self) -> PeerId {
        (*self.peer.lock().unwrap()).expect("rpc client not injected yet")
    }

    fn entry(&self, cid: &Cid, status: TrackerStatus) -> PinInfo {
        PinInfo {
            cid: cid.clone(),
            peer: self.peer(),
            status,
            timestamp: SystemTime::now(),
            error: None,
        }
    }
}

#[async_trait]
impl PinTracker for MockPinTracker {
    fn set_client(&self, client: RpcClient) {
        *self.peer.lock().unwrap() = Some(client.local_peer());
    }

    async fn track(&self, cid: &Cid) -> Result<()> {
        let info = self.entry(cid, TrackerStatus::Pinned);
        self.entries.lock().unwrap().insert(cid.clone(), info);
        Ok(())
    }

    async fn untrack(&self, cid: &Cid) -> Result<()> {
        self.entries.lock().unwrap().remove(cid);
        Ok(())
    }

    async fn status(&self, cid: &Cid) -> PinInfo {
        self.entries
            .lock()
            .unwrap()
            .get(cid)
            .cloned()
            .unwrap_or_else(|| self.entry(cid, TrackerStatus::Unpinned))
    }

    async fn status_all(&self) -> Vec<PinInfo> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    async fn sync(&self, cid: &Cid) -> Result<PinInfo> {
        Ok(self.status(cid).await)
    }

    async fn sync_all(&self) -> Result<Vec<PinInfo>> {
        Ok(self.status_all().await)
    }

    async fn recover(&self, cid: &Cid) -> Result<PinInfo> {
        Ok(self.status(cid).await)
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MockStoreConnector;

#[async_trait]
impl StoreConnector for MockStoreConnector {
    fn set_client(&self, _client: RpcClient) {}

    async fn id(&self) -> Result<StoreId> {
        Ok(StoreId {
            id: "mock-store-daemon".to_string(),
            addresses: vec!["/ip4/127.0.0.1/tcp/5001".to_string()],
            error: None,
        })
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MockApi;

#[async_trait]
impl ClusterApi for MockApi {
    fn set_client(&self, _client: RpcClient) {}

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Options for [`start_peer`].
pub struct PeerOpts {
    pub cluster_peers: Vec<Multiaddr>,
    pub bootstrap: Vec<Multiaddr>,
    pub leave_on_shutdown: bool,
    pub state_sync_seconds: u64,
    pub ready_timeout_secs: u64,
    pub never_ready: bool,
}

impl Default for PeerOpts {
    fn default() -> Self {
        PeerOpts {
            cluster_peers: Vec::new(),
            bootstrap: Vec::new(),
            leave_on_shutdown: false,
            state_sync_seconds: 1,
            ready_timeout_secs: 30,
            never_ready: false,
        }
    }
}

/// A complete peer standing on a loopback listener, with handles to its
/// doubles so tests can observe them directly.
pub struct TestPeer {
    pub cluster: Arc<Cluster>,
    pub tracker: Arc<MockPinTracker>,
    pub config: ClusterConfig,
    pub dir: Arc<TempDir>,
}

impl TestPeer {
    /// This peer's composite dialing address.
    pub async fn addr(&self) -> Multiaddr {
        self.cluster.id_info().await.addresses[0].clone()
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub async fn start_peer(shared: &Arc<SharedLog>, opts: PeerOpts) -> TestPeer {
    init_logging();
    let dir = Arc::new(tempfile::tempdir().unwrap());
    let mut config = ClusterConfig::generate("/ip4/127.0.0.1/tcp/0".parse().unwrap(), dir.path());
    config.cluster_peers = opts.cluster_peers;
    config.bootstrap = opts.bootstrap;
    config.leave_on_shutdown = opts.leave_on_shutdown;
    config.state_sync_seconds = opts.state_sync_seconds;
    config.ready_timeout_secs = opts.ready_timeout_secs;
    start_peer_with_config(shared, config, opts.never_ready, dir).await
}

pub async fn start_peer_with_config(
    shared: &Arc<SharedLog>,
    config: ClusterConfig,
    never_ready: bool,
    dir: Arc<TempDir>,
) -> TestPeer {
    let tracker = MockPinTracker::new();
    let shared = shared.clone();

    let cluster = Cluster::new(
        config.clone(),
        Arc::new(MockApi),
        Arc::new(MockStoreConnector),
        tracker.clone(),
        move |_config, start_peers| {
            let consensus: Arc<dyn Consensus> = MockConsensus::new(shared, start_peers, never_ready);
            Ok(consensus)
        },
    )
    .await
    .expect("cluster should start");

    TestPeer {
        cluster,
        tracker,
        config,
        dir,
    }
}

/// Polls `condition` every 50ms until it holds or `timeout_ms` elapses.
pub async fn wait_for<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
