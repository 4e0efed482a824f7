//! The cluster orchestrator.
//!
//! [`Cluster`] is the component that wires a peer together: it owns the RPC
//! surface, the peer manager and the background workers, consumes the four
//! collaborator traits, and exposes the public operations (pin, unpin,
//! status, sync, recover, membership, id) that external APIs route into.
//!
//! Mutations of the shared pin set go through the consensus log and are
//! fail-fast. Cluster-wide queries go through the broadcast engine and are
//! fail-soft: every current member is represented in the result, by its
//! reply or by a synthesized error entry.

use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pinmesh_common::{
    Cid, ClusterError, GlobalPinInfo, Multiaddr, PeerId, PeerInfo, PinInfo, Result, StoreId,
    TrackerStatus,
};

use crate::components::{ClusterApi, Consensus, PinTracker, StoreConnector};
use crate::config::ClusterConfig;
use crate::peer_manager::PeerManager;
use crate::rpc::{
    AddressBook, RpcClient, RpcServer, RpcService, ServiceRegistry, CLUSTER_SERVICE, RPC_PROTOCOL,
};

/// Orchestrator version, reported in ID records and over RPC.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A running cluster peer.
///
/// Construction returns while initialization may still be in progress
/// (consensus can still be bootstrapping); use [`Cluster::wait_for_ready`]
/// to block until the peer is fully up. [`Cluster::shutdown`] is idempotent
/// and closes the done signal exactly once.
pub struct Cluster {
    config: ClusterConfig,
    id: PeerId,
    listen_addr: Multiaddr,
    peer_manager: Arc<PeerManager>,
    address_book: AddressBook,
    rpc_client: RpcClient,
    consensus: Arc<dyn Consensus>,
    api: Arc<dyn ClusterApi>,
    connector: Arc<dyn StoreConnector>,
    tracker: Arc<dyn PinTracker>,
    seeded_from_saved: bool,

    // Shutdown is serialized and idempotent: the flag lives inside the lock.
    shutdown_state: Mutex<bool>,
    // Only one PeerAdd may be in flight on a given peer; mutual joins
    // deadlock otherwise (each side blocks on the other's reverse call).
    peer_add_lock: Mutex<()>,

    cancel_tx: watch::Sender<bool>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,

    tasks: StdMutex<Vec<JoinHandle<()>>>,
    server_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Cluster {
    /// Builds and starts a cluster peer.
    ///
    /// Brings up the RPC listener, seeds the peer manager from the
    /// configured cluster peers (or the saved roster, or the bootstrap
    /// list), builds the consensus engine over the seeded peer set, injects
    /// the RPC client into every collaborator, and launches the background
    /// workers.
    ///
    /// `make_consensus` receives the config and the initial peer set
    /// (seeded peers plus this peer) and returns the consensus engine.
    pub async fn new<F>(
        config: ClusterConfig,
        api: Arc<dyn ClusterApi>,
        connector: Arc<dyn StoreConnector>,
        tracker: Arc<dyn PinTracker>,
        make_consensus: F,
    ) -> Result<Arc<Cluster>>
    where
        F: FnOnce(&ClusterConfig, &[PeerId]) -> Result<Arc<dyn Consensus>>,
    {
        config.validate()?;
        let id = config.id;

        let registry = ServiceRegistry::new();
        let address_book = AddressBook::new();
        let server = RpcServer::bind(&config.cluster_addr, registry.clone(), address_book.clone()).await?;
        let listen_addr = Multiaddr::from_socket_addr(server.local_addr());

        info!("pinmesh v{} listening on:", VERSION);
        info!("        {}", listen_addr.with_peer(id));

        // Authoritative peer list first, then whatever the last run left
        // behind, then the bootstrap entry points. A roster restored from
        // a previous run counts as already joined.
        let saved = if config.cluster_peers.is_empty() {
            PeerManager::saved_peers(&config.peer_store_file)
        } else {
            Vec::new()
        };
        let seeded_from_saved = !saved.is_empty();
        let seed = if !config.cluster_peers.is_empty() {
            config.cluster_peers.clone()
        } else if seeded_from_saved {
            saved
        } else {
            config.bootstrap.clone()
        };

        let peer_manager = Arc::new(PeerManager::new(
            id,
            listen_addr.clone(),
            address_book.clone(),
            config.peer_store_file.clone(),
        ));
        peer_manager.add_from_multiaddrs(&seed);

        let start_peers = peer_manager.peers();
        let consensus = match make_consensus(&config, &start_peers) {
            Ok(consensus) => consensus,
            Err(e) => {
                error!("error creating consensus: {}", e);
                let _ = api.shutdown().await;
                let _ = connector.shutdown().await;
                let _ = tracker.shutdown().await;
                return Err(e);
            }
        };

        let rpc_client = RpcClient::new(id, listen_addr.with_peer(id), registry.clone(), address_book.clone());

        tracker.set_client(rpc_client.clone());
        connector.set_client(rpc_client.clone());
        api.set_client(rpc_client.clone());
        consensus.set_client(rpc_client.clone());

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        let cluster = Arc::new(Cluster {
            config,
            id,
            listen_addr,
            peer_manager,
            address_book,
            rpc_client,
            consensus,
            api,
            connector,
            tracker,
            seeded_from_saved,
            shutdown_state: Mutex::new(false),
            peer_add_lock: Mutex::new(()),
            cancel_tx,
            ready_tx,
            ready_rx,
            done_tx,
            done_rx,
            tasks: StdMutex::new(Vec::new()),
            server_task: StdMutex::new(None),
        });

        registry.register(
            CLUSTER_SERVICE,
            Arc::new(ClusterRpc {
                cluster: Arc::downgrade(&cluster),
            }),
        );

        *cluster.server_task.lock().unwrap() = Some(server.spawn());

        let worker = cluster.clone();
        let rx = cancel_rx.clone();
        cluster
            .tasks
            .lock()
            .unwrap()
            .push(tokio::spawn(async move { worker.state_sync_watcher(rx).await }));

        let worker = cluster.clone();
        cluster
            .tasks
            .lock()
            .unwrap()
            .push(tokio::spawn(async move { worker.bootstrap_and_ready(cancel_rx).await }));

        Ok(cluster)
    }

    /// This peer's id.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The orchestrator version string.
    pub fn version(&self) -> &'static str {
        VERSION
    }

    pub(crate) fn client(&self) -> &RpcClient {
        &self.rpc_client
    }

    pub(crate) fn members(&self) -> Vec<PeerId> {
        self.peer_manager.peers()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// A receiver that flips to `true` once startup has completed.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Blocks until the peer is fully initialized, consensus included.
    pub async fn wait_for_ready(&self) {
        let mut rx = self.ready_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// A receiver that flips to `true` after shutdown completes. Useful to
    /// learn that a peer was torn down remotely (e.g. removed from the
    /// cluster).
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }

    pub async fn wait_for_done(&self) {
        let mut rx = self.done_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn state_sync_watcher(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.state_sync_seconds);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.state_sync().await {
                        warn!("periodic state sync failed: {}", e);
                    }
                }
                _ = cancel.changed() => return,
            }
        }
    }

    async fn bootstrap_and_ready(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        if !self.bootstrap().await {
            error!("bootstrap unsuccessful");
            self.clone().shutdown_in_background();
            return;
        }

        // Bootstrap runs first: with dirty state, consensus may hold a
        // peerset and no leader, and readiness would never fire.
        let deadline = Duration::from_secs(self.config.ready_timeout_secs);
        tokio::select! {
            res = tokio::time::timeout(deadline, self.consensus.wait_ready()) => match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("consensus failed to start: {}", e);
                    self.clone().shutdown_in_background();
                    return;
                }
                Err(_) => {
                    error!("consensus start timed out");
                    self.clone().shutdown_in_background();
                    return;
                }
            },
            _ = cancel.changed() => return,
        }

        let _ = self.ready_tx.send(true);
        info!("pinmesh cluster is ready");

        let peers = self.peer_manager.peers_addrs();
        if peers.is_empty() {
            info!("cluster peers (not including ourselves): none");
        }
        for addr in peers {
            info!("cluster peer: {}", addr);
        }
    }

    /// Tries each bootstrap address in order; the first successful join
    /// wins. Returns true when no bootstrapping was needed at all.
    async fn bootstrap(&self) -> bool {
        if self.config.bootstrap.is_empty()
            || !self.config.cluster_peers.is_empty()
            || self.seeded_from_saved
        {
            return true;
        }

        for addr in &self.config.bootstrap {
            info!("bootstrapping to {}", addr);
            match self.join(addr).await {
                Ok(()) => return true,
                Err(e) => error!("bootstrap to {} failed: {}", addr, e),
            }
        }
        false
    }

    /// The worker paths cannot call `shutdown` inline: shutdown joins the
    /// workers, and a worker awaiting its own handle would never finish.
    fn shutdown_in_background(self: Arc<Self>) {
        tokio::spawn(async move {
            if let Err(e) = self.shutdown().await {
                error!("shutdown after lifecycle failure: {}", e);
            }
        });
    }

    /// Stops this peer: leaves the cluster if configured to, shuts the
    /// collaborators down in order, persists the roster, stops the
    /// background workers and closes the listener.
    ///
    /// Idempotent; repeated calls return `Ok` immediately.
    pub async fn shutdown(&self) -> Result<()> {
        let mut shut = self.shutdown_state.lock().await;
        if *shut {
            warn!("cluster already shutdown");
            return Ok(());
        }

        info!("shutting down pinmesh cluster");

        if self.config.leave_on_shutdown {
            // Best effort. The pause gives the removal entry time to
            // replicate; consensus exposes no explicit ack to wait on.
            warn!("attempting to leave the cluster; this may take a couple of seconds");
            match self.consensus.log_rm_peer(&self.id).await {
                Ok(()) => tokio::time::sleep(Duration::from_secs(2)).await,
                Err(e) => error!("leaving cluster: {}", e),
            }
            self.peer_manager.reset_peers();
        }

        if let Err(e) = self.consensus.shutdown().await {
            error!("error stopping consensus: {}", e);
            return Err(e);
        }

        self.peer_manager.save_peers();

        if let Err(e) = self.api.shutdown().await {
            error!("error stopping API: {}", e);
            return Err(e);
        }
        if let Err(e) = self.connector.shutdown().await {
            error!("error stopping store connector: {}", e);
            return Err(e);
        }
        if let Err(e) = self.tracker.shutdown().await {
            error!("error stopping pin tracker: {}", e);
            return Err(e);
        }

        let _ = self.cancel_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        if let Some(server) = self.server_task.lock().unwrap().take() {
            server.abort();
        }

        *shut = true;
        let _ = self.done_tx.send(true);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Membership protocol
    // ------------------------------------------------------------------

    /// Attaches this peer to an existing cluster through `addr`.
    ///
    /// The remote side performs the actual join via `PeerAdd`; afterwards
    /// this peer waits for consensus to catch up and reconciles its
    /// tracker.
    pub async fn join(&self, addr: &Multiaddr) -> Result<()> {
        debug!("join({})", addr);

        let (pid, _) = addr.split()?;

        // Bootstrapping to ourselves is a no-op.
        if pid == self.id {
            return Ok(());
        }

        // Make the peer dialable before calling it.
        if let Err(e) = self.peer_manager.add_peer(addr) {
            warn!("recording {}: {}", addr, e);
        }

        // PeerAdd on the remote side figures out our reachable address
        // (obviously not necessarily our listen address) and returns our
        // ID as it sees us.
        let my_addr = self.listen_addr.with_peer(self.id);
        let reply = match self
            .rpc_client
            .call(&pid, CLUSTER_SERVICE, "PeerAdd", serde_json::to_value(&my_addr)?)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                error!("join: {}", e);
                return Err(e);
            }
        };
        let _my_id: PeerInfo = serde_json::from_value(reply)?;

        // Wait for a leader and for local state to catch up, then sync.
        if let Err(e) = self.consensus.wait_for_sync().await {
            error!("join: {}", e);
            return Err(e);
        }
        let _ = self.state_sync().await;

        info!("joined {}'s cluster", addr);
        Ok(())
    }

    /// Adds a new, reachable peer to this cluster.
    ///
    /// The peer is recorded locally, probed for two-way reachability,
    /// committed to the consensus log, and sent the current peer list. On
    /// consensus failure the local roster insertion is rolled back.
    ///
    /// An error while fetching the new peer's full ID at the end does not
    /// fail the operation (the peer *is* added at that point); it is
    /// reported inside the returned record's `error` field.
    pub async fn peer_add(&self, addr: &Multiaddr) -> Result<PeerInfo> {
        // Many peers attempting mutual joins at once deadlock without a
        // process-wide lock here.
        let _guard = self.peer_add_lock.lock().await;
        debug!("peer_add({})", addr);

        let (pid, supplied_transport) = match addr.split() {
            Ok(parts) => parts,
            Err(e) => {
                error!("peer_add: {}", e);
                return Err(e);
            }
        };
        let id_arg = serde_json::to_value(self.id)?;

        // Prefer an address we already know for this peer over the
        // supplied one.
        let transport = self
            .address_book
            .addrs(&pid)
            .first()
            .map(|sa| Multiaddr::from_socket_addr(*sa))
            .unwrap_or(supplied_transport);
        let remote_addr = transport.with_peer(pid);

        if let Err(e) = self.peer_manager.add_peer(&remote_addr) {
            error!("peer_add: {}", e);
            return Err(e);
        }

        // Ask the new peer how it reaches us; this proves two-way
        // reachability and yields the canonical address for the log.
        let observed = match self
            .rpc_client
            .call(&pid, CLUSTER_SERVICE, "RemoteMultiaddrForPeer", id_arg)
            .await
            .and_then(|v| Ok(serde_json::from_value::<Multiaddr>(v)?))
        {
            Ok(observed) => observed,
            Err(e) => {
                error!("peer_add: {}", e);
                self.peer_manager.rm_peer(&pid);
                return Err(e);
            }
        };

        // Log the new peer so every member gets it.
        if let Err(e) = self.consensus.log_add_peer(&remote_addr).await {
            error!("peer_add: {}", e);
            self.peer_manager.rm_peer(&pid);
            return Err(e);
        }

        // Send the current cluster peers to the new peer. Best effort.
        let mut cluster_addrs = self.peer_manager.peers_addrs();
        cluster_addrs.push(observed);
        match serde_json::to_value(&cluster_addrs) {
            Ok(addrs_arg) => {
                if let Err(e) = self
                    .rpc_client
                    .call(&pid, CLUSTER_SERVICE, "PeerManagerAddFromMultiaddrs", addrs_arg)
                    .await
                {
                    error!("sending peer list to {}: {}", pid.short(), e);
                }
            }
            Err(e) => error!("encoding peer list for {}: {}", pid.short(), e),
        }

        Ok(self.get_id_for_peer(&pid).await)
    }

    /// Removes a peer from the cluster.
    ///
    /// The removal is committed to consensus first; afterwards the removed
    /// peer is asked, best-effort, to tear itself down.
    pub async fn peer_remove(&self, pid: &PeerId) -> Result<()> {
        if !self.peer_manager.is_peer(pid) {
            return Err(ClusterError::NotAPeer(pid.to_string()));
        }

        if let Err(e) = self.consensus.log_rm_peer(pid).await {
            error!("peer_remove: {}", e);
            return Err(e);
        }

        // Best effort; the peer may already be down.
        if let Err(e) = self
            .rpc_client
            .call(pid, CLUSTER_SERVICE, "PeerManagerRmPeerShutdown", serde_json::to_value(pid)?)
            .await
        {
            error!("asking {} to shut down: {}", pid.short(), e);
        }

        Ok(())
    }

    /// How this peer would dial `pid`, as a composite address. Answers the
    /// reverse-reachability probe of `peer_add`.
    pub fn remote_multiaddr_for_peer(&self, pid: &PeerId) -> Result<Multiaddr> {
        self.address_book
            .addrs(pid)
            .first()
            .map(|sa| Multiaddr::from_socket_addr(*sa).with_peer(*pid))
            .ok_or_else(|| ClusterError::Rpc(format!("no known address for peer {}", pid)))
    }

    async fn get_id_for_peer(&self, pid: &PeerId) -> PeerInfo {
        match self
            .rpc_client
            .call(pid, CLUSTER_SERVICE, "ID", Value::Null)
            .await
            .and_then(|v| Ok(serde_json::from_value::<PeerInfo>(v)?))
        {
            Ok(info) => info,
            Err(e) => {
                error!("fetching ID of {}: {}", pid.short(), e);
                PeerInfo::from_error(*pid, e.to_string())
            }
        }
    }

    fn rm_peer_shutdown(self: Arc<Self>, pid: PeerId) {
        self.peer_manager.rm_peer(&pid);
        if pid == self.id {
            info!("this peer was removed from the cluster; shutting down");
            self.shutdown_in_background();
        }
    }

    // ------------------------------------------------------------------
    // State reconciliation
    // ------------------------------------------------------------------

    /// Makes the tracker's key set converge on the consensus pin set.
    ///
    /// Untracked CIDs from the consensus set are scheduled for tracking;
    /// tracked CIDs absent from it are scheduled for untracking. The
    /// scheduling is fire-and-forget so a slow daemon cannot stall the
    /// reconciler; returns the current record of every CID that changed.
    pub async fn state_sync(&self) -> Result<Vec<PinInfo>> {
        let state = self.consensus.state().await?;

        debug!("syncing state to tracker");
        let mut changed: Vec<Cid> = Vec::new();

        for cid in state.list_pins() {
            if self.tracker.status(&cid).await.status == TrackerStatus::Unpinned {
                changed.push(cid.clone());
                let tracker = self.tracker.clone();
                tokio::spawn(async move {
                    if let Err(e) = tracker.track(&cid).await {
                        warn!("tracking {}: {}", cid, e);
                    }
                });
            }
        }

        for info in self.tracker.status_all().await {
            if !state.has_pin(&info.cid) {
                changed.push(info.cid.clone());
                let tracker = self.tracker.clone();
                let cid = info.cid;
                tokio::spawn(async move {
                    if let Err(e) = tracker.untrack(&cid).await {
                        warn!("untracking {}: {}", cid, e);
                    }
                });
            }
        }

        let mut infos = Vec::with_capacity(changed.len());
        for cid in &changed {
            infos.push(self.tracker.status(cid).await);
        }
        Ok(infos)
    }

    // ------------------------------------------------------------------
    // Façade operations
    // ------------------------------------------------------------------

    /// Commits `cid` to the shared pin set.
    ///
    /// Success means the pin is durably committed, not that any daemon has
    /// pinned the content yet; the reconcilers pick it up from there.
    pub async fn pin(&self, cid: &Cid) -> Result<()> {
        info!("pinning: {}", cid);
        self.consensus.log_pin(cid).await
    }

    /// Removes `cid` from the shared pin set. Same commit semantics as
    /// [`Cluster::pin`].
    pub async fn unpin(&self, cid: &Cid) -> Result<()> {
        info!("unpinning: {}", cid);
        self.consensus.log_unpin(cid).await
    }

    /// The shared pin set as of the latest committed snapshot. Empty when
    /// the consensus read fails.
    pub async fn pins(&self) -> Vec<Cid> {
        match self.consensus.state().await {
            Ok(state) => state.list_pins(),
            Err(e) => {
                error!("reading consensus state: {}", e);
                Vec::new()
            }
        }
    }

    /// Cluster-wide status of one CID.
    pub async fn status(&self, cid: &Cid) -> Result<GlobalPinInfo> {
        self.global_pin_info_cid("TrackerStatus", cid).await
    }

    /// Cluster-wide status of every tracked CID.
    pub async fn status_all(&self) -> Result<Vec<GlobalPinInfo>> {
        self.global_pin_info_slice("TrackerStatusAll").await
    }

    /// Verifies one CID against the local daemon. Daemon trouble shows up
    /// inside the returned record, not as `Err`.
    pub async fn sync_local(&self, cid: &Cid) -> Result<PinInfo> {
        let info = self.tracker.sync(cid).await?;
        if let Some(err) = &info.error {
            error!("tracker sync of {}: {} (is the block-store daemon running?)", cid, err);
        }
        Ok(info)
    }

    /// Verifies every tracked CID against the local daemon.
    pub async fn sync_all_local(&self) -> Result<Vec<PinInfo>> {
        let infos = self.tracker.sync_all().await?;
        for info in &infos {
            if let Some(err) = &info.error {
                error!("tracker sync of {}: {}", info.cid, err);
            }
        }
        Ok(infos)
    }

    /// Triggers a local sync of one CID on every cluster peer.
    pub async fn sync(&self, cid: &Cid) -> Result<GlobalPinInfo> {
        self.global_pin_info_cid("SyncLocal", cid).await
    }

    /// Triggers a full local sync on every cluster peer.
    pub async fn sync_all(&self) -> Result<Vec<GlobalPinInfo>> {
        self.global_pin_info_slice("SyncAllLocal").await
    }

    /// Retries a failed pin/unpin locally.
    pub async fn recover_local(&self, cid: &Cid) -> Result<PinInfo> {
        self.tracker.recover(cid).await
    }

    /// Retries a failed pin/unpin on every cluster peer.
    pub async fn recover(&self, cid: &Cid) -> Result<GlobalPinInfo> {
        self.global_pin_info_cid("TrackerRecover", cid).await
    }

    /// This peer's self-description.
    pub async fn id_info(&self) -> PeerInfo {
        // Connector trouble rides inside the store record.
        let store = match self.connector.id().await {
            Ok(store_id) => Some(store_id),
            Err(e) => Some(StoreId {
                id: String::new(),
                addresses: Vec::new(),
                error: Some(e.to_string()),
            }),
        };

        PeerInfo {
            id: self.id,
            public_key: self.config.public_key_b64().ok(),
            addresses: vec![self.listen_addr.with_peer(self.id)],
            cluster_peers: self.peer_manager.peers_addrs(),
            version: VERSION.to_string(),
            rpc_protocol_version: RPC_PROTOCOL.to_string(),
            store,
            error: None,
        }
    }

    /// ID records of every current member. Unreachable members get a
    /// synthesized record carrying the error text.
    pub async fn peers(&self) -> Vec<PeerInfo> {
        let members = self.members();
        let replies = self.multi_rpc(&members, CLUSTER_SERVICE, "ID", Value::Null).await;

        members
            .iter()
            .zip(replies)
            .map(|(pid, reply)| {
                match reply.and_then(|v| Ok(serde_json::from_value::<PeerInfo>(v)?)) {
                    Ok(info) => info,
                    Err(e) => {
                        error!("ID broadcast to {}: {}", pid.short(), e);
                        PeerInfo::from_error(*pid, e.to_string())
                    }
                }
            })
            .collect()
    }

    async fn handle_rpc(self: Arc<Self>, method: &str, args: Value) -> Result<Value> {
        match method {
            "ID" => Ok(serde_json::to_value(self.id_info().await)?),
            "Pin" => {
                let cid: Cid = serde_json::from_value(args)?;
                self.pin(&cid).await?;
                Ok(Value::Null)
            }
            "Unpin" => {
                let cid: Cid = serde_json::from_value(args)?;
                self.unpin(&cid).await?;
                Ok(Value::Null)
            }
            "Pins" => Ok(serde_json::to_value(self.pins().await)?),
            "PeerAdd" => {
                let addr: Multiaddr = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.peer_add(&addr).await?)?)
            }
            "PeerRemove" => {
                let pid: PeerId = serde_json::from_value(args)?;
                self.peer_remove(&pid).await?;
                Ok(Value::Null)
            }
            "Join" => {
                let addr: Multiaddr = serde_json::from_value(args)?;
                self.join(&addr).await?;
                Ok(Value::Null)
            }
            "StatusAll" => Ok(serde_json::to_value(self.status_all().await?)?),
            "Status" => {
                let cid: Cid = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.status(&cid).await?)?)
            }
            "SyncAllLocal" => Ok(serde_json::to_value(self.sync_all_local().await?)?),
            "SyncLocal" => {
                let cid: Cid = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.sync_local(&cid).await?)?)
            }
            "SyncAll" => Ok(serde_json::to_value(self.sync_all().await?)?),
            "Sync" => {
                let cid: Cid = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.sync(&cid).await?)?)
            }
            "RecoverLocal" => {
                let cid: Cid = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.recover_local(&cid).await?)?)
            }
            "Recover" => {
                let cid: Cid = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.recover(&cid).await?)?)
            }
            "StateSync" => Ok(serde_json::to_value(self.state_sync().await?)?),
            "TrackerStatusAll" => Ok(serde_json::to_value(self.tracker.status_all().await)?),
            "TrackerStatus" => {
                let cid: Cid = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.tracker.status(&cid).await)?)
            }
            "TrackerRecover" => {
                let cid: Cid = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.tracker.recover(&cid).await?)?)
            }
            "RemoteMultiaddrForPeer" => {
                let pid: PeerId = serde_json::from_value(args)?;
                Ok(serde_json::to_value(self.remote_multiaddr_for_peer(&pid)?)?)
            }
            "PeerManagerAddFromMultiaddrs" => {
                let addrs: Vec<Multiaddr> = serde_json::from_value(args)?;
                self.peer_manager.add_from_multiaddrs(&addrs);
                Ok(Value::Null)
            }
            "PeerManagerRmPeerShutdown" => {
                let pid: PeerId = serde_json::from_value(args)?;
                self.rm_peer_shutdown(pid);
                Ok(Value::Null)
            }
            _ => Err(ClusterError::Rpc(format!("unknown method 'Cluster.{}'", method))),
        }
    }
}

/// The `"Cluster"` RPC service: a thin dispatcher into the orchestrator.
///
/// Holds a weak reference so the registry does not keep a shut-down
/// cluster alive.
struct ClusterRpc {
    cluster: Weak<Cluster>,
}

#[async_trait]
impl RpcService for ClusterRpc {
    async fn handle(&self, method: &str, args: Value) -> Result<Value> {
        let cluster = self
            .cluster
            .upgrade()
            .ok_or_else(|| ClusterError::Lifecycle("cluster is shutting down".to_string()))?;
        cluster.handle_rpc(method, args).await
    }
}
