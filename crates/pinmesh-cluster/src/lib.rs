//! Pinmesh Cluster Orchestrator
//!
//! This crate provides the orchestrator of a replicated pin-management
//! cluster. Each peer agrees with the others, through a replicated log, on
//! a shared set of content identifiers (CIDs) the cluster promises to keep
//! available, and independently drives its local block-store daemon to
//! realize that set.
//!
//! # Architecture
//!
//! The [`Cluster`] composes a peer out of pluggable collaborators and a few
//! owned components:
//!
//! 1. **Peer Manager**: the membership roster and address book
//! 2. **RPC Surface**: the `"Cluster"` service every peer exposes to the
//!    others (and to itself; local calls short-circuit in process)
//! 3. **Broadcast Engine**: parallel fan-out of one call to every member,
//!    with per-destination error capture
//! 4. **Membership Protocol**: join, peer-add, peer-remove, bootstrap and
//!    leave-on-shutdown
//! 5. **State Reconciler**: periodic diff of the consensus pin set against
//!    the local tracker
//! 6. **Lifecycle Controller**: startup ordering, the ready signal, and
//!    idempotent graceful shutdown
//!
//! The consensus engine, pin tracker, block-store connector and external
//! API are consumed through the traits in [`components`]; pinmesh does not
//! implement them.
//!
//! # Key Design Decisions
//!
//! ## Shared registry for client and server
//!
//! The RPC client shares the server's service registry, so calls addressed
//! to the local peer dispatch in process instead of dialling the network.
//! Broadcast fan-out therefore treats the local peer like any other member.
//!
//! ## Fire-and-forget reconciliation
//!
//! The reconciler schedules `track`/`untrack` work without joining it, so a
//! slow daemon can never stall the reconciliation loop. Trackers must
//! tolerate redundant requests for the same CID.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pinmesh_cluster::{Cluster, ClusterConfig};
//! # use pinmesh_cluster::components::{ClusterApi, Consensus, PinTracker, StoreConnector};
//! # async fn demo(
//! #     api: Arc<dyn ClusterApi>,
//! #     connector: Arc<dyn StoreConnector>,
//! #     tracker: Arc<dyn PinTracker>,
//! #     consensus: Arc<dyn Consensus>,
//! # ) -> pinmesh_common::Result<()> {
//! let config = ClusterConfig::generate(
//!     "/ip4/127.0.0.1/tcp/9096".parse()?,
//!     std::path::Path::new("/var/lib/pinmesh"),
//! );
//!
//! let cluster = Cluster::new(config, api, connector, tracker, move |_cfg, _peers| {
//!     Ok(consensus)
//! })
//! .await?;
//!
//! cluster.wait_for_ready().await;
//! cluster.pin(&"QmFoo".parse()?).await?;
//! cluster.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod cluster;
pub mod components;
pub mod config;
pub mod peer_manager;
pub mod rpc;

pub use cluster::Cluster;
pub use components::{ClusterApi, Consensus, PinSet, PinTracker, StoreConnector};
pub use config::ClusterConfig;
pub use peer_manager::PeerManager;
pub use rpc::{AddressBook, RpcClient, RpcServer, RpcService, ServiceRegistry, CLUSTER_SERVICE, RPC_PROTOCOL};
