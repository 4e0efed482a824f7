//! The RPC surface.
//!
//! Every peer exposes a set of named services (in practice one, `"Cluster"`)
//! over the pinmesh wire protocol. The [`RpcServer`] accepts connections
//! and dispatches `"Service.Method"` requests through a [`ServiceRegistry`];
//! the [`RpcClient`] shares that registry, so a call addressed to the local
//! peer never touches the network.
//!
//! The [`AddressBook`] is the transport-side record of where each peer can
//! be dialled. It is fed from three directions: the peer manager (roster
//! seeding and membership changes), explicit inserts during join, and the
//! `from` field of incoming requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use pinmesh_common::transport::{TcpServer, TcpTransport};
use pinmesh_common::{ClusterError, Multiaddr, PeerId, Request, Response, Result};

/// Name of the service the orchestrator registers.
pub const CLUSTER_SERVICE: &str = "Cluster";

/// Wire protocol identifier, part of every peer's ID record.
pub const RPC_PROTOCOL: &str = concat!("/pinmesh/", env!("CARGO_PKG_VERSION"), "/rpc");

/// A named RPC service: the receiving end of `"Service.Method"` calls.
#[async_trait]
pub trait RpcService: Send + Sync {
    async fn handle(&self, method: &str, args: serde_json::Value) -> Result<serde_json::Value>;
}

/// Shared map of service name to handler.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<String, Arc<dyn RpcService>>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, service: Arc<dyn RpcService>) {
        self.services.write().unwrap().insert(name.to_string(), service);
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn RpcService>> {
        self.services.read().unwrap().get(name).cloned()
    }
}

/// Where each known peer can be dialled.
///
/// Entries live for the whole process, so a peer stays dialable through a
/// membership removal (the shutdown push still has to reach it).
#[derive(Clone, Default)]
pub struct AddressBook {
    addrs: Arc<RwLock<HashMap<PeerId, Vec<SocketAddr>>>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an address for a peer. Duplicates are ignored.
    pub fn add(&self, pid: PeerId, addr: SocketAddr) {
        let mut addrs = self.addrs.write().unwrap();
        let entry = addrs.entry(pid).or_default();
        if !entry.contains(&addr) {
            entry.push(addr);
        }
    }

    pub fn addrs(&self, pid: &PeerId) -> Vec<SocketAddr> {
        self.addrs.read().unwrap().get(pid).cloned().unwrap_or_default()
    }

    pub fn remove(&self, pid: &PeerId) {
        self.addrs.write().unwrap().remove(pid);
    }
}

/// The accepting side of the RPC surface.
pub struct RpcServer {
    server: TcpServer,
    local_addr: SocketAddr,
    registry: ServiceRegistry,
    address_book: AddressBook,
}

impl RpcServer {
    /// Binds the listener named by `addr` (the port may be 0).
    pub async fn bind(addr: &Multiaddr, registry: ServiceRegistry, address_book: AddressBook) -> Result<Self> {
        let server = TcpServer::bind(addr.socket_addr()).await?;
        let local_addr = server.local_addr()?;
        Ok(RpcServer {
            server,
            local_addr,
            registry,
            address_book,
        })
    }

    /// The actually-bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts the accept loop. Abort the returned handle to stop serving.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let registry = self.registry;
        let address_book = self.address_book;
        let server = self.server;

        tokio::spawn(async move {
            let result = server
                .run_with_handler(move |request: Request| {
                    let registry = registry.clone();
                    let address_book = address_book.clone();
                    async move { Ok(dispatch(&registry, &address_book, request).await) }
                })
                .await;
            if let Err(e) = result {
                warn!("rpc server stopped: {}", e);
            }
        })
    }
}

/// Routes one request to its service and always produces a response.
async fn dispatch(registry: &ServiceRegistry, address_book: &AddressBook, request: Request) -> Response {
    // Learn how to dial the sender back before doing anything else.
    if let Some(from) = &request.from {
        match from.split() {
            Ok((pid, transport)) => address_book.add(pid, transport.socket_addr()),
            Err(e) => debug!("ignoring bad sender address {}: {}", from, e),
        }
    }

    let (service_name, method) = match request.method.split_once('.') {
        Some(parts) => parts,
        None => {
            return Response::error(request.id, format!("malformed method name '{}'", request.method));
        }
    };

    let service = match registry.lookup(service_name) {
        Some(service) => service,
        None => {
            return Response::error(request.id, format!("unknown service '{}'", service_name));
        }
    };

    match service.handle(method, request.args).await {
        Ok(result) => Response::success(request.id, result),
        Err(e) => Response::error(request.id, e.to_string()),
    }
}

/// The calling side of the RPC surface.
///
/// Cheap to clone; every collaborator gets one at startup. Calls addressed
/// to the local peer dispatch through the shared registry in process.
#[derive(Clone)]
pub struct RpcClient {
    local: PeerId,
    from_addr: Multiaddr,
    registry: ServiceRegistry,
    address_book: AddressBook,
}

impl RpcClient {
    pub fn new(local: PeerId, from_addr: Multiaddr, registry: ServiceRegistry, address_book: AddressBook) -> Self {
        RpcClient {
            local,
            from_addr,
            registry,
            address_book,
        }
    }

    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    /// Calls `service`.`method` on `dest` and returns the raw JSON reply.
    pub async fn call(
        &self,
        dest: &PeerId,
        service: &str,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        if *dest == self.local {
            let handler = self
                .registry
                .lookup(service)
                .ok_or_else(|| ClusterError::Rpc(format!("unknown service '{}'", service)))?;
            return handler.handle(method, args).await;
        }

        let addrs = self.address_book.addrs(dest);
        if addrs.is_empty() {
            return Err(ClusterError::Rpc(format!("no known address for peer {}", dest)));
        }

        let request = Request::new(format!("{}.{}", service, method), args).with_from(self.from_addr.clone());

        let mut last_err = None;
        for addr in addrs {
            match TcpTransport::call(addr, &request).await {
                Ok(response) => {
                    if response.success {
                        return Ok(response.result.unwrap_or(serde_json::Value::Null));
                    }
                    return Err(ClusterError::Rpc(
                        response.error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                Err(e) => {
                    debug!("call to {} at {} failed: {}", dest.short(), addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ClusterError::Rpc("no addresses tried".to_string())))
    }
}
