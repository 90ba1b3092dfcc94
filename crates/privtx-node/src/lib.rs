//! privtx-node - In-memory stub privacy manager node.
//!
//! Serves the node HTTP API (JSON and raw endpoints) on a Unix socket and/or
//! TCP, and the binary RPC API on a Unix socket, all over one shared
//! in-memory store. Used by the integration tests and for local development
//! against a real client.

pub mod handler;
pub mod server;

pub use server::{router, start_tcp, start_unix, HttpServerHandle, SelfAddressed};

use privtx::{
    memory_backend, Identity, MemoryStoreKind, PayloadBackend, RpcServer, RpcServerHandle,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Which listeners to open and what to serve behind them.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    /// HTTP over a Unix socket.
    pub socket: Option<PathBuf>,
    /// HTTP over TCP, as `host:port`.
    pub listen: Option<String>,
    /// Binary RPC over a Unix socket.
    pub rpc_socket: Option<PathBuf>,
    pub store: MemoryStoreKind,
    /// The node's own key; recipient-less sends are delivered to it.
    pub identity: Option<Identity>,
}

/// A running stub node. Dropping it stops every listener.
pub struct StubNode {
    backend: Arc<dyn PayloadBackend>,
    tcp_addr: Option<SocketAddr>,
    http_unix: Option<HttpServerHandle>,
    http_tcp: Option<HttpServerHandle>,
    rpc: Option<RpcServerHandle>,
}

impl StubNode {
    pub async fn start(options: NodeOptions) -> anyhow::Result<Self> {
        if options.socket.is_none() && options.listen.is_none() && options.rpc_socket.is_none() {
            anyhow::bail!("no listener configured: pass --socket, --listen or --rpc-socket");
        }

        let store = memory_backend(options.store);
        let backend: Arc<dyn PayloadBackend> = match &options.identity {
            Some(identity) if !identity.is_empty() => {
                Arc::new(SelfAddressed::new(store, identity.clone()))
            }
            _ => store,
        };
        Self::start_with_backend(backend, &options).await
    }

    /// Serve an arbitrary backend on the listeners in `options`.
    pub async fn start_with_backend(
        backend: Arc<dyn PayloadBackend>,
        options: &NodeOptions,
    ) -> anyhow::Result<Self> {
        let http_unix = match &options.socket {
            Some(path) => Some(start_unix(backend.clone(), path).await?),
            None => None,
        };
        let (tcp_addr, http_tcp) = match &options.listen {
            Some(addr) => {
                let (addr, handle) = start_tcp(backend.clone(), addr).await?;
                (Some(addr), Some(handle))
            }
            None => (None, None),
        };
        let rpc = match &options.rpc_socket {
            Some(path) => Some(RpcServer::start(path, backend.clone()).await?),
            None => None,
        };

        Ok(Self {
            backend,
            tcp_addr,
            http_unix,
            http_tcp,
            rpc,
        })
    }

    pub fn backend(&self) -> &Arc<dyn PayloadBackend> {
        &self.backend
    }

    /// Bound TCP address, when listening on TCP.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Base URL of the TCP listener.
    pub fn url(&self) -> Option<String> {
        self.tcp_addr.map(|addr| format!("http://{}/", addr))
    }

    pub fn http_socket(&self) -> Option<&std::path::Path> {
        self.http_unix.as_ref().and_then(HttpServerHandle::socket_path)
    }

    pub fn rpc_socket(&self) -> Option<&std::path::Path> {
        self.rpc.as_ref().map(RpcServerHandle::socket_path)
    }

    /// Stop every listener.
    pub fn shutdown(self) {
        drop(self.http_tcp);
        drop(self.http_unix);
        drop(self.rpc);
    }
}
