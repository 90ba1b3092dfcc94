//! The payload client facade.
//!
//! A [`PayloadClient`] picks exactly one backend from a [`ResolvedConfig`]
//! when it is built and keeps it for its whole life.

use crate::backend::PayloadBackend;
use crate::config::{BackendKind, ResolvedConfig};
use crate::ipc::RpcBackend;
use crate::memory::memory_backend;
use crate::network::{TcpHttpBackend, UnixHttpBackend};
use crate::types::{Identity, PayloadKey};
use crate::{PtmError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// Send / receive / up-check against the configured node.
#[derive(Clone)]
pub struct PayloadClient {
    backend: Arc<dyn PayloadBackend>,
}

impl std::fmt::Debug for PayloadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadClient")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl PayloadClient {
    /// Build the client without probing the node.
    pub fn new(config: &ResolvedConfig) -> Result<Self> {
        Ok(Self::with_backend(select_backend(config)?))
    }

    /// Build the client and require a successful up-check.
    ///
    /// A node that is not listening is a construction error.
    pub async fn connect(config: &ResolvedConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.up_check().await?;
        info!("Connected to node via {}", client.backend_name());
        Ok(client)
    }

    /// Wrap an already-built backend.
    pub fn with_backend(backend: Arc<dyn PayloadBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// See [`PayloadBackend::stable_keys`].
    pub fn stable_keys(&self) -> bool {
        self.backend.stable_keys()
    }

    pub async fn up_check(&self) -> Result<()> {
        self.backend.up_check().await
    }

    pub async fn send(
        &self,
        payload: &[u8],
        from: Option<&Identity>,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        debug!(
            "send {} bytes to {} recipients via {}",
            payload.len(),
            to.len(),
            self.backend.name()
        );
        self.backend.send(payload, from, to).await
    }

    pub async fn receive(&self, key: &PayloadKey) -> Result<Option<Bytes>> {
        debug!("receive {} via {}", key, self.backend.name());
        self.backend.receive(key).await
    }
}

/// Choose the one backend the configuration names.
fn select_backend(config: &ResolvedConfig) -> Result<Arc<dyn PayloadBackend>> {
    let identity = config.identity.clone();
    match config.backend {
        BackendKind::Memory => Ok(memory_backend(config.memory_store)),
        BackendKind::Rpc => {
            let socket = config.socket_path().ok_or_else(|| PtmError::Config {
                message: "rpc transport requires a socket path".to_string(),
            })?;
            Ok(Arc::new(RpcBackend::new(socket, identity, config.timeouts)))
        }
        BackendKind::Http => {
            if let Some(socket) = config.socket_path() {
                return Ok(Arc::new(UnixHttpBackend::unix(
                    socket,
                    identity,
                    config.api_mode,
                    config.timeouts,
                )));
            }
            if let Some(url) = config.base_url()? {
                return Ok(Arc::new(TcpHttpBackend::tcp(
                    &url,
                    identity,
                    config.api_mode,
                    config.timeouts,
                )?));
            }
            Err(PtmError::Config {
                message: "neither a socket nor a url is configured".to_string(),
            })
        }
    }
}
