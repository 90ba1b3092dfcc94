//! Binary RPC server.
//!
//! Listens on a Unix socket and answers RPC frames from any
//! [`PayloadBackend`]. The stub node and the RPC tests run it in front of an
//! in-memory store.
//!
//! # Thread Safety
//!
//! Each connection is handled in its own spawned task. The backend is shared
//! via `Arc` and synchronizes internally.

use super::protocol::{decode, encode, read_frame, write_frame, RpcRequest, RpcResponse};
use crate::backend::PayloadBackend;
use crate::types::{Identity, PayloadKey};
use crate::{PtmError, Result};
use serde_bytes::ByteBuf;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Maximum concurrent RPC connections.
pub const MAX_RPC_CONNECTIONS: usize = 64;

/// Handle to a running RPC server. Dropping shuts it down and removes the
/// socket file.
pub struct RpcServerHandle {
    socket_path: PathBuf,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl RpcServerHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting connections and close active ones.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// RPC server that listens for client connections.
pub struct RpcServer;

impl RpcServer {
    /// Bind `socket_path` and serve `backend` in background tasks.
    ///
    /// A stale socket file at the path is replaced.
    pub async fn start(
        socket_path: impl AsRef<Path>,
        backend: Arc<dyn PayloadBackend>,
    ) -> Result<RpcServerHandle> {
        let socket_path = socket_path.as_ref().to_path_buf();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .map_err(|e| PtmError::io_with_path(e, &socket_path))?;
        }
        let listener =
            UnixListener::bind(&socket_path).map_err(|e| PtmError::io_with_path(e, &socket_path))?;

        info!("RPC server listening on {}", socket_path.display());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            backend,
            shutdown_rx,
            conn_shutdown_rx,
            Arc::new(AtomicUsize::new(0)),
        ));

        Ok(RpcServerHandle {
            socket_path,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: UnixListener,
        backend: Arc<dyn PayloadBackend>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("RPC server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= MAX_RPC_CONNECTIONS {
                                warn!(
                                    "Rejecting RPC connection: at max capacity ({})",
                                    MAX_RPC_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let backend = backend.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                let served = Self::handle_connection(
                                    stream,
                                    backend.as_ref(),
                                    &mut conn_shutdown,
                                )
                                .await;
                                if let Err(e) = served {
                                    debug!("RPC connection ended: {}", e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("RPC accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: UnixStream,
        backend: &dyn PayloadBackend,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()),
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(());
                }
            };

            let response = Self::process_request(&frame, backend).await;
            write_frame(&mut writer, &encode(&response)?).await?;
        }
    }

    async fn process_request(frame: &[u8], backend: &dyn PayloadBackend) -> RpcResponse {
        let request: RpcRequest = match decode(frame) {
            Ok(req) => req,
            Err(e) => {
                return RpcResponse::Error {
                    code: PtmError::RPC_INVALID_REQUEST,
                    message: format!("Parse error: {}", e),
                };
            }
        };
        debug!("RPC {} via {}", request.method(), backend.name());

        match request {
            RpcRequest::UpCheck => match backend.up_check().await {
                Ok(()) => RpcResponse::Up,
                Err(e) => RpcResponse::error(&e),
            },
            RpcRequest::Send { payload, from, to } => {
                let from = (!from.is_empty()).then(|| Identity::new(from.into_vec()));
                let to: Vec<Identity> = to
                    .into_iter()
                    .map(|id| Identity::new(id.into_vec()))
                    .collect();
                match backend.send(&payload, from.as_ref(), &to).await {
                    Ok(key) => RpcResponse::Sent {
                        key: ByteBuf::from(key.into_bytes()),
                    },
                    Err(e) => RpcResponse::error(&e),
                }
            }
            RpcRequest::Receive { key, .. } => {
                match backend.receive(&PayloadKey::new(key.into_vec())).await {
                    Ok(Some(payload)) => RpcResponse::Received {
                        payload: ByteBuf::from(payload.to_vec()),
                    },
                    Ok(None) => RpcResponse::NotFound,
                    Err(e) => RpcResponse::error(&e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ContentAddressedStore;

    async fn roundtrip(stream: &mut UnixStream, request: &RpcRequest) -> RpcResponse {
        let (mut reader, mut writer) = stream.split();
        write_frame(&mut writer, &encode(request).unwrap()).await.unwrap();
        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        decode(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_server_serves_several_requests_per_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.rpc");
        let mut handle = RpcServer::start(&path, Arc::new(ContentAddressedStore::new()))
            .await
            .unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        assert_eq!(roundtrip(&mut stream, &RpcRequest::UpCheck).await, RpcResponse::Up);

        let sent = roundtrip(
            &mut stream,
            &RpcRequest::Send {
                payload: ByteBuf::from(b"abc".to_vec()),
                from: ByteBuf::new(),
                to: vec![],
            },
        )
        .await;
        let key = match sent {
            RpcResponse::Sent { key } => key,
            other => panic!("Expected Sent, got: {:?}", other),
        };

        let received = roundtrip(
            &mut stream,
            &RpcRequest::Receive {
                key,
                to: ByteBuf::new(),
            },
        )
        .await;
        assert_eq!(
            received,
            RpcResponse::Received {
                payload: ByteBuf::from(b"abc".to_vec())
            }
        );

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_unknown_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.rpc");
        let _handle = RpcServer::start(&path, Arc::new(ContentAddressedStore::new()))
            .await
            .unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let response = roundtrip(
            &mut stream,
            &RpcRequest::Receive {
                key: ByteBuf::from(vec![7u8; 32]),
                to: ByteBuf::new(),
            },
        )
        .await;
        assert_eq!(response, RpcResponse::NotFound);
    }

    #[tokio::test]
    async fn test_server_garbage_frame_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.rpc");
        let _handle = RpcServer::start(&path, Arc::new(ContentAddressedStore::new()))
            .await
            .unwrap();

        let mut stream = UnixStream::connect(&path).await.unwrap();
        let (mut reader, mut writer) = stream.split();
        write_frame(&mut writer, &[0xff, 0xff, 0xff]).await.unwrap();
        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        match decode::<RpcResponse>(&bytes).unwrap() {
            RpcResponse::Error { code, .. } => assert_eq!(code, PtmError::RPC_INVALID_REQUEST),
            other => panic!("Expected Error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.rpc");
        let handle = RpcServer::start(&path, Arc::new(ContentAddressedStore::new()))
            .await
            .unwrap();
        assert!(path.exists());
        drop(handle);
        assert!(!path.exists());
    }
}
