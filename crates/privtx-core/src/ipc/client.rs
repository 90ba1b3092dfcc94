//! Binary RPC backend.
//!
//! Opens a fresh Unix socket connection for every call, writes one request
//! frame and reads one response frame. A failed dial fails only that call.

use super::protocol::{decode, encode, read_frame, write_frame, RpcRequest, RpcResponse};
use crate::backend::{sender_or, PayloadBackend};
use crate::config::TransportTimeouts;
use crate::types::{Identity, PayloadKey};
use crate::{PtmError, Result};
use bytes::Bytes;
use serde_bytes::ByteBuf;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

/// RPC client for a node listening on a Unix socket.
#[derive(Debug, Clone)]
pub struct RpcBackend {
    socket_path: PathBuf,
    identity: Identity,
    timeouts: TransportTimeouts,
}

impl RpcBackend {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        identity: Identity,
        timeouts: TransportTimeouts,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            identity,
            timeouts,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn endpoint(&self) -> String {
        format!("rpc:{}", self.socket_path.display())
    }

    fn broken(&self, err: impl std::fmt::Display) -> PtmError {
        PtmError::Unreachable {
            endpoint: self.endpoint(),
            message: err.to_string(),
        }
    }

    /// Make one call on a fresh connection.
    pub async fn call(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let method = request.method();
        debug!("RPC {} via {}", method, self.endpoint());

        let mut stream = timeout(self.timeouts.dial, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| PtmError::Timeout {
                operation: format!("dial {}", self.endpoint()),
                after: self.timeouts.dial,
            })?
            .map_err(|e| self.broken(e))?;

        let request_bytes = encode(request)?;

        let exchange = async {
            let (mut reader, mut writer) = stream.split();
            write_frame(&mut writer, &request_bytes)
                .await
                .map_err(|e| self.broken(e))?;

            let response_bytes = read_frame(&mut reader)
                .await
                .map_err(|e| match e {
                    PtmError::InvalidFrame { .. } => e,
                    other => self.broken(other),
                })?
                .ok_or_else(|| self.broken("connection closed before a response"))?;

            decode::<RpcResponse>(&response_bytes)
        };

        timeout(self.timeouts.request, exchange)
            .await
            .map_err(|_| PtmError::Timeout {
                operation: format!("{} via {}", method, self.endpoint()),
                after: self.timeouts.request,
            })?
    }

    fn rejected(method: &str, code: i32, message: String) -> PtmError {
        PtmError::Rejected {
            operation: method.to_string(),
            status: Some(code),
            message,
        }
    }

    fn unexpected(method: &str, response: &RpcResponse) -> PtmError {
        PtmError::Encoding {
            message: format!("unexpected response to {}: {:?}", method, response),
        }
    }
}

#[async_trait::async_trait]
impl PayloadBackend for RpcBackend {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn up_check(&self) -> Result<()> {
        match self.call(&RpcRequest::UpCheck).await? {
            RpcResponse::Up => Ok(()),
            RpcResponse::Error { code, message } => Err(Self::rejected("upcheck", code, message)),
            other => Err(Self::unexpected("upcheck", &other)),
        }
    }

    async fn send(
        &self,
        payload: &[u8],
        from: Option<&Identity>,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        let from = sender_or(from, &self.identity);
        let request = RpcRequest::Send {
            payload: ByteBuf::from(payload.to_vec()),
            from: ByteBuf::from(from.as_bytes().to_vec()),
            to: to
                .iter()
                .map(|id| ByteBuf::from(id.as_bytes().to_vec()))
                .collect(),
        };

        match self.call(&request).await? {
            RpcResponse::Sent { key } => Ok(PayloadKey::new(key.into_vec())),
            RpcResponse::Error { code, message } => Err(Self::rejected("send", code, message)),
            other => Err(Self::unexpected("send", &other)),
        }
    }

    async fn receive(&self, key: &PayloadKey) -> Result<Option<Bytes>> {
        let request = RpcRequest::Receive {
            key: ByteBuf::from(key.as_bytes().to_vec()),
            to: ByteBuf::from(self.identity.as_bytes().to_vec()),
        };

        match self.call(&request).await? {
            RpcResponse::Received { payload } => Ok(Some(Bytes::from(payload.into_vec()))),
            RpcResponse::NotFound => Ok(None),
            RpcResponse::Error { code, message } => Err(Self::rejected("receive", code, message)),
            other => Err(Self::unexpected("receive", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::server::RpcServer;
    use crate::memory::{content_key, ContentAddressedStore};
    use std::sync::Arc;

    fn local() -> Identity {
        Identity::new(b"local".to_vec())
    }

    #[tokio::test]
    async fn test_rpc_send_receive_against_memory_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.rpc");
        let mut handle = RpcServer::start(&path, Arc::new(ContentAddressedStore::new()))
            .await
            .unwrap();

        let backend = RpcBackend::new(&path, local(), TransportTimeouts::default());
        backend.up_check().await.unwrap();

        let payload = [0u8, 159, 146, 150, 255];
        let key = backend
            .send(&payload, None, &[Identity::new(b"bob".to_vec())])
            .await
            .unwrap();
        assert_eq!(key, content_key(&payload));

        let fetched = backend.receive(&key).await.unwrap();
        assert_eq!(fetched.as_deref(), Some(payload.as_slice()));

        let missing = backend.receive(&content_key(b"other")).await.unwrap();
        assert!(missing.is_none());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_rpc_dial_failure_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = RpcBackend::new(
            dir.path().join("missing.rpc"),
            local(),
            TransportTimeouts::default(),
        );

        let err = backend.up_check().await.unwrap_err();
        assert!(matches!(err, PtmError::Unreachable { .. }), "got {err:?}");

        let err = backend.send(b"x", None, &[]).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_rpc_error_response_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failing.rpc");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await.unwrap();
            let response = RpcResponse::Error {
                code: -32000,
                message: "store offline".to_string(),
            };
            write_frame(&mut stream, &encode(&response).unwrap())
                .await
                .unwrap();
        });

        let backend = RpcBackend::new(&path, local(), TransportTimeouts::default());
        let err = backend.up_check().await.unwrap_err();
        match err {
            PtmError::Rejected { status, message, .. } => {
                assert_eq!(status, Some(-32000));
                assert_eq!(message, "store offline");
            }
            other => panic!("Expected Rejected, got: {:?}", other),
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_rpc_closed_without_response_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hangup.rpc");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_frame(&mut stream).await.unwrap();
            // Drop without answering.
        });

        let backend = RpcBackend::new(&path, local(), TransportTimeouts::default());
        let err = backend.receive(&PayloadKey::new(vec![1])).await.unwrap_err();
        assert!(err.is_connectivity());

        server.await.unwrap();
    }
}
