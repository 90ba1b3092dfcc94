//! HTTP server implementation using Axum.
//!
//! The same router is served on TCP through `axum::serve` and on a Unix
//! socket through a hyper accept loop.

use crate::handler::{
    handle_receive, handle_receive_raw, handle_send, handle_send_raw, handle_upcheck,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use privtx::config::RpcConfig;
use privtx::network::wire;
use privtx::{Identity, PayloadBackend, PayloadKey};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::{debug, error, info};

/// Largest accepted request body: a frame-sized payload plus base64 and
/// JSON envelope overhead.
pub const MAX_BODY_SIZE: usize = RpcConfig::MAX_FRAME_SIZE / 3 * 4 + 64 * 1024;

/// Application state shared across handlers.
pub struct NodeState {
    pub backend: Arc<dyn PayloadBackend>,
}

/// Store wrapper that delivers recipient-less sends to the node's own key.
pub struct SelfAddressed {
    inner: Arc<dyn PayloadBackend>,
    identity: Identity,
}

impl SelfAddressed {
    pub fn new(inner: Arc<dyn PayloadBackend>, identity: Identity) -> Self {
        Self { inner, identity }
    }
}

#[async_trait::async_trait]
impl PayloadBackend for SelfAddressed {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn stable_keys(&self) -> bool {
        self.inner.stable_keys()
    }

    async fn up_check(&self) -> privtx::Result<()> {
        self.inner.up_check().await
    }

    async fn send(
        &self,
        payload: &[u8],
        from: Option<&Identity>,
        to: &[Identity],
    ) -> privtx::Result<PayloadKey> {
        if to.is_empty() {
            return self
                .inner
                .send(payload, from, std::slice::from_ref(&self.identity))
                .await;
        }
        self.inner.send(payload, from, to).await
    }

    async fn receive(&self, key: &PayloadKey) -> privtx::Result<Option<Bytes>> {
        self.inner.receive(key).await
    }
}

/// Build the node API router over `backend`.
pub fn router(backend: Arc<dyn PayloadBackend>) -> Router {
    let state = Arc::new(NodeState { backend });

    Router::new()
        .route(&format!("/{}", wire::UPCHECK), get(handle_upcheck))
        .route(&format!("/{}", wire::SEND), post(handle_send))
        .route(&format!("/{}", wire::RECEIVE), post(handle_receive))
        .route(&format!("/{}", wire::SEND_RAW), post(handle_send_raw))
        .route(&format!("/{}", wire::RECEIVE_RAW), get(handle_receive_raw))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Handle to a background HTTP server. Dropping it stops the server and
/// removes its socket file, if any.
pub struct HttpServerHandle {
    task: JoinHandle<()>,
    socket_path: Option<PathBuf>,
}

impl HttpServerHandle {
    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path.as_deref()
    }
}

impl Drop for HttpServerHandle {
    fn drop(&mut self) {
        self.task.abort();
        if let Some(path) = &self.socket_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Serve the node API on TCP.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_tcp(
    backend: Arc<dyn PayloadBackend>,
    addr: &str,
) -> anyhow::Result<(SocketAddr, HttpServerHandle)> {
    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Node HTTP API listening on {}", actual_addr);

    let app = router(backend);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    Ok((
        actual_addr,
        HttpServerHandle {
            task,
            socket_path: None,
        },
    ))
}

/// Serve the node API on a Unix domain socket.
///
/// A stale socket file at the path is replaced.
pub async fn start_unix(
    backend: Arc<dyn PayloadBackend>,
    socket_path: impl AsRef<Path>,
) -> anyhow::Result<HttpServerHandle> {
    let socket_path = socket_path.as_ref().to_path_buf();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;

    info!("Node HTTP API listening on {}", socket_path.display());

    let app = router(backend);
    let task = tokio::spawn(async move {
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!("Unix socket accept error: {}", e);
                    continue;
                }
            };

            let app = app.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request: hyper::Request<Incoming>| {
                    app.clone().oneshot(request)
                });
                if let Err(e) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!("Unix socket connection ended: {}", e);
                }
            });
        }
    });

    Ok(HttpServerHandle {
        task,
        socket_path: Some(socket_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::UPCHECK_REPLY;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use privtx::{content_key, ContentAddressedStore, RecipientIndexedStore};
    use serde_json::{json, Value};

    fn content_router() -> Router {
        router(Arc::new(ContentAddressedStore::new()))
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upcheck() {
        let response = content_router()
            .oneshot(Request::get("/upcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, UPCHECK_REPLY.as_bytes());
    }

    #[tokio::test]
    async fn test_send_then_receive_json() {
        let app = content_router();
        let response = app
            .clone()
            .oneshot(post_json(
                "/send",
                json!({"payload": STANDARD.encode(b"hello"), "from": "", "to": ["Ym9i"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let sent: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(sent["key"], content_key(b"hello").to_base64());

        let response = app
            .oneshot(post_json("/receive", json!({"key": sent["key"], "to": "Ym9i"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let received: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(received["payload"], STANDARD.encode(b"hello"));
    }

    #[tokio::test]
    async fn test_receive_unknown_key_is_404() {
        let key = content_key(b"nothing").to_base64();
        let response = content_router()
            .oneshot(post_json("/receive", json!({"key": key, "to": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = content_router()
            .oneshot(
                Request::get("/receiveraw")
                    .header(wire::HEADER_KEY, key)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_base64_is_400() {
        let response = content_router()
            .oneshot(post_json(
                "/send",
                json!({"payload": "!!!", "from": "", "to": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_raw_roundtrip() {
        let app = content_router();
        let response = app
            .clone()
            .oneshot(
                Request::post("/sendraw")
                    .header(wire::HEADER_FROM, "YWxpY2U=")
                    .header(wire::HEADER_TO, "Ym9i,Y2Fyb2w=")
                    .body(Body::from(vec![0u8, 1, 2, 255]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let key = String::from_utf8(body_bytes(response).await).unwrap();

        let response = app
            .oneshot(
                Request::get("/receiveraw")
                    .header(wire::HEADER_KEY, key)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, vec![0u8, 1, 2, 255]);
    }

    #[tokio::test]
    async fn test_accepts_bodies_over_default_limit() {
        let payload = vec![7u8; 3 * 1024 * 1024];
        let app = content_router();
        let response = app
            .clone()
            .oneshot(
                Request::post("/sendraw")
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let key = String::from_utf8(body_bytes(response).await).unwrap();
        assert_eq!(key, content_key(&payload).to_base64());

        let response = app
            .oneshot(post_json(
                "/send",
                json!({"payload": STANDARD.encode(&payload), "from": "", "to": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_self_addressed_fills_empty_recipients() {
        let store = Arc::new(RecipientIndexedStore::new());
        let node_key = Identity::new(b"node".to_vec());
        let backend = SelfAddressed::new(store.clone(), node_key.clone());

        backend.send(b"to self", None, &[]).await.unwrap();
        assert_eq!(store.recipients().await, vec![node_key.clone()]);

        let inbox = PayloadKey::new(node_key.as_bytes().to_vec());
        assert_eq!(
            backend.receive(&inbox).await.unwrap(),
            Some(Bytes::from_static(b"to self"))
        );
    }
}
