//! HTTP transports: TCP via reqwest, Unix sockets via hyper.
//!
//! Both hand back the status and full body; interpreting the status is the
//! backend's job.

use crate::config::{normalize_base_url, NetworkConfig, TransportTimeouts};
use crate::{PtmError, Result};
use bytes::Bytes;
use http::{header, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

/// A request against one node endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Endpoint name relative to the node root, e.g. `send`.
    pub endpoint: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn get(endpoint: &'static str) -> Self {
        Self {
            method: Method::GET,
            endpoint,
            headers: Vec::new(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub fn post(endpoint: &'static str, content_type: &'static str, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            endpoint,
            headers: Vec::new(),
            content_type: Some(content_type),
            body,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Status and body of a node response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpReply {
    /// Body as text for error messages, lossy and truncated.
    pub fn body_excerpt(&self) -> String {
        const LIMIT: usize = 256;
        let text = String::from_utf8_lossy(&self.body);
        let trimmed = text.trim();
        if trimmed.chars().count() > LIMIT {
            format!("{}...", trimmed.chars().take(LIMIT).collect::<String>())
        } else {
            trimmed.to_string()
        }
    }
}

/// One way of carrying HTTP requests to the node.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Where requests go, for logs and errors.
    fn endpoint(&self) -> String;

    async fn execute(&self, request: HttpRequest) -> Result<HttpReply>;
}

/// HTTP over TCP with an owned, explicitly configured reqwest client.
pub struct TcpTransport {
    client: reqwest::Client,
    base_url: String,
    timeouts: TransportTimeouts,
}

impl TcpTransport {
    pub fn new(base_url: &str, timeouts: TransportTimeouts) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.dial)
            .timeout(timeouts.request)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| PtmError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            timeouts,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl HttpTransport for TcpTransport {
    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpReply> {
        let url = format!("{}{}", self.base_url, request.endpoint);
        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method, url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(content_type) = request.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| PtmError::from_reqwest(e, &url, self.timeouts.request))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PtmError::from_reqwest_body(e, &url, self.timeouts.request))?;

        Ok(HttpReply { status, body })
    }
}

/// HTTP/1.1 over a Unix domain socket, one connection per request.
pub struct UnixTransport {
    socket_path: PathBuf,
    timeouts: TransportTimeouts,
}

impl UnixTransport {
    pub fn new(socket_path: impl Into<PathBuf>, timeouts: TransportTimeouts) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeouts,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn unreachable(&self, err: impl std::fmt::Display) -> PtmError {
        PtmError::Unreachable {
            endpoint: self.endpoint(),
            message: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for UnixTransport {
    fn endpoint(&self) -> String {
        format!("unix:{}", self.socket_path.display())
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpReply> {
        let endpoint = self.endpoint();
        debug!("{} {}/{}", request.method, endpoint, request.endpoint);

        let stream = timeout(self.timeouts.dial, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| PtmError::Timeout {
                operation: format!("dial {}", endpoint),
                after: self.timeouts.dial,
            })?
            .map_err(|e| self.unreachable(e))?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| self.unreachable(e))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Unix socket connection ended: {}", e);
            }
        });

        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(format!("/{}", request.endpoint))
            .header(header::HOST, NetworkConfig::UNIX_HOST)
            .header(header::USER_AGENT, NetworkConfig::USER_AGENT);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(content_type) = request.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let http_request = builder
            .body(Full::new(request.body))
            .map_err(|e| PtmError::Encoding {
                message: format!("invalid request for {}: {}", request.endpoint, e),
            })?;

        let exchange = async {
            let response = timeout(self.timeouts.response_header, sender.send_request(http_request))
                .await
                .map_err(|_| PtmError::Timeout {
                    operation: format!("response headers from {}", endpoint),
                    after: self.timeouts.response_header,
                })?
                .map_err(|e| self.unreachable(e))?;

            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| self.unreachable(e))?
                .to_bytes();
            Ok::<_, PtmError>(HttpReply { status, body })
        };

        timeout(self.timeouts.request, exchange)
            .await
            .map_err(|_| PtmError::Timeout {
                operation: format!("request to {}", endpoint),
                after: self.timeouts.request,
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tcp_transport_normalizes_base_url() {
        let transport =
            TcpTransport::new("http://127.0.0.1:9000", TransportTimeouts::default()).unwrap();
        assert_eq!(transport.base_url(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn test_body_excerpt_truncates() {
        let reply = HttpReply {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: Bytes::from("x".repeat(1000)),
        };
        let excerpt = reply.body_excerpt();
        assert!(excerpt.len() < 300);
        assert!(excerpt.ends_with("..."));
    }

    #[tokio::test]
    async fn test_unix_transport_missing_socket_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ipc");
        let transport = UnixTransport::new(path, TransportTimeouts::default());

        let err = transport.execute(HttpRequest::get("upcheck")).await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_unix_transport_header_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.ipc");
        // Accepts connections but never answers.
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let timeouts = TransportTimeouts {
            dial: Duration::from_millis(500),
            request: Duration::from_millis(400),
            response_header: Duration::from_millis(200),
        };
        let transport = UnixTransport::new(&path, timeouts);
        let err = transport.execute(HttpRequest::get("upcheck")).await.unwrap_err();
        assert!(matches!(err, PtmError::Timeout { .. }), "unexpected error: {err:?}");

        hold.abort();
    }

    /// Answers every request with a body shorter than its Content-Length.
    async fn truncating_server() -> (String, tokio::task::JoinHandle<()>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                    .await;
                let _ = stream.shutdown().await;
            }
        });
        (url, task)
    }

    #[tokio::test]
    async fn test_tcp_truncated_body_is_unreachable() {
        let (url, server) = truncating_server().await;
        let transport = TcpTransport::new(&url, TransportTimeouts::default()).unwrap();

        let err = transport.execute(HttpRequest::get("upcheck")).await.unwrap_err();
        assert!(matches!(err, PtmError::Unreachable { .. }), "unexpected error: {err:?}");
        assert!(err.is_connectivity());

        server.abort();
    }

    #[tokio::test]
    async fn test_unix_truncated_body_is_unreachable() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.ipc");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let server = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                    .await;
                let _ = stream.shutdown().await;
            }
        });

        let transport = UnixTransport::new(&path, TransportTimeouts::default());
        let err = transport.execute(HttpRequest::get("upcheck")).await.unwrap_err();
        assert!(matches!(err, PtmError::Unreachable { .. }), "unexpected error: {err:?}");

        server.abort();
    }
}
