//! Node HTTP API backend, generic over the transport carrying it.

use super::transport::{HttpReply, HttpRequest, HttpTransport, TcpTransport, UnixTransport};
use super::wire::{self, ReceiveRequest, ReceiveResponse, SendRequest, SendResponse};
use crate::backend::{sender_or, PayloadBackend};
use crate::config::{ApiMode, TransportTimeouts};
use crate::types::{join_recipients, Identity, PayloadKey};
use crate::{PtmError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::StatusCode;
use std::path::PathBuf;
use tracing::debug;

const JSON: &str = "application/json";
const OCTET_STREAM: &str = "application/octet-stream";

/// Talks the node HTTP API in either JSON or raw mode.
pub struct HttpBackend<T: HttpTransport> {
    transport: T,
    identity: Identity,
    mode: ApiMode,
    name: &'static str,
}

/// HTTP backend over a Unix domain socket.
pub type UnixHttpBackend = HttpBackend<UnixTransport>;

/// HTTP backend over TCP.
pub type TcpHttpBackend = HttpBackend<TcpTransport>;

impl HttpBackend<UnixTransport> {
    pub fn unix(
        socket_path: impl Into<PathBuf>,
        identity: Identity,
        mode: ApiMode,
        timeouts: TransportTimeouts,
    ) -> Self {
        Self::with_transport(UnixTransport::new(socket_path, timeouts), identity, mode, "http-unix")
    }
}

impl HttpBackend<TcpTransport> {
    pub fn tcp(
        base_url: &str,
        identity: Identity,
        mode: ApiMode,
        timeouts: TransportTimeouts,
    ) -> Result<Self> {
        Ok(Self::with_transport(
            TcpTransport::new(base_url, timeouts)?,
            identity,
            mode,
            "http-tcp",
        ))
    }
}

impl<T: HttpTransport> HttpBackend<T> {
    pub fn with_transport(
        transport: T,
        identity: Identity,
        mode: ApiMode,
        name: &'static str,
    ) -> Self {
        Self {
            transport,
            identity,
            mode,
            name,
        }
    }

    pub fn mode(&self) -> ApiMode {
        self.mode
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn rejected(operation: &str, reply: &HttpReply) -> PtmError {
        PtmError::Rejected {
            operation: operation.to_string(),
            status: Some(i32::from(reply.status.as_u16())),
            message: reply.body_excerpt(),
        }
    }

    async fn call(&self, operation: &str, request: HttpRequest) -> Result<HttpReply> {
        let reply = self.transport.execute(request).await?;
        if reply.status != StatusCode::OK {
            return Err(Self::rejected(operation, &reply));
        }
        Ok(reply)
    }

    async fn send_json(
        &self,
        payload: &[u8],
        from: &Identity,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        let body = SendRequest {
            payload: STANDARD.encode(payload),
            from: from.to_base64(),
            to: to.iter().map(Identity::to_base64).collect(),
        };
        let request = HttpRequest::post(wire::SEND, JSON, Bytes::from(serde_json::to_vec(&body)?));
        let reply = self.call(wire::SEND, request).await?;

        let response: SendResponse = serde_json::from_slice(&reply.body)?;
        PayloadKey::from_base64(&response.key)
    }

    async fn send_raw(
        &self,
        payload: &[u8],
        from: &Identity,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        let body = Bytes::copy_from_slice(payload);
        let request = HttpRequest::post(wire::SEND_RAW, OCTET_STREAM, body)
            .with_header(wire::HEADER_FROM, from.to_base64())
            .with_header(wire::HEADER_TO, join_recipients(to));
        let reply = self.call(wire::SEND_RAW, request).await?;

        let text = std::str::from_utf8(&reply.body).map_err(|e| PtmError::Encoding {
            message: format!("sendraw key is not text: {}", e),
        })?;
        PayloadKey::from_base64(text)
    }

    async fn receive_json(&self, key: &PayloadKey) -> Result<Option<Bytes>> {
        let body = ReceiveRequest {
            key: key.to_base64(),
            to: self.identity.to_base64(),
        };
        let body = Bytes::from(serde_json::to_vec(&body)?);
        let request = HttpRequest::post(wire::RECEIVE, JSON, body);
        let Some(reply) = self.fetch(wire::RECEIVE, request).await? else {
            return Ok(None);
        };

        let response: ReceiveResponse = serde_json::from_slice(&reply.body)?;
        Ok(Some(Bytes::from(STANDARD.decode(response.payload)?)))
    }

    async fn receive_raw(&self, key: &PayloadKey) -> Result<Option<Bytes>> {
        let request = HttpRequest::get(wire::RECEIVE_RAW)
            .with_header(wire::HEADER_KEY, key.to_base64())
            .with_header(wire::HEADER_TO, self.identity.to_base64());
        Ok(self.fetch(wire::RECEIVE_RAW, request).await?.map(|reply| reply.body))
    }

    /// Like `call`, but 404 is the not-a-recipient outcome.
    async fn fetch(&self, operation: &str, request: HttpRequest) -> Result<Option<HttpReply>> {
        let reply = self.transport.execute(request).await?;
        match reply.status {
            StatusCode::OK => Ok(Some(reply)),
            StatusCode::NOT_FOUND => {
                debug!("{} on {}: nothing for us", operation, self.transport.endpoint());
                Ok(None)
            }
            _ => Err(Self::rejected(operation, &reply)),
        }
    }
}

#[async_trait::async_trait]
impl<T: HttpTransport> PayloadBackend for HttpBackend<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn up_check(&self) -> Result<()> {
        let reply = self.transport.execute(HttpRequest::get(wire::UPCHECK)).await?;
        if reply.status != StatusCode::OK {
            return Err(PtmError::Rejected {
                operation: wire::UPCHECK.to_string(),
                status: Some(i32::from(reply.status.as_u16())),
                message: format!(
                    "node API at {} did not respond to upcheck request",
                    self.transport.endpoint()
                ),
            });
        }
        Ok(())
    }

    async fn send(
        &self,
        payload: &[u8],
        from: Option<&Identity>,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        let from = sender_or(from, &self.identity);
        match self.mode {
            ApiMode::Json => self.send_json(payload, from, to).await,
            ApiMode::Raw => self.send_raw(payload, from, to).await,
        }
    }

    async fn receive(&self, key: &PayloadKey) -> Result<Option<Bytes>> {
        match self.mode {
            ApiMode::Json => self.receive_json(key).await,
            ApiMode::Raw => self.receive_raw(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport answering from a script and recording what it was sent.
    struct ScriptedTransport {
        replies: Mutex<Vec<HttpReply>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(u16, &str)>) -> Self {
            let mut replies: Vec<_> = replies
                .into_iter()
                .map(|(status, body)| HttpReply {
                    status: StatusCode::from_u16(status).unwrap(),
                    body: Bytes::from(body.to_string()),
                })
                .collect();
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedTransport {
        fn endpoint(&self) -> String {
            "scripted".to_string()
        }

        async fn execute(&self, request: HttpRequest) -> Result<HttpReply> {
            self.seen.lock().unwrap().push(request);
            Ok(self.replies.lock().unwrap().pop().expect("script exhausted"))
        }
    }

    fn backend(mode: ApiMode, replies: Vec<(u16, &str)>) -> HttpBackend<ScriptedTransport> {
        HttpBackend::with_transport(
            ScriptedTransport::new(replies),
            Identity::new(b"local".to_vec()),
            mode,
            "scripted",
        )
    }

    fn seen(backend: &HttpBackend<ScriptedTransport>) -> Vec<HttpRequest> {
        backend.transport.seen.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_json_send_envelope_and_default_sender() {
        let b = backend(ApiMode::Json, vec![(200, r#"{"key":"AAEC"}"#)]);
        let key = b
            .send(b"hello", None, &[Identity::new(b"bob".to_vec())])
            .await
            .unwrap();
        assert_eq!(key.as_bytes(), &[0, 1, 2]);

        let requests = seen(&b);
        assert_eq!(requests[0].endpoint, "send");
        assert_eq!(requests[0].content_type, Some(JSON));
        let body: SendRequest = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body.payload, "aGVsbG8=");
        assert_eq!(body.from, Identity::new(b"local".to_vec()).to_base64());
        assert_eq!(body.to, vec!["Ym9i".to_string()]);
    }

    #[tokio::test]
    async fn test_raw_send_headers_and_key_body() {
        let b = backend(ApiMode::Raw, vec![(200, "AAEC\n")]);
        let from = Identity::new(b"alice".to_vec());
        let to = [Identity::new(b"bob".to_vec()), Identity::new(b"carol".to_vec())];
        let key = b.send(b"\x00\xffraw", Some(&from), &to).await.unwrap();
        assert_eq!(key.as_bytes(), &[0, 1, 2]);

        let request = &seen(&b)[0];
        assert_eq!(request.endpoint, "sendraw");
        assert_eq!(request.body.as_ref(), b"\x00\xffraw");
        assert!(request
            .headers
            .contains(&("c11n-from", "YWxpY2U=".to_string())));
        assert!(request
            .headers
            .contains(&("c11n-to", "Ym9i,Y2Fyb2w=".to_string())));
    }

    #[tokio::test]
    async fn test_non_200_send_is_rejected() {
        let b = backend(ApiMode::Json, vec![(500, "node exploded")]);
        let err = b.send(b"x", None, &[]).await.unwrap_err();
        match err {
            PtmError::Rejected { status, message, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "node exploded");
            }
            other => panic!("Expected Rejected, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upcheck_status() {
        let b = backend(ApiMode::Json, vec![(200, "I'm up!"), (503, "")]);
        assert!(b.up_check().await.is_ok());
        let err = b.up_check().await.unwrap_err();
        assert!(matches!(err, PtmError::Rejected { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_json_receive_decodes_payload_and_scopes_to_local() {
        let b = backend(ApiMode::Json, vec![(200, r#"{"payload":"aGVsbG8="}"#)]);
        let payload = b.receive(&PayloadKey::new(vec![9, 9])).await.unwrap();
        assert_eq!(payload, Some(Bytes::from_static(b"hello")));

        let body: ReceiveRequest = serde_json::from_slice(&seen(&b)[0].body).unwrap();
        assert_eq!(body.key, "CQk=");
        assert_eq!(body.to, Identity::new(b"local".to_vec()).to_base64());
    }

    #[tokio::test]
    async fn test_receive_404_is_not_a_recipient() {
        let b = backend(ApiMode::Json, vec![(404, "not a recipient")]);
        assert_eq!(b.receive(&PayloadKey::new(vec![1])).await.unwrap(), None);

        let b = backend(ApiMode::Raw, vec![(404, "")]);
        assert_eq!(b.receive(&PayloadKey::new(vec![1])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_receive_other_status_is_error() {
        let b = backend(ApiMode::Raw, vec![(400, "bad key")]);
        assert!(b.receive(&PayloadKey::new(vec![1])).await.is_err());
    }

    #[tokio::test]
    async fn test_raw_receive_returns_body_verbatim() {
        let b = backend(ApiMode::Raw, vec![(200, "raw-bytes")]);
        let payload = b.receive(&PayloadKey::new(vec![0, 1, 2])).await.unwrap();
        assert_eq!(payload, Some(Bytes::from_static(b"raw-bytes")));

        let request = &seen(&b)[0];
        assert_eq!(request.endpoint, "receiveraw");
        assert_eq!(request.method, http::Method::GET);
        assert!(request.headers.contains(&("c11n-key", "AAEC".to_string())));
    }

    #[tokio::test]
    async fn test_malformed_send_response_is_encoding_error() {
        let b = backend(ApiMode::Json, vec![(200, "not json")]);
        let err = b.send(b"x", None, &[]).await.unwrap_err();
        assert!(matches!(err, PtmError::Encoding { .. }));
    }
}
