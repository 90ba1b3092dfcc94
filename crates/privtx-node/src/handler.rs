//! Node HTTP API handlers.

use crate::server::NodeState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use privtx::network::wire::{
    self, ReceiveRequest, ReceiveResponse, SendRequest, SendResponse,
};
use privtx::{Identity, PayloadKey, PtmError};
use std::sync::Arc;
use tracing::{debug, error};

/// Body of a successful upcheck.
pub const UPCHECK_REPLY: &str = "I'm up!";

/// Failure of a node API call.
#[derive(Debug)]
pub enum NodeError {
    BadRequest(String),
    NotFound,
    Backend(PtmError),
}

impl From<PtmError> for NodeError {
    fn from(err: PtmError) -> Self {
        NodeError::Backend(err)
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        match self {
            NodeError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            NodeError::NotFound => (StatusCode::NOT_FOUND, "Payload not found").into_response(),
            NodeError::Backend(e) => {
                error!("Backend error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, NodeError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| NodeError::BadRequest(format!("{} is not base64: {}", field, e)))
}

fn decode_sender(value: &str) -> Result<Option<Identity>, NodeError> {
    let bytes = decode_field("from", value)?;
    Ok((!bytes.is_empty()).then(|| Identity::new(bytes)))
}

fn decode_recipients<'a>(
    values: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Identity>, NodeError> {
    values
        .into_iter()
        .map(|v| decode_field("to", v).map(Identity::new))
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, NodeError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map_err(|_| NodeError::BadRequest(format!("{} header is not text", name))),
        None => Ok(""),
    }
}

/// `GET /upcheck`
pub async fn handle_upcheck(
    State(state): State<Arc<NodeState>>,
) -> Result<&'static str, NodeError> {
    state.backend.up_check().await?;
    Ok(UPCHECK_REPLY)
}

/// `POST /send`
pub async fn handle_send(
    State(state): State<Arc<NodeState>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, NodeError> {
    let payload = decode_field("payload", &request.payload)?;
    let from = decode_sender(&request.from)?;
    let to = decode_recipients(request.to.iter().map(String::as_str))?;

    let key = state.backend.send(&payload, from.as_ref(), &to).await?;
    debug!("send: {} bytes -> {}", payload.len(), key);
    Ok(Json(SendResponse {
        key: key.to_base64(),
    }))
}

/// `POST /receive`
pub async fn handle_receive(
    State(state): State<Arc<NodeState>>,
    Json(request): Json<ReceiveRequest>,
) -> Result<Json<ReceiveResponse>, NodeError> {
    let key = PayloadKey::new(decode_field("key", &request.key)?);
    match state.backend.receive(&key).await? {
        Some(payload) => Ok(Json(ReceiveResponse {
            payload: STANDARD.encode(&payload),
        })),
        None => Err(NodeError::NotFound),
    }
}

/// `POST /sendraw`: payload in the body, addressing in headers, key as text.
pub async fn handle_send_raw(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, NodeError> {
    let from = decode_sender(header_str(&headers, wire::HEADER_FROM)?)?;
    let to = decode_recipients(wire::split_recipients(header_str(&headers, wire::HEADER_TO)?))?;

    let key = state.backend.send(&body, from.as_ref(), &to).await?;
    debug!("sendraw: {} bytes -> {}", body.len(), key);
    Ok(key.to_base64())
}

/// `GET /receiveraw`: key in a header, payload as the body.
pub async fn handle_receive_raw(
    State(state): State<Arc<NodeState>>,
    headers: HeaderMap,
) -> Result<Response, NodeError> {
    let key = PayloadKey::new(decode_field("key", header_str(&headers, wire::HEADER_KEY)?)?);
    match state.backend.receive(&key).await? {
        Some(payload) => Ok((StatusCode::OK, payload).into_response()),
        None => Err(NodeError::NotFound),
    }
}
