//! Binary RPC protocol types and framing.
//!
//! Each message is a 4-byte big-endian length prefix followed by a bincode
//! encoding of [`RpcRequest`] or [`RpcResponse`].
//!
//! ```text
//! [u32 BE: len][bincode bytes of len]
//! ```
//!
//! Byte fields travel raw; there is no base64 on this channel.

use crate::config::RpcConfig;
use crate::{PtmError, Result};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Calls a client can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcRequest {
    UpCheck,
    Send {
        payload: ByteBuf,
        /// Empty means the node's default sender.
        from: ByteBuf,
        to: Vec<ByteBuf>,
    },
    Receive {
        key: ByteBuf,
        to: ByteBuf,
    },
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::UpCheck => "upcheck",
            RpcRequest::Send { .. } => "send",
            RpcRequest::Receive { .. } => "receive",
        }
    }
}

/// Answers the node sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResponse {
    Up,
    Sent { key: ByteBuf },
    Received { payload: ByteBuf },
    /// Not a recipient, or unknown key.
    NotFound,
    Error { code: i32, message: String },
}

impl RpcResponse {
    pub fn error(err: &PtmError) -> Self {
        RpcResponse::Error {
            code: err.to_rpc_error_code(),
            message: err.to_string(),
        }
    }
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(RpcConfig::MAX_FRAME_SIZE as u64)
}

/// Encode a message body.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(codec().serialize(message)?)
}

/// Decode a message body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(codec().deserialize(bytes)?)
}

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > RpcConfig::MAX_FRAME_SIZE {
        return Err(PtmError::InvalidFrame {
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                RpcConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > RpcConfig::MAX_FRAME_SIZE {
        return Err(PtmError::InvalidFrame {
            message: format!(
                "frame size {} exceeds maximum {}",
                payload.len(),
                RpcConfig::MAX_FRAME_SIZE
            ),
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
