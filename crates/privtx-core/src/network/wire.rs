//! Node HTTP API wire types.
//!
//! All byte fields are standard padded base64 strings.

use serde::{Deserialize, Serialize};

pub const UPCHECK: &str = "upcheck";
pub const SEND: &str = "send";
pub const RECEIVE: &str = "receive";
pub const SEND_RAW: &str = "sendraw";
pub const RECEIVE_RAW: &str = "receiveraw";

pub const HEADER_FROM: &str = "c11n-from";
pub const HEADER_TO: &str = "c11n-to";
pub const HEADER_KEY: &str = "c11n-key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub payload: String,
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub key: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveResponse {
    pub payload: String,
}

/// Split a comma-joined recipient header back into its base64 entries.
pub fn split_recipients(header: &str) -> Vec<&str> {
    header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
