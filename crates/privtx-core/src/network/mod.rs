//! HTTP backends for the node API.
//!
//! This module provides:
//! - JSON and raw wire encodings of the node HTTP API
//! - A TCP transport on an owned reqwest client
//! - A Unix domain socket transport on hyper
//! - [`HttpBackend`], generic over either transport

mod backend;
mod transport;
pub mod wire;

pub use backend::{HttpBackend, TcpHttpBackend, UnixHttpBackend};
pub use transport::{HttpReply, HttpRequest, HttpTransport, TcpTransport, UnixTransport};
