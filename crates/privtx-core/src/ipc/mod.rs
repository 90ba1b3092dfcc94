//! Binary RPC channel to a node over a Unix socket.
//!
//! # Architecture
//!
//! - **Client**: [`RpcBackend`], one connection per call
//! - **Server**: [`RpcServer`], serves any backend (used by the stub node)
//! - **Protocol**: length-prefixed bincode frames shared by both

pub mod client;
pub mod protocol;
pub mod server;

pub use client::RpcBackend;
pub use protocol::{RpcRequest, RpcResponse};
pub use server::{RpcServer, RpcServerHandle};
