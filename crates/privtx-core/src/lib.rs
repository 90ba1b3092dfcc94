//! privtx - Client for private transaction manager nodes.
//!
//! A host application hands opaque payloads to a separate privacy manager
//! process ("node") and gets back a key it can later fetch them with. The
//! same three operations work over HTTP on a Unix socket, HTTP on TCP, a
//! binary RPC channel, or an in-process store.
//!
//! # Example
//!
//! ```rust,ignore
//! use privtx::PrivacyManager;
//!
//! #[tokio::main]
//! async fn main() -> privtx::Result<()> {
//!     let manager = PrivacyManager::open("/etc/node/node.toml").await?;
//!
//!     let recipient = privtx::Identity::from_base64("Ym9i")?;
//!     let key = manager.send(b"payload", None, &[recipient]).await?;
//!
//!     // Served from the cache, no round-trip.
//!     let payload = manager.receive(&key).await;
//!     assert_eq!(&payload[..], b"payload");
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod ipc;
pub mod launcher;
pub mod manager;
pub mod memory;
pub mod network;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use backend::PayloadBackend;
pub use cache::{CacheSettings, CacheStats, PayloadCache};
pub use client::PayloadClient;
pub use config::{ApiMode, BackendKind, MemoryStoreKind, ResolvedConfig, TransportTimeouts};
pub use error::{PtmError, Result};
pub use ipc::{RpcBackend, RpcServer, RpcServerHandle};
pub use launcher::{launch_node, NodeProcess};
pub use manager::PrivacyManager;
pub use memory::{content_key, memory_backend, ContentAddressedStore, RecipientIndexedStore};
pub use network::{HttpBackend, TcpHttpBackend, UnixHttpBackend};
pub use settings::{load_config, NodeSettings};
pub use types::{Identity, PayloadKey};
