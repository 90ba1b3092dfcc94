//! Centralized configuration for privtx.
//!
//! Constant structs hold the defaults; [`ResolvedConfig`] is the value set a
//! [`PayloadClient`](crate::PayloadClient) is built from.

use crate::types::Identity;
use crate::{PtmError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const DIAL_TIMEOUT: Duration = Duration::from_secs(1);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
    pub const RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(5);
    pub const USER_AGENT: &'static str = "privtx/0.3";
    /// Host header sent on Unix socket requests.
    pub const UNIX_HOST: &'static str = "localhost";
}

/// Idempotency cache configuration.
pub struct CacheConfig;

impl CacheConfig {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_MAX_ENTRIES: u64 = 100_000;
}

/// Binary RPC channel configuration.
pub struct RpcConfig;

impl RpcConfig {
    pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
}

/// Node process configuration.
pub struct NodeConfig;

impl NodeConfig {
    pub const DEFAULT_COMMAND: &'static str = "constellation-node";
    pub const STARTUP_DELAY: Duration = Duration::from_millis(100);
}

/// Which transport family the client should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// HTTP over a Unix socket when a socket is set, else HTTP over TCP.
    #[default]
    Http,
    /// Binary RPC over a Unix socket.
    Rpc,
    /// In-process store, no node.
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Http => "http",
            BackendKind::Rpc => "rpc",
            BackendKind::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "" | "http" => Some(BackendKind::Http),
            "rpc" | "grpc" => Some(BackendKind::Rpc),
            "memory" | "mem" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// JSON envelopes on `send` / `receive`.
    #[default]
    Json,
    /// Raw bodies on `sendraw` / `receiveraw`, addressing in headers.
    Raw,
}

impl ApiMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "" | "json" => Some(ApiMode::Json),
            "raw" => Some(ApiMode::Raw),
            _ => None,
        }
    }
}

/// Semantics of the in-memory backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryStoreKind {
    /// Payloads stored under their SHA-512/256 digest.
    #[default]
    ContentAddressed,
    /// Payloads stored once per recipient, last write wins.
    RecipientIndexed,
}

impl MemoryStoreKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "" | "content" | "content-addressed" => Some(MemoryStoreKind::ContentAddressed),
            "recipient" | "recipient-indexed" => Some(MemoryStoreKind::RecipientIndexed),
            _ => None,
        }
    }
}

/// Timeouts enforced on every network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    pub dial: Duration,
    pub request: Duration,
    pub response_header: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            dial: NetworkConfig::DIAL_TIMEOUT,
            request: NetworkConfig::REQUEST_TIMEOUT,
            response_header: NetworkConfig::RESPONSE_HEADER_TIMEOUT,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub backend: BackendKind,
    pub socket: Option<PathBuf>,
    pub url: Option<String>,
    pub work_dir: PathBuf,
    pub identity: Identity,
    pub api_mode: ApiMode,
    pub memory_store: MemoryStoreKind,
    pub timeouts: TransportTimeouts,
    /// Consumed by the launcher only.
    pub node_autostart: bool,
    pub node_command: String,
}

impl ResolvedConfig {
    /// Configuration for an HTTP node listening on a Unix socket.
    pub fn unix_socket(socket: impl Into<PathBuf>, identity: Identity) -> Self {
        Self {
            socket: Some(socket.into()),
            ..Self::base(BackendKind::Http, identity)
        }
    }

    /// Configuration for an HTTP node listening on TCP.
    pub fn url(url: impl Into<String>, identity: Identity) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::base(BackendKind::Http, identity)
        }
    }

    /// Configuration for a binary RPC node on a Unix socket.
    pub fn rpc(socket: impl Into<PathBuf>, identity: Identity) -> Self {
        Self {
            socket: Some(socket.into()),
            ..Self::base(BackendKind::Rpc, identity)
        }
    }

    /// Configuration for the in-process store.
    pub fn memory(store: MemoryStoreKind, identity: Identity) -> Self {
        Self {
            memory_store: store,
            ..Self::base(BackendKind::Memory, identity)
        }
    }

    fn base(backend: BackendKind, identity: Identity) -> Self {
        Self {
            backend,
            socket: None,
            url: None,
            work_dir: PathBuf::from("."),
            identity,
            api_mode: ApiMode::default(),
            memory_store: MemoryStoreKind::default(),
            timeouts: TransportTimeouts::default(),
            node_autostart: false,
            node_command: NodeConfig::DEFAULT_COMMAND.to_string(),
        }
    }

    pub fn with_api_mode(mut self, mode: ApiMode) -> Self {
        self.api_mode = mode;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: TransportTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// The configured socket, joined with the work directory when relative.
    pub fn socket_path(&self) -> Option<PathBuf> {
        self.socket
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| resolve_path(&self.work_dir, p))
    }

    /// The configured base URL with a trailing slash.
    pub fn base_url(&self) -> Result<Option<String>> {
        let Some(raw) = self.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let normalized = normalize_base_url(raw);
        url::Url::parse(&normalized).map_err(|e| PtmError::Config {
            message: format!("invalid node url {:?}: {}", raw, e),
        })?;
        Ok(Some(normalized))
    }
}

/// Append the trailing slash endpoint names are joined onto.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

pub(crate) fn resolve_path(work_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        work_dir.join(path)
    }
}
