//! Node settings file.
//!
//! A TOML file naming where the node listens and which key file holds the
//! local identity. Older files spell two of the fields differently; those
//! spellings are still read when the current ones are empty.

use crate::config::{
    resolve_path, ApiMode, BackendKind, MemoryStoreKind, NodeConfig, ResolvedConfig,
    TransportTimeouts,
};
use crate::types::Identity;
use crate::{PtmError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The settings file as written on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub socket: String,
    #[serde(rename = "publickeys")]
    pub public_keys: Vec<String>,
    #[serde(rename = "nodeCommand")]
    pub node_command: String,
    #[serde(rename = "nodeAutostart")]
    pub node_autostart: bool,
    pub url: String,
    pub transport: String,
    pub api: String,
    #[serde(rename = "memoryStore")]
    pub memory_store: String,

    // Legacy spellings
    #[serde(rename = "socketPath", skip_serializing_if = "String::is_empty")]
    pub socket_path: String,
    #[serde(rename = "publicKeyPath", skip_serializing_if = "String::is_empty")]
    pub public_key_path: String,
}

impl NodeSettings {
    /// Parse settings text, applying the legacy fallbacks and defaults.
    pub fn parse(text: &str) -> Result<Self> {
        let mut settings: NodeSettings = toml::from_str(text).map_err(|e| PtmError::Config {
            message: format!("invalid settings: {}", e),
        })?;
        settings.apply_defaults();
        Ok(settings)
    }

    /// Read and parse a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| PtmError::io_with_path(e, path))?;
        debug!("Loaded settings from {}", path.display());
        Self::parse(&text)
    }

    fn apply_defaults(&mut self) {
        if self.socket.is_empty() {
            self.socket = std::mem::take(&mut self.socket_path);
        }
        if self.public_keys.is_empty() && !self.public_key_path.is_empty() {
            self.public_keys.push(std::mem::take(&mut self.public_key_path));
        }
        if self.node_command.is_empty() {
            self.node_command = NodeConfig::DEFAULT_COMMAND.to_string();
        }
    }

    /// Turn the file contents into a client configuration.
    ///
    /// Relative paths resolve against `work_dir`. The first public key file
    /// is read to obtain the local identity; the in-memory transport works
    /// without one.
    pub fn resolve(&self, work_dir: impl Into<PathBuf>) -> Result<ResolvedConfig> {
        let work_dir = work_dir.into();

        let backend = BackendKind::parse(&self.transport).ok_or_else(|| PtmError::Config {
            message: format!("unknown transport {:?}", self.transport),
        })?;
        let api_mode = ApiMode::parse(&self.api).ok_or_else(|| PtmError::Config {
            message: format!("unknown api mode {:?}", self.api),
        })?;
        let memory_store =
            MemoryStoreKind::parse(&self.memory_store).ok_or_else(|| PtmError::Config {
                message: format!("unknown memory store {:?}", self.memory_store),
            })?;

        let identity = match self.public_keys.first().filter(|p| !p.is_empty()) {
            Some(key_file) => Identity::load(resolve_path(&work_dir, Path::new(key_file)))?,
            None if backend == BackendKind::Memory => Identity::default(),
            None => {
                return Err(PtmError::Config {
                    message: "no public key file configured".to_string(),
                })
            }
        };

        Ok(ResolvedConfig {
            backend,
            socket: (!self.socket.is_empty()).then(|| PathBuf::from(&self.socket)),
            url: (!self.url.is_empty()).then(|| self.url.clone()),
            work_dir,
            identity,
            api_mode,
            memory_store,
            timeouts: TransportTimeouts::default(),
            node_autostart: self.node_autostart,
            node_command: self.node_command.clone(),
        })
    }
}

/// Load a settings file and resolve it against the file's own directory.
pub fn load_config(path: impl AsRef<Path>) -> Result<ResolvedConfig> {
    let path = path.as_ref();
    let settings = NodeSettings::load(path)?;
    settings.resolve(settings_dir(path))
}

/// Directory relative settings paths are resolved against.
pub fn settings_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
