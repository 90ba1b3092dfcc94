//! Privacy manager entry point.
//!
//! Loads the settings file, optionally starts the node, connects, and wraps
//! the client in a [`PayloadCache`].

use crate::cache::{CacheSettings, PayloadCache};
use crate::client::PayloadClient;
use crate::launcher::{launch_node, NodeProcess};
use crate::settings::load_config;
use crate::types::{Identity, PayloadKey};
use crate::Result;
use bytes::Bytes;
use std::path::Path;
use tracing::info;

/// A connected, cached client plus the node process it started, if any.
#[derive(Debug)]
pub struct PrivacyManager {
    cache: PayloadCache,
    node: Option<NodeProcess>,
}

impl PrivacyManager {
    /// Open the manager described by the settings file at `config_path`.
    ///
    /// Fails when the settings cannot be loaded, the node cannot be started,
    /// or the up-check fails.
    pub async fn open(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cache(config_path, CacheSettings::default()).await
    }

    pub async fn open_with_cache(
        config_path: impl AsRef<Path>,
        cache_settings: CacheSettings,
    ) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config = load_config(config_path)?;

        let node = if config.node_autostart {
            Some(launch_node(&config.node_command, config_path).await?)
        } else {
            None
        };

        let client = PayloadClient::connect(&config).await?;
        info!(
            "Privacy manager ready ({}, settings {})",
            client.backend_name(),
            config_path.display()
        );

        Ok(Self {
            cache: PayloadCache::with_settings(client, cache_settings),
            node,
        })
    }

    /// `None` when no settings path is given, otherwise [`open`](Self::open).
    pub async fn open_optional(config_path: Option<&Path>) -> Result<Option<Self>> {
        match config_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(Some(Self::open(path).await?)),
            _ => Ok(None),
        }
    }

    pub fn cache(&self) -> &PayloadCache {
        &self.cache
    }

    /// The node process started for this manager.
    pub fn node(&self) -> Option<&NodeProcess> {
        self.node.as_ref()
    }

    pub async fn up_check(&self) -> Result<()> {
        self.cache.up_check().await
    }

    pub async fn send(
        &self,
        payload: &[u8],
        from: Option<&Identity>,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        self.cache.send(payload, from, to).await
    }

    pub async fn receive(&self, key: &PayloadKey) -> Bytes {
        self.cache.receive(key).await
    }
}
