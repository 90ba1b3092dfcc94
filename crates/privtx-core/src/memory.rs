//! In-process backends that stand in for a privacy manager node.
//!
//! Two stores with different contracts are provided:
//!
//! - [`ContentAddressedStore`] keys every payload by its SHA-512/256 digest.
//!   Sending the same bytes twice yields the same key. This is the default,
//!   since it keeps the key/payload separation the networked backends have.
//! - [`RecipientIndexedStore`] keeps one payload per recipient identity and
//!   overwrites it on every send. Its send returns an empty key; receive
//!   interprets the key bytes as a recipient identity.
//!
//! The two are not interchangeable and neither emulates the other.

use crate::backend::PayloadBackend;
use crate::config::MemoryStoreKind;
use crate::types::{Identity, PayloadKey};
use crate::Result;
use bytes::Bytes;
use sha2::{Digest, Sha512_256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Build the in-memory store selected by `kind`.
pub fn memory_backend(kind: MemoryStoreKind) -> Arc<dyn PayloadBackend> {
    match kind {
        MemoryStoreKind::ContentAddressed => Arc::new(ContentAddressedStore::new()),
        MemoryStoreKind::RecipientIndexed => Arc::new(RecipientIndexedStore::new()),
    }
}

/// Compute the content key for a payload.
pub fn content_key(payload: &[u8]) -> PayloadKey {
    PayloadKey::new(Sha512_256::digest(payload).to_vec())
}

/// Store keyed by payload digest.
#[derive(Debug, Default)]
pub struct ContentAddressedStore {
    payloads: RwLock<HashMap<PayloadKey, Bytes>>,
}

impl ContentAddressedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.payloads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payloads.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl PayloadBackend for ContentAddressedStore {
    fn name(&self) -> &'static str {
        "memory-content"
    }

    async fn up_check(&self) -> Result<()> {
        Ok(())
    }

    async fn send(
        &self,
        payload: &[u8],
        _from: Option<&Identity>,
        _to: &[Identity],
    ) -> Result<PayloadKey> {
        let key = content_key(payload);
        self.payloads
            .write()
            .await
            .insert(key.clone(), Bytes::copy_from_slice(payload));
        debug!("Stored {} bytes under {}", payload.len(), key);
        Ok(key)
    }

    async fn receive(&self, key: &PayloadKey) -> Result<Option<Bytes>> {
        Ok(self.payloads.read().await.get(key).cloned())
    }
}

/// Store keeping the latest payload per recipient.
#[derive(Debug, Default)]
pub struct RecipientIndexedStore {
    inboxes: RwLock<HashMap<Identity, Bytes>>,
}

impl RecipientIndexedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recipients(&self) -> Vec<Identity> {
        let mut ids: Vec<_> = self.inboxes.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait::async_trait]
impl PayloadBackend for RecipientIndexedStore {
    fn name(&self) -> &'static str {
        "memory-recipient"
    }

    /// Every send to a recipient replaces what its key returns.
    fn stable_keys(&self) -> bool {
        false
    }

    async fn up_check(&self) -> Result<()> {
        Ok(())
    }

    async fn send(
        &self,
        payload: &[u8],
        _from: Option<&Identity>,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        let payload = Bytes::copy_from_slice(payload);
        let mut inboxes = self.inboxes.write().await;
        for recipient in to {
            inboxes.insert(recipient.clone(), payload.clone());
        }
        debug!("Delivered {} bytes to {} recipients", payload.len(), to.len());
        Ok(PayloadKey::default())
    }

    async fn receive(&self, key: &PayloadKey) -> Result<Option<Bytes>> {
        let recipient = Identity::from(key.as_bytes());
        Ok(self.inboxes.read().await.get(&recipient).cloned())
    }
}
