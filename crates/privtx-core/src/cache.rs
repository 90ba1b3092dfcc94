//! Idempotency cache in front of a [`PayloadClient`].
//!
//! Payloads are remembered under the base64 form of their key for a fixed
//! TTL from insertion. A live entry is never replaced, so every `receive` of
//! a cached key returns the same bytes until the entry expires.
//!
//! Over a backend whose keys are not stable (see
//! [`PayloadBackend::stable_keys`](crate::PayloadBackend::stable_keys)) the
//! cache stays out of the way and every call goes to the backend.

use crate::client::PayloadClient;
use crate::config::CacheConfig;
use crate::types::{Identity, PayloadKey};
use crate::Result;
use bytes::Bytes;
use mini_moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Tuning for a [`PayloadCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_capacity: u64,
    /// Return the previously issued key for a repeated identical send.
    ///
    /// Sends match on the exact arguments, so `from: None` and an explicit
    /// local identity count as different sends.
    pub dedupe_sends: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: CacheConfig::DEFAULT_TTL,
            max_capacity: CacheConfig::DEFAULT_MAX_ENTRIES,
            dedupe_sends: true,
        }
    }
}

/// Hit and miss counters for a [`PayloadCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Receives answered from the cache.
    pub hits: u64,
    /// Receives that went to the backend.
    pub misses: u64,
    /// Sends answered with a previously issued key.
    pub deduplicated_sends: u64,
    /// Approximate; expired entries may still be counted until housekeeping.
    pub entries: u64,
}

/// A [`PayloadClient`] plus a per-instance TTL cache.
pub struct PayloadCache {
    client: PayloadClient,
    payloads: Cache<String, Bytes>,
    sends: Option<Cache<[u8; 32], PayloadKey>>,
    /// False over backends without stable keys.
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    deduplicated_sends: AtomicU64,
}

impl std::fmt::Debug for PayloadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCache")
            .field("client", &self.client)
            .field("stats", &self.stats())
            .finish()
    }
}

impl PayloadCache {
    pub fn new(client: PayloadClient) -> Self {
        Self::with_settings(client, CacheSettings::default())
    }

    pub fn with_settings(client: PayloadClient, settings: CacheSettings) -> Self {
        let payloads = Cache::builder()
            .time_to_live(settings.ttl)
            .max_capacity(settings.max_capacity)
            .build();
        let enabled = client.stable_keys();
        if !enabled {
            debug!("{} keys are not stable, caching disabled", client.backend_name());
        }
        let sends = (enabled && settings.dedupe_sends).then(|| {
            Cache::builder()
                .time_to_live(settings.ttl)
                .max_capacity(settings.max_capacity)
                .build()
        });

        Self {
            client,
            payloads,
            sends,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            deduplicated_sends: AtomicU64::new(0),
        }
    }

    /// The wrapped client.
    pub fn client(&self) -> &PayloadClient {
        &self.client
    }

    /// Whether receives can be answered from the cache.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn up_check(&self) -> Result<()> {
        self.client.up_check().await
    }

    /// Send through the client and remember the payload under its key.
    ///
    /// Backend errors are returned unchanged.
    pub async fn send(
        &self,
        payload: &[u8],
        from: Option<&Identity>,
        to: &[Identity],
    ) -> Result<PayloadKey> {
        let fingerprint = self.sends.as_ref().map(|_| fingerprint(payload, from, to));

        if let (Some(sends), Some(fp)) = (&self.sends, &fingerprint) {
            if let Some(key) = sends.get(fp) {
                if self.payloads.contains_key(&key.to_base64()) {
                    debug!("Duplicate send, reusing key {}", key);
                    self.deduplicated_sends.fetch_add(1, Ordering::Relaxed);
                    return Ok(key);
                }
            }
        }

        let key = self.client.send(payload, from, to).await?;

        if self.enabled && !key.is_empty() {
            self.insert_if_absent(&key, Bytes::copy_from_slice(payload));
        }
        if let (Some(sends), Some(fp)) = (&self.sends, fingerprint) {
            sends.insert(fp, key.clone());
        }
        Ok(key)
    }

    /// Fetch a payload, answering from the cache when possible.
    ///
    /// Returns empty bytes for an empty key, for a key the node has nothing
    /// under, and when the node cannot be reached (logged at `warn`).
    pub async fn receive(&self, key: &PayloadKey) -> Bytes {
        if key.is_empty() {
            return Bytes::new();
        }

        if !self.enabled {
            return match self.client.receive(key).await {
                Ok(payload) => payload.unwrap_or_default(),
                Err(e) => {
                    warn!("Receive of {} failed, returning empty payload: {}", key, e);
                    Bytes::new()
                }
            };
        }

        let cache_key = key.to_base64();
        if let Some(payload) = self.payloads.get(&cache_key) {
            debug!("Cache hit for {}", cache_key);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return payload;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match self.client.receive(key).await {
            Ok(Some(payload)) => self.insert_if_absent(key, payload),
            Ok(None) => {
                debug!("No payload for {}", cache_key);
                Bytes::new()
            }
            Err(e) => {
                warn!("Receive of {} failed, returning empty payload: {}", cache_key, e);
                Bytes::new()
            }
        }
    }

    /// Drop the entry for `key`, if any.
    pub fn invalidate(&self, key: &PayloadKey) {
        self.payloads.invalidate(&key.to_base64());
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.payloads.invalidate_all();
        if let Some(sends) = &self.sends {
            sends.invalidate_all();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            deduplicated_sends: self.deduplicated_sends.load(Ordering::Relaxed),
            entries: self.payloads.entry_count(),
        }
    }

    /// Insert unless a live entry exists; returns whichever payload is live.
    fn insert_if_absent(&self, key: &PayloadKey, payload: Bytes) -> Bytes {
        let cache_key = key.to_base64();
        if let Some(existing) = self.payloads.get(&cache_key) {
            return existing;
        }
        self.payloads.insert(cache_key, payload.clone());
        payload
    }
}

/// SHA-256 over a length-prefixed encoding of one send call.
fn fingerprint(payload: &[u8], from: Option<&Identity>, to: &[Identity]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    };
    field(payload);
    field(from.map(Identity::as_bytes).unwrap_or_default());
    for recipient in to {
        field(recipient.as_bytes());
    }
    hasher.finalize().into()
}
