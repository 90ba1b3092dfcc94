//! The capability set every transport backend implements.

use crate::types::{Identity, PayloadKey};
use crate::Result;
use bytes::Bytes;

/// Send / receive / health-check against one privacy manager.
///
/// Implementations must be safe to call concurrently from many tasks.
#[async_trait::async_trait]
pub trait PayloadBackend: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether a key keeps naming the same payload for as long as the node
    /// holds it. Callers may only cache receives from backends where it does.
    fn stable_keys(&self) -> bool {
        true
    }

    /// Lightweight health probe. Never mutates node state.
    async fn up_check(&self) -> Result<()>;

    /// Deliver `payload` from `from` (`None` or empty means the local
    /// identity) to `to`, returning the key it can be fetched back with.
    async fn send(
        &self,
        payload: &[u8],
        from: Option<&Identity>,
        to: &[Identity],
    ) -> Result<PayloadKey>;

    /// Fetch the payload addressed by `key` for the local identity.
    ///
    /// `Ok(None)` means the node has nothing for us under that key, either
    /// because we are not a recipient or because the key is unknown.
    async fn receive(&self, key: &PayloadKey) -> Result<Option<Bytes>>;
}

/// Pick the explicit sender, falling back to the local identity.
pub(crate) fn sender_or<'a>(from: Option<&'a Identity>, local: &'a Identity) -> &'a Identity {
    match from {
        Some(id) if !id.is_empty() => id,
        _ => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_defaults_to_local() {
        let local = Identity::new(b"local".to_vec());
        let other = Identity::new(b"other".to_vec());
        let empty = Identity::default();

        assert_eq!(sender_or(None, &local), &local);
        assert_eq!(sender_or(Some(&empty), &local), &local);
        assert_eq!(sender_or(Some(&other), &local), &other);
    }
}
