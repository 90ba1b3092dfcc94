//! Identity and key value types shared by every backend.

use crate::{PtmError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::path::Path;

/// A public-key reference naming a sender or recipient.
///
/// Carried as raw bytes; text protocols see it as standard padded base64.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(Vec<u8>);

impl Identity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode an identity from its base64 text form.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Ok(Self(STANDARD.decode(encoded.trim())?))
    }

    /// Load an identity from a key file holding its base64 text form.
    ///
    /// Surrounding whitespace (including a trailing newline) is ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| PtmError::Identity {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Err(PtmError::Identity {
                path: path.to_path_buf(),
                message: "key file is empty".to_string(),
            });
        }
        Self::from_base64(trimmed).map_err(|e| PtmError::Identity {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.to_base64())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl From<Vec<u8>> for Identity {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Identity {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Retrieval key returned by a successful send.
///
/// Depending on the backend this is a content digest or an opaque token
/// issued by the node. Callers must treat it as opaque either way.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct PayloadKey(Vec<u8>);

impl PayloadKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        Ok(Self(STANDARD.decode(encoded.trim())?))
    }

    /// The string form of the key, used wherever a text key is needed.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadKey({})", self.to_base64())
    }
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl From<Vec<u8>> for PayloadKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for PayloadKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl AsRef<[u8]> for PayloadKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Join recipient identities into the comma-separated base64 header form.
pub(crate) fn join_recipients(to: &[Identity]) -> String {
    to.iter()
        .map(Identity::to_base64)
        .collect::<Vec<_>>()
        .join(",")
}
