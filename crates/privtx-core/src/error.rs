//! Error types for the privtx client.
//!
//! Every backend reports failures through [`PtmError`] so that callers see the
//! same classification regardless of which transport is active.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the privtx client.
#[derive(Debug, Error)]
pub enum PtmError {
    // Connectivity errors
    #[error("Node unreachable at {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    // Protocol errors
    #[error(
        "Node rejected {operation}{}: {message}",
        .status.map(|s| format!(" (status {s})")).unwrap_or_default()
    )]
    Rejected {
        operation: String,
        /// HTTP status code or RPC error code, when the node supplied one.
        status: Option<i32>,
        message: String,
    },

    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Invalid RPC frame: {message}")]
    InvalidFrame { message: String },

    // Construction errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to load identity from {path:?}: {message}")]
    Identity { path: PathBuf, message: String },

    #[error("Failed to launch node command {command}: {message}")]
    LaunchFailed { command: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for privtx operations.
pub type Result<T> = std::result::Result<T, PtmError>;

impl From<std::io::Error> for PtmError {
    fn from(err: std::io::Error) -> Self {
        PtmError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PtmError {
    fn from(err: serde_json::Error) -> Self {
        PtmError::Encoding {
            message: format!("json: {}", err),
        }
    }
}

impl From<base64::DecodeError> for PtmError {
    fn from(err: base64::DecodeError) -> Self {
        PtmError::Encoding {
            message: format!("base64: {}", err),
        }
    }
}

impl From<bincode::Error> for PtmError {
    fn from(err: bincode::Error) -> Self {
        PtmError::Encoding {
            message: format!("bincode: {}", err),
        }
    }
}

impl PtmError {
    /// RPC error code for a rejected operation.
    pub const RPC_REJECTED: i32 = -32000;
    /// RPC error code for malformed requests.
    pub const RPC_INVALID_REQUEST: i32 = -32600;
    /// RPC error code for everything else.
    pub const RPC_INTERNAL: i32 = -32603;

    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PtmError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Classify a `reqwest` failure against the endpoint it was sent to.
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            PtmError::Timeout {
                operation: format!("request to {}", endpoint),
                after: timeout,
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            PtmError::Unreachable {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            PtmError::Encoding {
                message: err.to_string(),
            }
        }
    }

    /// Classify a failure while reading a response body.
    ///
    /// The status line already arrived, so anything but a timeout means the
    /// channel broke mid-response.
    pub fn from_reqwest_body(err: reqwest::Error, endpoint: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Self::from_reqwest(err, endpoint, timeout);
        }
        PtmError::Unreachable {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the error came from failing to reach the node at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, PtmError::Unreachable { .. } | PtmError::Timeout { .. })
    }

    /// Check if this error looks retryable to a caller.
    ///
    /// The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        self.is_connectivity()
    }

    /// Convert to the error code carried in an RPC `Error` response.
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            PtmError::Rejected { status: Some(code), .. } => *code,
            PtmError::Rejected { .. } => Self::RPC_REJECTED,
            PtmError::Encoding { .. } | PtmError::InvalidFrame { .. } => {
                Self::RPC_INVALID_REQUEST
            }
            _ => Self::RPC_INTERNAL,
        }
    }
}
