//! Error types for the provenance miner.

use provenance_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Error text fragments that identify a connectivity failure.
///
/// Matched case-insensitively against the full error chain.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "nameresolutionerror",
    "failed to resolve",
    "failed to lookup address",
    "dns error",
    "getaddrinfo failed",
    "connectionerror",
    "connection error",
    "connection refused",
    "connection reset",
    "error trying to connect",
    "network is unreachable",
];

/// Errors that can occur while mining.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Category classifier error: {0}")]
    Classifier(String),

    #[error("Network unreachable for longer than {0:?}")]
    OutageDeadline(Duration),
}

impl MinerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether the failure is a network outage worth waiting out.
    pub fn is_transient(&self) -> bool {
        match self {
            MinerError::Transport(_) => true,
            MinerError::NotFound(_)
            | MinerError::Unauthorized(_)
            | MinerError::Config(_)
            | MinerError::Store(_)
            | MinerError::RateLimited { .. }
            | MinerError::OutageDeadline(_) => false,
            other => matches_transient_signature(&other.to_string()),
        }
    }

    /// Everything that is neither transient nor a rate limit.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient() && !matches!(self, MinerError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for MinerError {
    fn from(err: reqwest::Error) -> Self {
        let chain = error_chain(&err);
        if err.is_connect() || err.is_timeout() || matches_transient_signature(&chain) {
            MinerError::Transport(chain)
        } else if err.is_decode() {
            MinerError::Decode(chain)
        } else if err.is_builder() {
            MinerError::Config(chain)
        } else if let Some(status) = err.status() {
            MinerError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                body: chain,
            }
        } else {
            // Redirect loops, body and request errors: no network signature.
            MinerError::Request(chain)
        }
    }
}

/// Whether `text` carries one of the connectivity failure signatures.
pub fn matches_transient_signature(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// Result type alias for mining operations.
pub type MinerResult<T> = Result<T, MinerError>;
