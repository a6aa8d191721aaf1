//! Remote catalog access: error taxonomy, transport seam, and request pacing.

pub mod discogs;

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::config::CatalogConfig;

/// Failure taxonomy for catalog calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("no catalog token configured")]
    MissingCredential,
    #[error("catalog rejected the token: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("catalog returned status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Transient(_))
    }
}

/// Personal access token for the catalog. Passed explicitly to every call.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogToken(String);

impl CatalogToken {
    /// Rejects absent or blank tokens.
    pub fn new(token: impl Into<String>) -> Result<Self, CatalogError> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::MissingCredential);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn from_optional(token: Option<String>) -> Result<Self, CatalogError> {
        token.map_or(Err(CatalogError::MissingCredential), Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CatalogToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CatalogToken(***)")
    }
}

/// Delays that keep the client inside the remote request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacing {
    pub request_interval: Duration,
    pub page_interval: Duration,
    pub error_backoff: Duration,
    pub max_attempts: u32,
}

impl RequestPacing {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            request_interval: Duration::from_millis(config.request_interval_ms),
            page_interval: Duration::from_millis(config.page_interval_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// No waiting at all; used by tests and offline tooling.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            request_interval: Duration::ZERO,
            page_interval: Duration::ZERO,
            error_backoff: Duration::ZERO,
            max_attempts: 3,
        }
    }
}

/// Read-only JSON GET against the catalog API.
pub trait CatalogTransport {
    fn get_json(&self, path: &str, token: &CatalogToken) -> Result<Value, CatalogError>;
}
