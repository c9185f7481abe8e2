//! Uniform error contract for the adapter framework.
//!
//! Every failure that crosses the adapter boundary is an [`AdapterError`]:
//! a service-scoped code, a human-readable message, the originating HTTP
//! status when there was one, and a `retryable` flag the caller uses for
//! backoff decisions. Adapters never leak raw transport errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error codes shared across all services. Per-service vocabularies
/// (`DOCKER_*`, `PROXMOX_*`, `ARR_*`, `SABNZBD_*`) live with their adapters.
pub mod codes {
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const POLICY_VIOLATION: &str = "POLICY_VIOLATION";
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
}

/// The single error shape surfaced to callers.
///
/// Callers branch on `code` and `retryable`, never on transport details.
#[derive(thiserror::Error, Debug, Clone, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct AdapterError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub retryable: bool,
}

impl AdapterError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            http_status: None,
            retryable,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Missing/invalid credentials or malformed configuration. Surfaced at
    /// `initialize()`, never retryable.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(codes::CONFIGURATION_ERROR, message, false)
    }

    /// DNS failure, connection refused, TLS handshake failure. Retryable.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(codes::NETWORK_ERROR, message, true)
    }

    /// The per-request timeout elapsed. Retryable.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(codes::TIMEOUT, message, true)
    }

    /// The service answered but the body was not what the adapter expected.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_RESPONSE, message, false)
    }

    pub fn is_auth_failure(&self) -> bool {
        self.http_status == Some(401)
    }

    /// Whether an HTTP status is transient: 5xx, plus 408/429.
    pub fn status_is_retryable(status: u16) -> bool {
        status >= 500 || status == 408 || status == 429
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        let mapped = if err.is_timeout() {
            Self::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            Self::invalid_response(format!("Failed to decode response: {}", err))
        } else {
            Self::network(format!("Transport error: {}", err))
        };
        match err.status() {
            Some(status) => mapped.with_status(status.as_u16()),
            None => mapped,
        }
    }
}

/// Generic HTTP-status classification used as the base `map_error`
/// implementation; concrete adapters override with service vocabularies.
pub fn classify_status(status: u16, body: &str) -> AdapterError {
    let message = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body.trim())
    };
    let code = match status {
        401 => codes::UNAUTHORIZED,
        403 => codes::FORBIDDEN,
        404 => codes::NOT_FOUND,
        409 => codes::CONFLICT,
        429 => codes::RATE_LIMITED,
        s if s >= 500 => codes::SERVER_ERROR,
        _ => codes::HTTP_ERROR,
    };
    AdapterError::new(code, message, AdapterError::status_is_retryable(status)).with_status(status)
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;
