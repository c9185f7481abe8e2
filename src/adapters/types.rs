//! Shared data contracts all adapters and callers agree on.
//!
//! `AdapterConfig` is materialized by the persistence collaborator from a
//! decrypted service record; everything else here is produced by adapters
//! and consumed by route handlers or the health-check scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::AdapterError;

/// How the adapter authenticates against its service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthType {
    None,
    /// Static API key; delivery (header vs. query parameter) is a
    /// per-service documented constant, not a shared convention.
    ApiKey { key: String },
    Basic { username: String, password: String },
    Bearer { token: String },
    /// Proxmox-style ticket auth: exchanged for a session cookie + CSRF
    /// token via the service's login endpoint.
    Ticket {
        username: String,
        password: String,
        realm: String,
    },
}

/// Which Arr-family application an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrApp {
    Radarr,
    Sonarr,
}

impl ArrApp {
    pub fn name(&self) -> &'static str {
        match self {
            ArrApp::Radarr => "radarr",
            ArrApp::Sonarr => "sonarr",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ArrApp::Radarr => 7878,
            ArrApp::Sonarr => 8989,
        }
    }
}

fn default_docker_api_version() -> String {
    "v1.43".to_string()
}

fn default_ticket_lifetime_seconds() -> u64 {
    2 * 60 * 60
}

/// Per-service settings, decoded once at adapter construction. Replaces
/// the stringly-typed `serviceConfig` bag with a tagged union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "lowercase")]
pub enum ServiceSettings {
    Docker {
        #[serde(default = "default_docker_api_version")]
        api_version: String,
    },
    Proxmox {
        #[serde(default = "default_ticket_lifetime_seconds")]
        ticket_lifetime_seconds: u64,
    },
    Arr { application: ArrApp },
    Sabnzbd,
}

/// Typed configuration bag describing how to reach and authenticate
/// against one service instance. Owned exclusively by its adapter;
/// replaced wholesale through `update_config`, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Host name or address, without scheme.
    pub base_url: String,
    pub port: Option<u16>,
    pub use_ssl: bool,
    /// Defaults to `false` for Docker: home-lab daemons routinely run with
    /// self-signed certificates, and hardening this silently would change
    /// observable behavior.
    pub verify_ssl: bool,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub auth: AuthType,
    /// Static headers merged into every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Combined client certificate + private key, PEM-encoded, for mutual
    /// TLS against daemons that require it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_identity_pem: Option<String>,
    pub settings: ServiceSettings,
}

impl AdapterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Docker defaults: API v1.43, TLS verification off (self-signed
    /// daemon certificates are the norm in home labs).
    pub fn docker_default(host: impl Into<String>) -> Self {
        Self {
            base_url: host.into(),
            port: Some(2375),
            use_ssl: false,
            verify_ssl: false,
            timeout_seconds: 30,
            max_retries: 3,
            auth: AuthType::None,
            headers: HashMap::new(),
            client_identity_pem: None,
            settings: ServiceSettings::Docker {
                api_version: default_docker_api_version(),
            },
        }
    }

    pub fn proxmox_default(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: host.into(),
            port: Some(8006),
            use_ssl: true,
            verify_ssl: false,
            timeout_seconds: 30,
            max_retries: 3,
            auth: AuthType::Ticket {
                username: username.into(),
                password: password.into(),
                realm: "pam".to_string(),
            },
            headers: HashMap::new(),
            client_identity_pem: None,
            settings: ServiceSettings::Proxmox {
                ticket_lifetime_seconds: default_ticket_lifetime_seconds(),
            },
        }
    }

    pub fn arr_default(host: impl Into<String>, app: ArrApp, api_key: impl Into<String>) -> Self {
        Self {
            base_url: host.into(),
            port: Some(app.default_port()),
            use_ssl: false,
            verify_ssl: true,
            timeout_seconds: 30,
            max_retries: 3,
            auth: AuthType::ApiKey { key: api_key.into() },
            headers: HashMap::new(),
            client_identity_pem: None,
            settings: ServiceSettings::Arr { application: app },
        }
    }

    pub fn sabnzbd_default(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: host.into(),
            port: Some(8080),
            use_ssl: false,
            verify_ssl: true,
            timeout_seconds: 30,
            max_retries: 3,
            auth: AuthType::ApiKey { key: api_key.into() },
            headers: HashMap::new(),
            client_identity_pem: None,
            settings: ServiceSettings::Sabnzbd,
        }
    }
}

/// Per-adapter connectivity snapshot. Always replaced as a whole, never
/// mutated field-by-field, so concurrent requests cannot observe a
/// half-updated record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub last_connection_attempt: Option<DateTime<Utc>>,
    pub connection_error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ConnectionState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            is_connected: false,
            last_connection_attempt: None,
            connection_error: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// Snapshot after a successful request: connected, counters cleared.
    pub fn connected(&self) -> Self {
        Self {
            is_connected: true,
            last_connection_attempt: Some(Utc::now()),
            connection_error: None,
            retry_count: 0,
            max_retries: self.max_retries,
        }
    }

    /// Snapshot after a failed request.
    pub fn failed(&self, error: &AdapterError) -> Self {
        Self {
            is_connected: false,
            last_connection_attempt: Some(Utc::now()),
            connection_error: Some(error.to_string()),
            retry_count: self.retry_count.saturating_add(1),
            max_retries: self.max_retries,
        }
    }
}

/// Metadata stamped on every adapter response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub response_time_ms: u64,
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,
}

impl ResponseMetadata {
    pub fn new(endpoint: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            response_time_ms,
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            endpoint: endpoint.into(),
            service_version: None,
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.service_version = version;
        self
    }
}

/// The uniform result of every adapter call. `success == false` iff
/// `error` is present and `data` absent; adapters never throw across
/// this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AdapterError>,
    pub metadata: ResponseMetadata,
}

impl<T> AdapterResponse<T> {
    pub fn ok(data: T, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub fn fail(error: AdapterError, metadata: ResponseMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata,
        }
    }
}

impl AdapterResponse<Value> {
    /// Decode the raw JSON payload into a typed domain model. A decode
    /// failure becomes an `INVALID_RESPONSE` error response, preserving
    /// the never-throw contract.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> AdapterResponse<T> {
        let metadata = self.metadata;
        match (self.success, self.data) {
            (true, Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(data) => AdapterResponse::ok(data, metadata),
                Err(e) => AdapterResponse::fail(
                    AdapterError::invalid_response(format!("Unexpected response shape: {}", e)),
                    metadata,
                ),
            },
            (_, _) => AdapterResponse {
                success: false,
                data: None,
                error: Some(self.error.unwrap_or_else(|| {
                    AdapterError::invalid_response("Response carried no payload")
                })),
                metadata,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Ephemeral health probe result; persistence and broadcast belong to the
/// external scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The services this crate can adapt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Docker,
    Proxmox,
    Radarr,
    Sonarr,
    Sabnzbd,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Docker => write!(f, "docker"),
            ServiceKind::Proxmox => write!(f, "proxmox"),
            ServiceKind::Radarr => write!(f, "radarr"),
            ServiceKind::Sonarr => write!(f, "sonarr"),
            ServiceKind::Sabnzbd => write!(f, "sabnzbd"),
        }
    }
}

// --- Typed domain models -------------------------------------------------

/// One entry from Docker's `GET /containers/json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub status: String,
    #[serde(default)]
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerVersion {
    pub version: String,
    pub api_version: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

/// One entry from Docker's `GET /images/json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub created: i64,
}

/// One node from Proxmox's `GET /api2/json/nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxNode {
    pub node: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxcpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxmem: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
}

/// One guest from `GET /api2/json/nodes/{node}/qemu` (or `/lxc`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxGuest {
    pub vmid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxmem: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
}

/// Arr-family `GET /api/v3/system/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrSystemStatus {
    #[serde(default)]
    pub app_name: Option<String>,
    pub version: String,
    #[serde(default)]
    pub os_name: Option<String>,
}

/// One record from the Arr-family paged `GET /api/v3/queue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrQueueRecord {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub status: String,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub sizeleft: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrQueue {
    pub page: u32,
    pub page_size: u32,
    pub total_records: u64,
    #[serde(default)]
    pub records: Vec<ArrQueueRecord>,
}

/// Sabnzbd queue, unwrapped from the `{"queue": {...}}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SabnzbdQueue {
    pub paused: bool,
    #[serde(default)]
    pub speed: String,
    #[serde(default)]
    pub sizeleft: String,
    #[serde(default)]
    pub slots: Vec<SabnzbdSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SabnzbdSlot {
    pub nzo_id: String,
    #[serde(default)]
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub percentage: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_snapshots() {
        let state = ConnectionState::new(3);
        assert!(!state.is_connected);
        assert_eq!(state.retry_count, 0);

        let failed = state.failed(&AdapterError::network("refused"));
        assert!(!failed.is_connected);
        assert_eq!(failed.retry_count, 1);
        assert!(failed.connection_error.is_some());
        assert!(failed.last_connection_attempt.is_some());

        let recovered = failed.connected();
        assert!(recovered.is_connected);
        assert_eq!(recovered.retry_count, 0);
        assert!(recovered.connection_error.is_none());
        assert_eq!(recovered.max_retries, 3);
    }

    #[test]
    fn response_invariant_holds() {
        let meta = ResponseMetadata::new("/version", 12);
        let ok: AdapterResponse<i32> = AdapterResponse::ok(7, meta.clone());
        assert!(ok.success && ok.data.is_some() && ok.error.is_none());

        let fail: AdapterResponse<i32> =
            AdapterResponse::fail(AdapterError::network("down"), meta);
        assert!(!fail.success && fail.data.is_none() && fail.error.is_some());
    }

    #[test]
    fn decode_maps_payload_and_preserves_errors() {
        let meta = ResponseMetadata::new("/containers/json", 5);
        let raw = AdapterResponse::ok(
            serde_json::json!([{"Id": "abc", "Image": "nginx", "State": "running", "Status": "Up 2 hours"}]),
            meta.clone(),
        );
        let typed: AdapterResponse<Vec<ContainerSummary>> = raw.decode();
        assert!(typed.success);
        assert_eq!(typed.data.unwrap()[0].id, "abc");

        let bad = AdapterResponse::ok(serde_json::json!({"not": "an array"}), meta.clone());
        let typed: AdapterResponse<Vec<ContainerSummary>> = bad.decode();
        assert!(!typed.success);
        assert_eq!(typed.error.unwrap().code, crate::error::codes::INVALID_RESPONSE);

        let failed = AdapterResponse::fail(AdapterError::network("down"), meta);
        let typed: AdapterResponse<Vec<ContainerSummary>> = failed.decode();
        assert!(!typed.success);
        assert_eq!(typed.error.unwrap().code, crate::error::codes::NETWORK_ERROR);
    }

    #[test]
    fn service_settings_round_trip() {
        let settings = ServiceSettings::Arr {
            application: ArrApp::Sonarr,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"service\":\"arr\""));
        let back: ServiceSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);

        let docker: ServiceSettings = serde_json::from_str(r#"{"service":"docker"}"#).unwrap();
        assert_eq!(
            docker,
            ServiceSettings::Docker {
                api_version: "v1.43".to_string()
            }
        );
    }

    #[test]
    fn docker_defaults_preserve_lab_tls_tradeoff() {
        let config = AdapterConfig::docker_default("docker.local");
        assert!(!config.verify_ssl);
        assert_eq!(config.port, Some(2375));
        assert_eq!(
            config.settings,
            ServiceSettings::Docker {
                api_version: "v1.43".to_string()
            }
        );
    }
}
