//! Proxmox VE API adapter.
//!
//! Authentication is ticket-based: a form POST to `/access/ticket`
//! yields a session cookie (`PVEAuthCookie`) and a CSRF token that must
//! accompany mutating requests. The ticket is cached for a bounded
//! lifetime (2 hours by default) and refreshed under a single-flight
//! lock: concurrent callers that all observe a stale ticket coalesce
//! into one re-authentication.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AdapterError, AdapterResult};

use super::base::{AdapterCore, QueryParams, ServiceAdapter};
use super::types::{
    AdapterConfig, AdapterResponse, AuthType, ProxmoxGuest, ProxmoxNode, ServiceKind,
    ServiceSettings,
};

pub mod codes {
    pub const AUTH_FAILED: &str = "PROXMOX_AUTH_FAILED";
    pub const FORBIDDEN: &str = "PROXMOX_FORBIDDEN";
    pub const NOT_FOUND: &str = "PROXMOX_NOT_FOUND";
    pub const BAD_REQUEST: &str = "PROXMOX_BAD_REQUEST";
    pub const SERVER_ERROR: &str = "PROXMOX_SERVER_ERROR";
    pub const RATE_LIMITED: &str = "PROXMOX_RATE_LIMITED";
    pub const HTTP_ERROR: &str = "PROXMOX_HTTP_ERROR";
}

const API_PREFIX: &str = "/api2/json";

/// Time-bounded session credential pair cached on the adapter.
#[derive(Debug, Clone)]
pub struct ProxmoxTicket {
    pub ticket: String,
    pub csrf_token: String,
    pub issued_at: DateTime<Utc>,
}

impl ProxmoxTicket {
    fn is_fresh(&self, lifetime_seconds: u64) -> bool {
        Utc::now() - self.issued_at < ChronoDuration::seconds(lifetime_seconds as i64)
    }
}

pub struct ProxmoxAdapter {
    core: AdapterCore,
    ticket_lifetime_seconds: u64,
    /// `None` = no session. Holding this lock across the refresh await is
    /// what makes the refresh single-flight: losers of the race re-check
    /// freshness under the lock and reuse the new ticket.
    session: Mutex<Option<ProxmoxTicket>>,
}

impl ProxmoxAdapter {
    pub fn new(config: AdapterConfig) -> AdapterResult<Self> {
        let ticket_lifetime_seconds = match &config.settings {
            ServiceSettings::Proxmox {
                ticket_lifetime_seconds,
            } => *ticket_lifetime_seconds,
            other => {
                return Err(AdapterError::configuration(format!(
                    "Proxmox adapter requires proxmox settings, got {:?}",
                    other
                )))
            }
        };
        Ok(Self {
            core: AdapterCore::new(config)?,
            ticket_lifetime_seconds,
            session: Mutex::new(None),
        })
    }

    /// Return a fresh ticket, re-authenticating at most once across all
    /// concurrent callers.
    async fn ensure_ticket(&self) -> AdapterResult<ProxmoxTicket> {
        let mut session = self.session.lock().await;
        if let Some(ticket) = session.as_ref() {
            if ticket.is_fresh(self.ticket_lifetime_seconds) {
                return Ok(ticket.clone());
            }
            debug!("🎫 Proxmox ticket expired, re-authenticating");
        }
        let ticket = self.authenticate().await?;
        *session = Some(ticket.clone());
        Ok(ticket)
    }

    /// Exchange username/password/realm for a ticket + CSRF token via
    /// `POST /access/ticket`. Errors here are authentication failures;
    /// nothing is cached on failure.
    pub async fn authenticate(&self) -> AdapterResult<ProxmoxTicket> {
        let config = self.core.config().await;
        let (username, password, realm) = match &config.auth {
            AuthType::Ticket {
                username,
                password,
                realm,
            } => (username.clone(), password.clone(), realm.clone()),
            _ => {
                return Err(AdapterError::configuration(
                    "Proxmox adapter requires ticket credentials (username/password/realm)",
                ))
            }
        };

        let url = AdapterCore::compose_url(
            &config,
            &format!("{}/access/ticket", API_PREFIX),
            &[],
        )?;
        let client = self.core.http_client().await;
        let form = [
            ("username", format!("{}@{}", username, realm)),
            ("password", password),
        ];

        debug!("🎫 Authenticating against {}", url);
        let response = client
            .post(url)
            .timeout(config.timeout())
            .form(&form)
            .send()
            .await
            .map_err(AdapterError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("❌ Proxmox authentication rejected with HTTP {}", status);
            return Err(AdapterError::new(
                codes::AUTH_FAILED,
                format!("Proxmox authentication failed (HTTP {}): {}", status, body.trim()),
                false,
            )
            .with_status(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(AdapterError::from)?;
        let data = &body["data"];
        let ticket = data
            .get("ticket")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::invalid_response("Ticket missing from auth response"))?;
        let csrf_token = data
            .get("CSRFPreventionToken")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::invalid_response("CSRFPreventionToken missing from auth response")
            })?;

        info!("🎫 Proxmox ticket issued for {}@{}", username, realm);
        Ok(ProxmoxTicket {
            ticket: ticket.to_string(),
            csrf_token: csrf_token.to_string(),
            issued_at: Utc::now(),
        })
    }

    /// Proxmox wraps every payload in `{"data": ...}`; unwrap it so
    /// domain operations decode the payload itself.
    fn unwrap_data(response: AdapterResponse<Value>) -> AdapterResponse<Value> {
        match (response.success, response.data) {
            (true, Some(mut value)) => {
                let data = value
                    .get_mut("data")
                    .map(Value::take)
                    .unwrap_or(value);
                AdapterResponse::ok(data, response.metadata)
            }
            (_, data) => AdapterResponse {
                success: response.success,
                data,
                error: response.error,
                metadata: response.metadata,
            },
        }
    }

    pub async fn version(&self) -> AdapterResponse<Value> {
        Self::unwrap_data(self.get("/version", None).await)
    }

    pub async fn list_nodes(&self) -> AdapterResponse<Vec<ProxmoxNode>> {
        Self::unwrap_data(self.get("/nodes", None).await).decode()
    }

    pub async fn node_status(&self, node: &str) -> AdapterResponse<Value> {
        let endpoint = format!("/nodes/{}/status", urlencoding::encode(node));
        Self::unwrap_data(self.get(&endpoint, None).await)
    }

    pub async fn list_qemu(&self, node: &str) -> AdapterResponse<Vec<ProxmoxGuest>> {
        let endpoint = format!("/nodes/{}/qemu", urlencoding::encode(node));
        Self::unwrap_data(self.get(&endpoint, None).await).decode()
    }

    pub async fn list_lxc(&self, node: &str) -> AdapterResponse<Vec<ProxmoxGuest>> {
        let endpoint = format!("/nodes/{}/lxc", urlencoding::encode(node));
        Self::unwrap_data(self.get(&endpoint, None).await).decode()
    }

    pub async fn vm_status(&self, node: &str, vmid: u32) -> AdapterResponse<Value> {
        let endpoint = format!(
            "/nodes/{}/qemu/{}/status/current",
            urlencoding::encode(node),
            vmid
        );
        Self::unwrap_data(self.get(&endpoint, None).await)
    }

    /// Start a VM; returns the task UPID Proxmox spawned for it.
    pub async fn start_vm(&self, node: &str, vmid: u32) -> AdapterResponse<Value> {
        self.vm_power(node, vmid, "start").await
    }

    pub async fn stop_vm(&self, node: &str, vmid: u32) -> AdapterResponse<Value> {
        self.vm_power(node, vmid, "stop").await
    }

    pub async fn shutdown_vm(&self, node: &str, vmid: u32) -> AdapterResponse<Value> {
        self.vm_power(node, vmid, "shutdown").await
    }

    async fn vm_power(&self, node: &str, vmid: u32, action: &str) -> AdapterResponse<Value> {
        let endpoint = format!(
            "/nodes/{}/qemu/{}/status/{}",
            urlencoding::encode(node),
            vmid,
            action
        );
        Self::unwrap_data(self.post(&endpoint, None, None).await)
    }

    #[cfg(test)]
    pub(crate) async fn cached_ticket(&self) -> Option<ProxmoxTicket> {
        self.session.lock().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn seed_ticket(&self, ticket: ProxmoxTicket) {
        *self.session.lock().await = Some(ticket);
    }
}

#[async_trait]
impl ServiceAdapter for ProxmoxAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Proxmox
    }

    fn name(&self) -> &str {
        "proxmox"
    }

    fn validate_config(&self, config: &AdapterConfig) -> AdapterResult<()> {
        if !matches!(config.settings, ServiceSettings::Proxmox { .. }) {
            return Err(AdapterError::configuration(
                "Proxmox adapter requires proxmox settings",
            ));
        }
        match &config.auth {
            AuthType::Ticket {
                username, password, ..
            } => {
                if username.trim().is_empty() || password.is_empty() {
                    return Err(AdapterError::configuration(
                        "Proxmox username and password must not be empty",
                    ));
                }
                Ok(())
            }
            _ => Err(AdapterError::configuration(
                "Proxmox adapter requires ticket credentials",
            )),
        }
    }

    fn health_endpoint(&self) -> String {
        "/version".to_string()
    }

    /// Path-based REST under `/api2/json`.
    async fn build_url(&self, endpoint: &str, params: &QueryParams) -> AdapterResult<Url> {
        let path = if endpoint.trim_start_matches('/').starts_with("api2/") {
            endpoint.to_string()
        } else {
            format!("{}/{}", API_PREFIX, endpoint.trim_start_matches('/'))
        };
        self.core.build_url(&path, params).await
    }

    /// Ticket cookie on every request; CSRF token only on mutating verbs.
    async fn auth_headers(&self, method: &Method) -> AdapterResult<HeaderMap> {
        let mut headers = self.core.default_auth_headers().await?;
        let ticket = self.ensure_ticket().await?;
        headers.insert(
            reqwest::header::COOKIE,
            reqwest::header::HeaderValue::from_str(&format!("PVEAuthCookie={}", ticket.ticket))
                .map_err(|e| AdapterError::configuration(format!("Invalid ticket value: {}", e)))?,
        );
        if matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        ) {
            headers.insert(
                "CSRFPreventionToken",
                reqwest::header::HeaderValue::from_str(&ticket.csrf_token).map_err(|e| {
                    AdapterError::configuration(format!("Invalid CSRF token value: {}", e))
                })?,
            );
        }
        Ok(headers)
    }

    fn map_error(&self, status: u16, body: &str) -> AdapterError {
        let detail = body.trim();
        let (code, message) = match status {
            400 => (codes::BAD_REQUEST, format!("Invalid request: {}", detail)),
            401 => (
                codes::AUTH_FAILED,
                "Proxmox session rejected; ticket cleared for re-authentication".to_string(),
            ),
            403 => (
                codes::FORBIDDEN,
                format!("Insufficient privileges: {}", detail),
            ),
            404 => (codes::NOT_FOUND, format!("Not found: {}", detail)),
            429 => (codes::RATE_LIMITED, "Proxmox rate limit".to_string()),
            s if s >= 500 => (codes::SERVER_ERROR, format!("Proxmox error: {}", detail)),
            _ => (codes::HTTP_ERROR, format!("HTTP {}: {}", status, detail)),
        };
        AdapterError::new(code, message, AdapterError::status_is_retryable(status))
            .with_status(status)
    }

    /// Refresh the ticket before the request goes out; `connect()` routes
    /// through here, so a stale or missing ticket triggers exactly one
    /// authentication even under concurrent connects.
    async fn before_request(&self) -> AdapterResult<()> {
        self.ensure_ticket().await.map(|_| ())
    }

    /// A 401 means the cached ticket is bad regardless of age; drop it so
    /// the next attempt re-authenticates instead of reusing it.
    async fn on_unauthorized(&self) {
        warn!("🎫 Proxmox ticket invalidated by 401");
        *self.session.lock().await = None;
    }

    async fn disconnect(&self) {
        *self.session.lock().await = None;
        self.core.reset_state().await;
        debug!("🔌 proxmox adapter disconnected, session cleared");
    }

    fn version_from_health(&self, data: &Value) -> Option<String> {
        // Health responses arrive still wrapped in the "data" envelope.
        data.pointer("/data/version")
            .or_else(|| data.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
