//! Radarr/Sonarr adapter.
//!
//! Both applications share the `/api/v3` surface and authenticate with a
//! static API key delivered in the `X-Api-Key` header. Which header vs.
//! query delivery a service uses is a documented per-service constant:
//! the Arr family uses the header, Sabnzbd uses a query parameter.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::error::{AdapterError, AdapterResult};

use super::base::{AdapterCore, QueryParams, ServiceAdapter};
use super::types::{
    AdapterConfig, AdapterResponse, ArrApp, ArrQueue, ArrSystemStatus, AuthType, ServiceKind,
    ServiceSettings,
};

pub mod codes {
    pub const INVALID_REQUEST: &str = "ARR_INVALID_REQUEST";
    pub const INVALID_API_KEY: &str = "ARR_INVALID_API_KEY";
    pub const FORBIDDEN: &str = "ARR_FORBIDDEN";
    pub const NOT_FOUND: &str = "ARR_NOT_FOUND";
    pub const RATE_LIMITED: &str = "ARR_RATE_LIMITED";
    pub const SERVER_ERROR: &str = "ARR_SERVER_ERROR";
    pub const HTTP_ERROR: &str = "ARR_HTTP_ERROR";
}

const API_PREFIX: &str = "/api/v3";

pub struct ArrAdapter {
    core: AdapterCore,
    app: ArrApp,
}

impl ArrAdapter {
    pub fn new(config: AdapterConfig) -> AdapterResult<Self> {
        let app = match &config.settings {
            ServiceSettings::Arr { application } => *application,
            other => {
                return Err(AdapterError::configuration(format!(
                    "Arr adapter requires arr settings, got {:?}",
                    other
                )))
            }
        };
        Ok(Self {
            core: AdapterCore::new(config)?,
            app,
        })
    }

    pub fn app(&self) -> ArrApp {
        self.app
    }

    pub async fn system_status(&self) -> AdapterResponse<ArrSystemStatus> {
        self.get("/system/status", None).await.decode()
    }

    /// The service's own health report (`/health` returns a list of
    /// warnings/errors the application knows about itself).
    pub async fn service_health(&self) -> AdapterResponse<Value> {
        self.get("/health", None).await
    }

    pub async fn queue(&self, page_size: u32) -> AdapterResponse<ArrQueue> {
        let params = vec![("pageSize".to_string(), page_size.to_string())];
        self.get("/queue", Some(&params)).await.decode()
    }

    pub async fn calendar(&self, start: &str, end: &str) -> AdapterResponse<Value> {
        let params = vec![
            ("start".to_string(), start.to_string()),
            ("end".to_string(), end.to_string()),
        ];
        self.get("/calendar", Some(&params)).await
    }

    /// Queue a command by name (e.g. `RssSync`, `RefreshMovie`).
    pub async fn command(&self, name: &str) -> AdapterResponse<Value> {
        self.post("/command", Some(json!({ "name": name })), None).await
    }
}

#[async_trait]
impl ServiceAdapter for ArrAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn kind(&self) -> ServiceKind {
        match self.app {
            ArrApp::Radarr => ServiceKind::Radarr,
            ArrApp::Sonarr => ServiceKind::Sonarr,
        }
    }

    fn name(&self) -> &str {
        self.app.name()
    }

    fn validate_config(&self, config: &AdapterConfig) -> AdapterResult<()> {
        if !matches!(config.settings, ServiceSettings::Arr { .. }) {
            return Err(AdapterError::configuration("Arr adapter requires arr settings"));
        }
        match &config.auth {
            AuthType::ApiKey { key } if !key.trim().is_empty() => Ok(()),
            AuthType::ApiKey { .. } => Err(AdapterError::configuration(format!(
                "{} API key must not be empty",
                self.app.name()
            ))),
            _ => Err(AdapterError::configuration(format!(
                "{} requires API key authentication",
                self.app.name()
            ))),
        }
    }

    fn health_endpoint(&self) -> String {
        "/system/status".to_string()
    }

    async fn build_url(&self, endpoint: &str, params: &QueryParams) -> AdapterResult<Url> {
        let path = if endpoint.trim_start_matches('/').starts_with("api/") {
            endpoint.to_string()
        } else {
            format!("{}/{}", API_PREFIX, endpoint.trim_start_matches('/'))
        };
        self.core.build_url(&path, params).await
    }

    fn map_error(&self, status: u16, body: &str) -> AdapterError {
        let detail = body.trim();
        let (code, message) = match status {
            400 => (
                codes::INVALID_REQUEST,
                format!("Invalid request: {}", detail),
            ),
            401 => (
                codes::INVALID_API_KEY,
                format!("Invalid {} API key", self.app.name()),
            ),
            403 => (codes::FORBIDDEN, format!("Access denied: {}", detail)),
            404 => (codes::NOT_FOUND, format!("Not found: {}", detail)),
            429 => (codes::RATE_LIMITED, "Rate limited".to_string()),
            s if s >= 500 => (
                codes::SERVER_ERROR,
                format!("{} error: {}", self.app.name(), detail),
            ),
            _ => (codes::HTTP_ERROR, format!("HTTP {}: {}", status, detail)),
        };
        AdapterError::new(code, message, AdapterError::status_is_retryable(status))
            .with_status(status)
    }
}
