//! Sabnzbd adapter.
//!
//! RPC-style API: everything goes to `/api` with a `mode` parameter, and
//! the URL builder appends `output=json` and `apikey=` to every request.
//! Sabnzbd reports bad API keys inside HTTP 200 bodies, so the adapter
//! inspects payloads and folds those into the uniform error taxonomy.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{AdapterError, AdapterResult};

use super::base::{AdapterCore, QueryParams, ServiceAdapter};
use super::types::{
    AdapterConfig, AdapterResponse, AuthType, SabnzbdQueue, ServiceKind, ServiceSettings,
};

pub mod codes {
    pub const INVALID_REQUEST: &str = "SABNZBD_INVALID_REQUEST";
    pub const INVALID_API_KEY: &str = "SABNZBD_INVALID_API_KEY";
    pub const FORBIDDEN: &str = "SABNZBD_FORBIDDEN";
    pub const NOT_FOUND: &str = "SABNZBD_NOT_FOUND";
    pub const RATE_LIMITED: &str = "SABNZBD_RATE_LIMITED";
    pub const SERVER_ERROR: &str = "SABNZBD_SERVER_ERROR";
    pub const API_ERROR: &str = "SABNZBD_API_ERROR";
    pub const HTTP_ERROR: &str = "SABNZBD_HTTP_ERROR";
}

pub struct SabnzbdAdapter {
    core: AdapterCore,
}

impl SabnzbdAdapter {
    pub fn new(config: AdapterConfig) -> AdapterResult<Self> {
        if !matches!(config.settings, ServiceSettings::Sabnzbd) {
            return Err(AdapterError::configuration(format!(
                "Sabnzbd adapter requires sabnzbd settings, got {:?}",
                config.settings
            )));
        }
        Ok(Self {
            core: AdapterCore::new(config)?,
        })
    }

    async fn call(&self, mode: &str, extra: &[(&str, String)]) -> AdapterResponse<Value> {
        let mut params = vec![("mode".to_string(), mode.to_string())];
        params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));
        self.get("/api", Some(&params)).await
    }

    pub async fn version(&self) -> AdapterResponse<Value> {
        self.call("version", &[]).await
    }

    pub async fn queue(&self) -> AdapterResponse<SabnzbdQueue> {
        let response = self.call("queue", &[]).await;
        // Unwrap the {"queue": {...}} envelope before decoding.
        match (response.success, response.data) {
            (true, Some(mut value)) => {
                let queue = value.get_mut("queue").map(Value::take).unwrap_or(value);
                AdapterResponse::ok(queue, response.metadata).decode()
            }
            (_, data) => AdapterResponse::<Value> {
                success: response.success,
                data,
                error: response.error,
                metadata: response.metadata,
            }
            .decode(),
        }
    }

    pub async fn history(&self, limit: u32) -> AdapterResponse<Value> {
        self.call("history", &[("limit", limit.to_string())]).await
    }

    pub async fn pause_queue(&self) -> AdapterResponse<Value> {
        self.call("pause", &[]).await
    }

    pub async fn resume_queue(&self) -> AdapterResponse<Value> {
        self.call("resume", &[]).await
    }
}

#[async_trait]
impl ServiceAdapter for SabnzbdAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Sabnzbd
    }

    fn name(&self) -> &str {
        "sabnzbd"
    }

    fn validate_config(&self, config: &AdapterConfig) -> AdapterResult<()> {
        match &config.auth {
            AuthType::ApiKey { key } if !key.trim().is_empty() => Ok(()),
            AuthType::ApiKey { .. } => {
                Err(AdapterError::configuration("Sabnzbd API key must not be empty"))
            }
            _ => Err(AdapterError::configuration(
                "Sabnzbd requires API key authentication",
            )),
        }
    }

    fn health_endpoint(&self) -> String {
        "/api?mode=version".to_string()
    }

    /// Always appends `output=json` and the API key as query parameters;
    /// Sabnzbd takes its credential in the query string, never a header.
    async fn build_url(&self, endpoint: &str, params: &QueryParams) -> AdapterResult<Url> {
        let config = self.core.config().await;
        let key = match &config.auth {
            AuthType::ApiKey { key } => key.clone(),
            _ => return Err(AdapterError::configuration("Sabnzbd requires an API key")),
        };
        let mut url = AdapterCore::compose_url(&config, endpoint, params)?;
        url.query_pairs_mut()
            .append_pair("output", "json")
            .append_pair("apikey", &key);
        Ok(url)
    }

    /// No auth headers: the key is part of the URL.
    async fn auth_headers(&self, _method: &reqwest::Method) -> AdapterResult<reqwest::header::HeaderMap> {
        self.core.default_auth_headers().await.map(|mut headers| {
            headers.remove("X-Api-Key");
            headers
        })
    }

    fn map_error(&self, status: u16, body: &str) -> AdapterError {
        let detail = body.trim();
        let (code, message) = match status {
            400 => (codes::INVALID_REQUEST, format!("Invalid request: {}", detail)),
            401 => (codes::INVALID_API_KEY, "Invalid Sabnzbd API key".to_string()),
            403 => (codes::FORBIDDEN, format!("Access denied: {}", detail)),
            404 => (codes::NOT_FOUND, format!("Not found: {}", detail)),
            429 => (codes::RATE_LIMITED, "Rate limited".to_string()),
            s if s >= 500 => (codes::SERVER_ERROR, format!("Sabnzbd error: {}", detail)),
            _ => (codes::HTTP_ERROR, format!("HTTP {}: {}", status, detail)),
        };
        AdapterError::new(code, message, AdapterError::status_is_retryable(status))
            .with_status(status)
    }

    /// Sabnzbd answers HTTP 200 with `{"status": false, "error": "..."}`
    /// on failures, including bad API keys.
    fn inspect_body(&self, body: &Value) -> Option<AdapterError> {
        let error = body.get("error").and_then(Value::as_str)?;
        let code = if error.to_lowercase().contains("api key") {
            codes::INVALID_API_KEY
        } else {
            codes::API_ERROR
        };
        Some(AdapterError::new(code, error.to_string(), false).with_status(200))
    }

    fn version_from_health(&self, data: &Value) -> Option<String> {
        data.get("version").and_then(Value::as_str).map(str::to_string)
    }
}
