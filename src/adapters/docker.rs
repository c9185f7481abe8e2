//! Docker Engine API adapter.
//!
//! Read-only by policy: every request clears the [`DockerRequestPolicy`]
//! allowlist before it is built, and all paths are prefixed with the
//! configured API version segment (default `v1.43`).

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::error::{AdapterError, AdapterResult};
use crate::policy::docker::DockerRequestPolicy;
use crate::policy::PolicyViolation;

use super::base::{AdapterCore, QueryParams, ServiceAdapter};
use super::types::{
    AdapterConfig, AdapterResponse, ContainerSummary, DockerVersion, ImageSummary,
    ServiceKind, ServiceSettings,
};

pub mod codes {
    pub const BAD_REQUEST: &str = "DOCKER_BAD_REQUEST";
    pub const UNAUTHORIZED: &str = "DOCKER_UNAUTHORIZED";
    pub const FORBIDDEN: &str = "DOCKER_FORBIDDEN";
    pub const NOT_FOUND: &str = "DOCKER_NOT_FOUND";
    pub const CONFLICT: &str = "DOCKER_CONFLICT";
    pub const SERVER_ERROR: &str = "DOCKER_SERVER_ERROR";
    pub const RATE_LIMITED: &str = "DOCKER_RATE_LIMITED";
    pub const HTTP_ERROR: &str = "DOCKER_HTTP_ERROR";
}

pub struct DockerAdapter {
    core: AdapterCore,
    api_version: String,
    policy: DockerRequestPolicy,
}

impl DockerAdapter {
    pub fn new(config: AdapterConfig) -> AdapterResult<Self> {
        let api_version = match &config.settings {
            ServiceSettings::Docker { api_version } => api_version.clone(),
            other => {
                return Err(AdapterError::configuration(format!(
                    "Docker adapter requires docker settings, got {:?}",
                    other
                )))
            }
        };
        Ok(Self {
            core: AdapterCore::new(config)?,
            api_version,
            policy: DockerRequestPolicy::new(),
        })
    }

    /// Extract the daemon's error message from its `{"message": ...}`
    /// error body, falling back to the raw text.
    fn daemon_message(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string())
    }

    pub async fn ping(&self) -> AdapterResponse<Value> {
        self.get("/_ping", None).await
    }

    pub async fn version(&self) -> AdapterResponse<DockerVersion> {
        self.get("/version", None).await.decode()
    }

    pub async fn info(&self) -> AdapterResponse<Value> {
        self.get("/info", None).await
    }

    pub async fn list_containers(&self, all: bool) -> AdapterResponse<Vec<ContainerSummary>> {
        let params = vec![("all".to_string(), all.to_string())];
        self.get("/containers/json", Some(&params)).await.decode()
    }

    pub async fn inspect_container(&self, id: &str) -> AdapterResponse<Value> {
        let endpoint = format!("/containers/{}/json", urlencoding::encode(id));
        self.get(&endpoint, None).await
    }

    pub async fn container_stats(&self, id: &str) -> AdapterResponse<Value> {
        let endpoint = format!("/containers/{}/stats", urlencoding::encode(id));
        let params = vec![("stream".to_string(), "false".to_string())];
        self.get(&endpoint, Some(&params)).await
    }

    /// Recent log lines as raw text (the Engine does not return JSON here).
    pub async fn container_logs(&self, id: &str, tail: u32) -> AdapterResponse<Value> {
        let endpoint = format!("/containers/{}/logs", urlencoding::encode(id));
        let params = vec![
            ("stdout".to_string(), "true".to_string()),
            ("stderr".to_string(), "true".to_string()),
            ("tail".to_string(), tail.to_string()),
        ];
        self.get(&endpoint, Some(&params)).await
    }

    pub async fn list_images(&self) -> AdapterResponse<Vec<ImageSummary>> {
        self.get("/images/json", None).await.decode()
    }

    pub async fn inspect_image(&self, id: &str) -> AdapterResponse<Value> {
        let endpoint = format!("/images/{}/json", urlencoding::encode(id));
        self.get(&endpoint, None).await
    }
}

#[async_trait]
impl ServiceAdapter for DockerAdapter {
    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Docker
    }

    fn name(&self) -> &str {
        "docker"
    }

    fn validate_config(&self, config: &AdapterConfig) -> AdapterResult<()> {
        if !matches!(config.settings, ServiceSettings::Docker { .. }) {
            return Err(AdapterError::configuration(
                "Docker adapter requires docker settings",
            ));
        }
        if config.base_url.trim().is_empty() {
            return Err(AdapterError::configuration("Docker host must not be empty"));
        }
        Ok(())
    }

    fn health_endpoint(&self) -> String {
        "/version".to_string()
    }

    /// All Docker requests funnel through one versioned builder:
    /// `{scheme}://{host}:{port}/{version}/{endpoint}`.
    async fn build_url(&self, endpoint: &str, params: &QueryParams) -> AdapterResult<Url> {
        let versioned = format!("/{}/{}", self.api_version, endpoint.trim_start_matches('/'));
        self.core.build_url(&versioned, params).await
    }

    fn validate_request(&self, method: &Method, endpoint: &str) -> Result<(), PolicyViolation> {
        self.policy.validate_request(method, endpoint)
    }

    fn map_error(&self, status: u16, body: &str) -> AdapterError {
        let message = Self::daemon_message(body);
        let (code, message) = match status {
            400 => (codes::BAD_REQUEST, format!("Invalid request: {}", message)),
            401 => (codes::UNAUTHORIZED, "Docker authentication failed".to_string()),
            403 => (codes::FORBIDDEN, format!("Access denied: {}", message)),
            404 => (codes::NOT_FOUND, format!("Not found: {}", message)),
            409 => (codes::CONFLICT, format!("Conflict: {}", message)),
            429 => (codes::RATE_LIMITED, "Docker daemon rate limit".to_string()),
            s if s >= 500 => (codes::SERVER_ERROR, format!("Docker daemon error: {}", message)),
            _ => (codes::HTTP_ERROR, format!("HTTP {}: {}", status, message)),
        };
        AdapterError::new(code, message, AdapterError::status_is_retryable(status))
            .with_status(status)
    }

    fn version_header(&self) -> Option<&'static str> {
        Some("Api-Version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::types::AdapterConfig;

    fn adapter() -> DockerAdapter {
        let mut config = AdapterConfig::docker_default("docker.example.com");
        config.port = Some(2376);
        config.use_ssl = true;
        DockerAdapter::new(config).unwrap()
    }

    #[tokio::test]
    async fn build_url_injects_version_segment() {
        let adapter = adapter();
        let params = vec![("all".to_string(), "false".to_string())];
        let url = adapter.build_url("/containers/json", &params).await.unwrap();
        assert_eq!(
            url.as_str(),
            "https://docker.example.com:2376/v1.43/containers/json?all=false"
        );
    }

    #[tokio::test]
    async fn rejects_wrong_settings_variant() {
        let mut config = AdapterConfig::docker_default("docker.local");
        config.settings = ServiceSettings::Sabnzbd;
        assert!(DockerAdapter::new(config).is_err());
    }

    #[test]
    fn error_mapping_table() {
        let adapter = adapter();
        let cases = [
            (400, codes::BAD_REQUEST, false),
            (401, codes::UNAUTHORIZED, false),
            (403, codes::FORBIDDEN, false),
            (404, codes::NOT_FOUND, false),
            (409, codes::CONFLICT, false),
            (429, codes::RATE_LIMITED, true),
            (500, codes::SERVER_ERROR, true),
            (503, codes::SERVER_ERROR, true),
        ];
        for (status, code, retryable) in cases {
            let err = adapter.map_error(status, "{\"message\":\"boom\"}");
            assert_eq!(err.code, code, "status {}", status);
            assert_eq!(err.retryable, retryable, "status {}", status);
            assert_eq!(err.http_status, Some(status));
        }
    }

    #[test]
    fn daemon_message_is_extracted() {
        let err = adapter().map_error(404, "{\"message\":\"No such container: abc\"}");
        assert!(err.message.contains("No such container: abc"));
    }

    #[tokio::test]
    async fn mutating_requests_fail_before_any_network_call() {
        // docker.invalid is unresolvable; the policy guard must reject the
        // request before DNS is ever consulted.
        let adapter =
            DockerAdapter::new(AdapterConfig::docker_default("docker.invalid")).unwrap();
        let response = adapter.post("/containers/create", None, None).await;
        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, crate::error::codes::POLICY_VIOLATION);
        assert!(!error.retryable);

        let response = adapter.get("/containers/abc/exec", None).await;
        assert_eq!(
            response.error.unwrap().code,
            crate::error::codes::POLICY_VIOLATION
        );

        // No connection was attempted, so the snapshot stays pristine.
        let state = adapter.connection_state().await;
        assert!(state.connection_error.is_none());
        assert_eq!(state.retry_count, 0);
    }
}
