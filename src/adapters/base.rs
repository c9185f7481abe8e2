//! Base adapter contract: the lifecycle and verb operations every
//! concrete adapter shares, so callers never branch on service type.
//!
//! Composition over inheritance: each adapter is a flat struct holding an
//! [`AdapterCore`] (config, connection state, HTTP client) plus a
//! [`ServiceAdapter`] implementation supplying the per-service hooks
//! (auth headers, URL building, error mapping). The provided trait
//! methods implement the single request pipeline all verbs go through.

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{classify_status, AdapterError, AdapterResult};
use crate::policy::PolicyViolation;

use super::types::{
    AdapterConfig, AdapterResponse, AuthType, ConnectionState, HealthCheckResult, HealthStatus,
    ResponseMetadata, ServiceKind,
};

/// Query parameters in caller-supplied order.
pub type QueryParams = [(String, String)];

/// Shared state every adapter owns: one configuration, one connection
/// snapshot, one HTTP client. The client is rebuilt only when TLS
/// settings change through `update_config`.
pub struct AdapterCore {
    config: RwLock<AdapterConfig>,
    state: RwLock<ConnectionState>,
    client: RwLock<Client>,
    initialized: AtomicBool,
}

impl AdapterCore {
    pub fn new(config: AdapterConfig) -> AdapterResult<Self> {
        let client = Self::build_client(&config)?;
        let state = ConnectionState::new(config.max_retries);
        Ok(Self {
            config: RwLock::new(config),
            state: RwLock::new(state),
            client: RwLock::new(client),
            initialized: AtomicBool::new(false),
        })
    }

    fn build_client(config: &AdapterConfig) -> AdapterResult<Client> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!config.verify_ssl);
        if let Some(pem) = &config.client_identity_pem {
            let identity = reqwest::Identity::from_pem(pem.as_bytes())
                .map_err(|e| AdapterError::configuration(format!("Invalid client identity: {}", e)))?;
            builder = builder.identity(identity);
        }
        builder
            .build()
            .map_err(|e| AdapterError::configuration(format!("Failed to build HTTP client: {}", e)))
    }

    pub async fn config(&self) -> AdapterConfig {
        self.config.read().await.clone()
    }

    pub async fn http_client(&self) -> Client {
        self.client.read().await.clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn set_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Replace the connection snapshot with its "connected" successor.
    pub async fn mark_connected(&self) {
        let mut state = self.state.write().await;
        *state = state.connected();
    }

    /// Replace the connection snapshot with its "failed" successor.
    pub async fn mark_failed(&self, error: &AdapterError) {
        let mut state = self.state.write().await;
        *state = state.failed(error);
    }

    pub async fn reset_state(&self) {
        let max_retries = self.config.read().await.max_retries;
        let mut state = self.state.write().await;
        *state = ConnectionState::new(max_retries);
    }

    /// Swap in a new configuration, rebuilding the HTTP client when TLS
    /// settings changed. Connection state is reset so the next request
    /// re-establishes readiness against the new target.
    pub async fn replace_config(&self, config: AdapterConfig) -> AdapterResult<()> {
        let rebuild = {
            let current = self.config.read().await;
            current.verify_ssl != config.verify_ssl
                || current.client_identity_pem != config.client_identity_pem
        };
        if rebuild {
            let client = Self::build_client(&config)?;
            *self.client.write().await = client;
        }
        *self.config.write().await = config;
        self.reset_state().await;
        Ok(())
    }

    pub async fn build_url(&self, endpoint: &str, params: &QueryParams) -> AdapterResult<Url> {
        let config = self.config.read().await;
        Self::compose_url(&config, endpoint, params)
    }

    /// Pure function of configuration and endpoint: scheme from `use_ssl`,
    /// host, optional port, URL-encoded query parameters in caller order.
    pub fn compose_url(
        config: &AdapterConfig,
        endpoint: &str,
        params: &QueryParams,
    ) -> AdapterResult<Url> {
        let host = config
            .base_url
            .trim_end_matches('/')
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        if host.is_empty() {
            return Err(AdapterError::configuration("base_url must not be empty"));
        }
        let scheme = if config.use_ssl { "https" } else { "http" };
        let path = endpoint.trim_start_matches('/');
        let base = match config.port {
            Some(port) => format!("{}://{}:{}/{}", scheme, host, port, path),
            None => format!("{}://{}/{}", scheme, host, path),
        };
        let mut url = Url::parse(&base)
            .map_err(|e| AdapterError::configuration(format!("Invalid URL {:?}: {}", base, e)))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }

    /// Headers derived from the configured auth scheme, merged over the
    /// static configured headers. Ticket auth contributes nothing here;
    /// ticket adapters override `auth_headers` with their session state.
    pub async fn default_auth_headers(&self) -> AdapterResult<HeaderMap> {
        let config = self.config.read().await;
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AdapterError::configuration(format!("Invalid header name {:?}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AdapterError::configuration(format!("Invalid header value: {}", e)))?;
            headers.insert(name, value);
        }
        match &config.auth {
            AuthType::None | AuthType::Ticket { .. } => {}
            AuthType::ApiKey { key } => {
                headers.insert("X-Api-Key", header_value(key)?);
            }
            AuthType::Basic { username, password } => {
                let encoded = Base64::encode_string(format!("{}:{}", username, password).as_bytes());
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    header_value(&format!("Basic {}", encoded))?,
                );
            }
            AuthType::Bearer { token } => {
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    header_value(&format!("Bearer {}", token))?,
                );
            }
        }
        Ok(headers)
    }
}

fn header_value(value: &str) -> AdapterResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AdapterError::configuration(format!("Invalid header value: {}", e)))
}

/// The uniform contract every concrete adapter implements.
///
/// Required hooks describe the service's quirks; the provided methods
/// implement the shared lifecycle and the single request pipeline. All
/// verbs return [`AdapterResponse`] and never propagate an `Err` across
/// the public boundary.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn core(&self) -> &AdapterCore;

    fn kind(&self) -> ServiceKind;

    fn name(&self) -> &str;

    /// Per-service configuration validation, run by `initialize()`.
    fn validate_config(&self, config: &AdapterConfig) -> AdapterResult<()>;

    /// The cheap read-only endpoint `health_check` probes.
    fn health_endpoint(&self) -> String;

    /// Build the absolute request URL. Overridden by services with
    /// versioned path segments (Docker) or mandatory query credentials
    /// (Sabnzbd).
    async fn build_url(&self, endpoint: &str, params: &QueryParams) -> AdapterResult<Url> {
        self.core().build_url(endpoint, params).await
    }

    /// Auth headers for one request. The method is passed through so
    /// ticket adapters can attach CSRF tokens on mutating verbs only.
    async fn auth_headers(&self, method: &Method) -> AdapterResult<HeaderMap> {
        let _ = method;
        self.core().default_auth_headers().await
    }

    /// Map a non-success HTTP status to the service's error vocabulary.
    fn map_error(&self, status: u16, body: &str) -> AdapterError {
        classify_status(status, body)
    }

    /// Policy guard hook, consulted before the URL is even built. The
    /// default permits everything; restricted services (Docker) override.
    fn validate_request(&self, method: &Method, endpoint: &str) -> Result<(), PolicyViolation> {
        let _ = (method, endpoint);
        Ok(())
    }

    /// Pre-request hook: ticket adapters refresh stale sessions here.
    async fn before_request(&self) -> AdapterResult<()> {
        Ok(())
    }

    /// Called on any 401 so cached session state is dropped and the next
    /// attempt re-authenticates instead of reusing a known-bad credential.
    async fn on_unauthorized(&self) {}

    /// Inspect a 2xx body for service-level errors (Sabnzbd reports bad
    /// API keys inside HTTP 200 responses).
    fn inspect_body(&self, body: &Value) -> Option<AdapterError> {
        let _ = body;
        None
    }

    /// Response header carrying the service version, where one exists.
    fn version_header(&self) -> Option<&'static str> {
        None
    }

    /// Pull a version string out of the health endpoint's payload.
    fn version_from_health(&self, data: &Value) -> Option<String> {
        data.get("version")
            .or_else(|| data.get("Version"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Validate configuration and mark the adapter ready. Idempotent;
    /// the only lifecycle operation that fails with a synchronous error,
    /// since no partial response is meaningful before the first request.
    async fn initialize(&self) -> AdapterResult<()> {
        let core = self.core();
        if core.is_initialized() {
            return Ok(());
        }
        let config = core.config().await;
        self.validate_config(&config)?;
        core.set_initialized();
        debug!("🔧 {} adapter initialized for {}", self.name(), config.base_url);
        Ok(())
    }

    /// Establish readiness. Never errors: failures are recorded in the
    /// connection snapshot and reported as `false`.
    async fn connect(&self) -> bool {
        let result = async {
            self.initialize().await?;
            self.before_request().await
        }
        .await;
        match result {
            Ok(()) => {
                self.core().mark_connected().await;
                info!("🔌 {} adapter connected", self.name());
                true
            }
            Err(error) => {
                warn!("⚠️ {} adapter failed to connect: {}", self.name(), error);
                self.core().mark_failed(&error).await;
                false
            }
        }
    }

    /// Reset the connection snapshot. Holds no external resource beyond
    /// the HTTP client handle, which survives for reuse.
    async fn disconnect(&self) {
        self.core().reset_state().await;
        debug!("🔌 {} adapter disconnected", self.name());
    }

    /// Swap in a new configuration after validating it.
    async fn update_config(&self, config: AdapterConfig) -> AdapterResult<()> {
        self.validate_config(&config)?;
        self.core().replace_config(config).await?;
        info!("🔄 {} adapter configuration updated", self.name());
        Ok(())
    }

    async fn connection_state(&self) -> ConnectionState {
        self.core().connection_state().await
    }

    async fn get(
        &self,
        endpoint: &str,
        params: Option<&QueryParams>,
    ) -> AdapterResponse<Value> {
        self.send(Method::GET, endpoint, None, params).await
    }

    async fn post(
        &self,
        endpoint: &str,
        body: Option<Value>,
        params: Option<&QueryParams>,
    ) -> AdapterResponse<Value> {
        self.send(Method::POST, endpoint, body, params).await
    }

    async fn put(
        &self,
        endpoint: &str,
        body: Option<Value>,
        params: Option<&QueryParams>,
    ) -> AdapterResponse<Value> {
        self.send(Method::PUT, endpoint, body, params).await
    }

    async fn patch(
        &self,
        endpoint: &str,
        body: Option<Value>,
        params: Option<&QueryParams>,
    ) -> AdapterResponse<Value> {
        self.send(Method::PATCH, endpoint, body, params).await
    }

    async fn delete(
        &self,
        endpoint: &str,
        params: Option<&QueryParams>,
    ) -> AdapterResponse<Value> {
        self.send(Method::DELETE, endpoint, None, params).await
    }

    /// The single path every domain operation goes through: lazy init,
    /// policy guard, session refresh, URL + auth assembly, request with
    /// per-call timeout, error normalization. Always returns a response,
    /// never an `Err`.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        params: Option<&QueryParams>,
    ) -> AdapterResponse<Value> {
        let started = Instant::now();
        let result = self.dispatch(&method, endpoint, body, params).await;
        let elapsed = started.elapsed().as_millis() as u64;
        match result {
            Ok((data, version)) => {
                debug!(
                    "✅ {} {} {} completed in {}ms",
                    self.name(),
                    method,
                    endpoint,
                    elapsed
                );
                AdapterResponse::ok(
                    data,
                    ResponseMetadata::new(endpoint, elapsed).with_version(version),
                )
            }
            Err(error) => {
                warn!(
                    "❌ {} {} {} failed after {}ms: {}",
                    self.name(),
                    method,
                    endpoint,
                    elapsed,
                    error
                );
                AdapterResponse::fail(error, ResponseMetadata::new(endpoint, elapsed))
            }
        }
    }

    /// Request pipeline used by `send`; separated so failures funnel into
    /// one error path.
    async fn dispatch(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<Value>,
        params: Option<&QueryParams>,
    ) -> AdapterResult<(Value, Option<String>)> {
        let core = self.core();
        if !core.is_initialized() {
            self.initialize().await?;
        }

        // Policy rejections happen before any connection attempt and leave
        // the connection snapshot untouched; everything after them counts
        // as a failed call.
        self.validate_request(method, endpoint)?;

        let empty: &QueryParams = &[];
        let prepared = async {
            self.before_request().await?;
            let url = self.build_url(endpoint, params.unwrap_or(empty)).await?;
            let headers = self.auth_headers(method).await?;
            Ok::<_, AdapterError>((url, headers))
        }
        .await;
        let (url, headers) = match prepared {
            Ok(parts) => parts,
            Err(error) => {
                core.mark_failed(&error).await;
                return Err(error);
            }
        };
        let timeout = core.config().await.timeout();
        let client = core.http_client().await;

        debug!("🌐 {} {} {}", self.name(), method, url);

        let mut request = client
            .request(method.clone(), url)
            .headers(headers)
            .timeout(timeout);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(transport) => {
                let error = AdapterError::from(transport);
                core.mark_failed(&error).await;
                return Err(error);
            }
        };

        let status = response.status();
        let version = self.version_header().and_then(|name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

        if status.is_success() {
            let text = response.text().await.map_err(AdapterError::from)?;
            let value = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };
            if let Some(error) = self.inspect_body(&value) {
                if error.is_auth_failure() || error.code.contains("API_KEY") {
                    self.on_unauthorized().await;
                }
                core.mark_failed(&error).await;
                return Err(error);
            }
            core.mark_connected().await;
            Ok((value, version))
        } else {
            let body_text = response.text().await.unwrap_or_default();
            let error = self.map_error(status.as_u16(), &body_text);
            if status.as_u16() == 401 {
                self.on_unauthorized().await;
            }
            core.mark_failed(&error).await;
            Err(error)
        }
    }

    /// Probe the service's cheap read-only endpoint. Never raises; always
    /// stamps `last_check`.
    async fn health_check(&self) -> HealthCheckResult {
        let endpoint = self.health_endpoint();
        let response = self.get(&endpoint, None).await;
        let last_check = Utc::now();
        match (response.success, response.data) {
            (true, Some(data)) => HealthCheckResult {
                status: HealthStatus::Healthy,
                response_time_ms: Some(response.metadata.response_time_ms),
                last_check,
                error_message: None,
                version: response
                    .metadata
                    .service_version
                    .or_else(|| self.version_from_health(&data)),
                details: Some(data),
            },
            (_, _) => HealthCheckResult {
                status: HealthStatus::Unhealthy,
                response_time_ms: Some(response.metadata.response_time_ms),
                last_check,
                error_message: response.error.map(|e| e.to_string()),
                version: None,
                details: None,
            },
        }
    }
}
