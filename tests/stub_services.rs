//! End-to-end tests against stub vendor APIs.
//!
//! Each test stands up a minimal axum server on an ephemeral localhost
//! port that mimics the relevant vendor endpoints, then drives a real
//! adapter at it and asserts on the uniform contract: URL shapes, auth
//! placement, error mapping, health checks, and the Proxmox
//! single-flight authentication property.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::RawQuery;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;

use homelab_adapters::adapters::proxmox;
use homelab_adapters::adapters::{arr, docker, sabnzbd};
use homelab_adapters::error::codes;
use homelab_adapters::{
    AdapterConfig, ArrAdapter, ArrApp, AuthType, DockerAdapter, HealthStatus, ProxmoxAdapter,
    SabnzbdAdapter, ServiceAdapter,
};

fn init_tracing() {
    // First caller wins; later calls are no-ops.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn serve(app: Router) -> SocketAddr {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn local_config(template: AdapterConfig, addr: SocketAddr) -> AdapterConfig {
    AdapterConfig {
        base_url: "127.0.0.1".to_string(),
        port: Some(addr.port()),
        use_ssl: false,
        timeout_seconds: 5,
        ..template
    }
}

// --- Docker --------------------------------------------------------------

#[tokio::test]
async fn docker_list_containers_end_to_end() {
    let seen_query: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let captured = seen_query.clone();
    let app = Router::new().route(
        "/v1.43/containers/json",
        get(move |RawQuery(query): RawQuery| {
            let captured = captured.clone();
            async move {
                *captured.lock().unwrap() = query;
                Json(json!([
                    {"Id": "abc123", "Names": ["/web"], "Image": "nginx:latest",
                     "State": "running", "Status": "Up 2 hours", "Created": 1700000000}
                ]))
            }
        }),
    );
    let addr = serve(app).await;

    let adapter =
        DockerAdapter::new(local_config(AdapterConfig::docker_default("ignored"), addr)).unwrap();
    let response = adapter.list_containers(false).await;

    assert!(response.success, "error: {:?}", response.error);
    let containers = response.data.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].id, "abc123");
    assert_eq!(containers[0].image, "nginx:latest");
    assert_eq!(seen_query.lock().unwrap().as_deref(), Some("all=false"));
    assert_eq!(response.metadata.endpoint, "/containers/json");

    let state = adapter.connection_state().await;
    assert!(state.is_connected);
    assert_eq!(state.retry_count, 0);
}

#[tokio::test]
async fn docker_error_statuses_map_to_service_codes() {
    let app = Router::new()
        .route(
            "/v1.43/containers/missing/json",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({"message": "No such container: missing"})),
                )
            }),
        )
        .route(
            "/v1.43/info",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "daemon exploded") }),
        );
    let addr = serve(app).await;

    let adapter =
        DockerAdapter::new(local_config(AdapterConfig::docker_default("ignored"), addr)).unwrap();

    let response = adapter.inspect_container("missing").await;
    let error = response.error.unwrap();
    assert_eq!(error.code, docker::codes::NOT_FOUND);
    assert!(!error.retryable);
    assert_eq!(error.http_status, Some(404));
    assert!(error.message.contains("No such container"));

    let response = adapter.info().await;
    let error = response.error.unwrap();
    assert_eq!(error.code, docker::codes::SERVER_ERROR);
    assert!(error.retryable);

    let state = adapter.connection_state().await;
    assert!(!state.is_connected);
    assert!(state.retry_count >= 2);
}

#[tokio::test]
async fn docker_health_check_reports_version() {
    let app = Router::new().route(
        "/v1.43/version",
        get(|| async {
            Json(json!({"Version": "24.0.7", "ApiVersion": "1.43", "Os": "linux", "Arch": "amd64"}))
        }),
    );
    let addr = serve(app).await;

    let adapter =
        DockerAdapter::new(local_config(AdapterConfig::docker_default("ignored"), addr)).unwrap();
    let health = adapter.health_check().await;

    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.version.as_deref(), Some("24.0.7"));
    assert!(health.response_time_ms.is_some());
}

#[tokio::test]
async fn docker_health_check_survives_unreachable_daemon() {
    init_tracing();
    let mut config = AdapterConfig::docker_default("127.0.0.1");
    config.port = Some(1); // nothing listens on port 1
    config.timeout_seconds = 2;
    let adapter = DockerAdapter::new(config).unwrap();

    let health = adapter.health_check().await;
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert!(health.error_message.is_some());
}

#[tokio::test]
async fn docker_request_timeout_is_retryable() {
    let app = Router::new().route(
        "/v1.43/version",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({}))
        }),
    );
    let addr = serve(app).await;

    let mut config = local_config(AdapterConfig::docker_default("ignored"), addr);
    config.timeout_seconds = 1;
    let adapter = DockerAdapter::new(config).unwrap();

    let response = adapter.version().await;
    let error = response.error.unwrap();
    assert_eq!(error.code, codes::TIMEOUT);
    assert!(error.retryable);
}

// --- Proxmox -------------------------------------------------------------

fn proxmox_stub(auth_hits: Arc<AtomicUsize>) -> Router {
    use axum::response::IntoResponse;

    let ticket_route = move |Form(form): Form<HashMap<String, String>>| {
        let auth_hits = auth_hits.clone();
        async move {
            auth_hits.fetch_add(1, Ordering::SeqCst);
            if form.get("username").map(String::as_str) == Some("root@pam")
                && form.get("password").map(String::as_str) == Some("secret")
            {
                Json(json!({"data": {"ticket": "PVE:root@pam:TICKET",
                                      "CSRFPreventionToken": "CSRF:TOKEN"}}))
                    .into_response()
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"data": null})),
                )
                    .into_response()
            }
        }
    };

    let nodes_route = |headers: HeaderMap| async move {
        let cookie = headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if cookie.contains("PVEAuthCookie=PVE:root@pam:TICKET") {
            Json(json!({"data": [{"node": "pve1", "status": "online",
                                   "cpu": 0.12, "maxcpu": 8}]}))
                .into_response()
        } else {
            (StatusCode::UNAUTHORIZED, "authentication failure").into_response()
        }
    };

    let start_route = |headers: HeaderMap| async move {
        if headers.get("CSRFPreventionToken").is_some() {
            Json(json!({"data": "UPID:pve1:0000:start"})).into_response()
        } else {
            (StatusCode::UNAUTHORIZED, "missing CSRF token").into_response()
        }
    };

    Router::new()
        .route("/api2/json/access/ticket", post(ticket_route))
        .route("/api2/json/nodes", get(nodes_route))
        .route("/api2/json/version", get(|| async {
            Json(json!({"data": {"version": "8.1.4", "release": "8.1"}}))
        }))
        .route("/api2/json/nodes/pve1/qemu/100/status/start", post(start_route))
}

fn proxmox_config(addr: SocketAddr) -> AdapterConfig {
    local_config(
        AdapterConfig::proxmox_default("ignored", "root", "secret"),
        addr,
    )
}

#[tokio::test]
async fn proxmox_ticket_flow_and_data_unwrap() {
    let auth_hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(proxmox_stub(auth_hits.clone())).await;
    let adapter = ProxmoxAdapter::new(proxmox_config(addr)).unwrap();

    let response = adapter.list_nodes().await;
    assert!(response.success, "error: {:?}", response.error);
    let nodes = response.data.unwrap();
    assert_eq!(nodes[0].node, "pve1");
    assert_eq!(nodes[0].status, "online");
    assert_eq!(auth_hits.load(Ordering::SeqCst), 1);

    // Subsequent calls and connects reuse the cached ticket.
    assert!(adapter.connect().await);
    let _ = adapter.list_nodes().await;
    assert_eq!(auth_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn proxmox_concurrent_connects_single_flight() {
    let auth_hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(proxmox_stub(auth_hits.clone())).await;
    let adapter = Arc::new(ProxmoxAdapter::new(proxmox_config(addr)).unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let adapter = Arc::clone(&adapter);
        handles.push(tokio::spawn(async move { adapter.connect().await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    // All eight concurrent connects coalesced into one authentication.
    assert_eq!(auth_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn proxmox_csrf_header_on_mutating_requests() {
    let auth_hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(proxmox_stub(auth_hits)).await;
    let adapter = ProxmoxAdapter::new(proxmox_config(addr)).unwrap();

    let response = adapter.start_vm("pve1", 100).await;
    assert!(response.success, "error: {:?}", response.error);
    assert_eq!(
        response.data.unwrap().as_str(),
        Some("UPID:pve1:0000:start")
    );
}

#[tokio::test]
async fn proxmox_invalid_credentials_connect_false_no_ticket_cached() {
    let auth_hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(proxmox_stub(auth_hits.clone())).await;
    let mut config = proxmox_config(addr);
    config.auth = AuthType::Ticket {
        username: "root".to_string(),
        password: "wrong".to_string(),
        realm: "pam".to_string(),
    };
    let adapter = ProxmoxAdapter::new(config).unwrap();

    assert!(adapter.authenticate().await.is_err());
    assert!(!adapter.connect().await);
    let state = adapter.connection_state().await;
    assert!(!state.is_connected);
    assert!(state.connection_error.is_some());

    // A later request authenticates again from scratch: nothing was cached.
    let before = auth_hits.load(Ordering::SeqCst);
    let _ = adapter.list_nodes().await;
    assert!(auth_hits.load(Ordering::SeqCst) > before);
}

#[tokio::test]
async fn proxmox_health_check_unwraps_versioned_payload() {
    let auth_hits = Arc::new(AtomicUsize::new(0));
    let addr = serve(proxmox_stub(auth_hits)).await;
    let adapter = ProxmoxAdapter::new(proxmox_config(addr)).unwrap();

    let health = adapter.health_check().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.version.as_deref(), Some("8.1.4"));
}

#[tokio::test]
async fn proxmox_401_forces_reauthentication_on_next_call() {
    use axum::response::IntoResponse;

    let auth_hits = Arc::new(AtomicUsize::new(0));
    let hits = auth_hits.clone();
    // Every ticket this stub issues is distinct, and /nodes only accepts
    // the most recent one, so a revoked ticket produces a 401.
    let issued = Arc::new(Mutex::new(String::new()));
    let issued_for_auth = issued.clone();
    let issued_for_nodes = issued.clone();

    let app = Router::new()
        .route(
            "/api2/json/access/ticket",
            post(move |Form(_): Form<HashMap<String, String>>| {
                let hits = hits.clone();
                let issued = issued_for_auth.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                    let ticket = format!("PVE:ticket-{}", n);
                    *issued.lock().unwrap() = ticket.clone();
                    Json(json!({"data": {"ticket": ticket,
                                          "CSRFPreventionToken": "CSRF"}}))
                }
            }),
        )
        .route(
            "/api2/json/nodes",
            get(move |headers: HeaderMap| {
                let issued = issued_for_nodes.clone();
                async move {
                    let expected = format!("PVEAuthCookie={}", issued.lock().unwrap());
                    let cookie = headers
                        .get("cookie")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if cookie == expected {
                        Json(json!({"data": []})).into_response()
                    } else {
                        (StatusCode::UNAUTHORIZED, "ticket revoked").into_response()
                    }
                }
            }),
        );
    let addr = serve(app).await;
    let adapter = ProxmoxAdapter::new(proxmox_config(addr)).unwrap();

    assert!(adapter.list_nodes().await.success);
    assert_eq!(auth_hits.load(Ordering::SeqCst), 1);

    // Revoke the ticket server-side; the next call gets a 401 mapped to
    // the auth code, and the one after re-authenticates with a new ticket.
    *issued.lock().unwrap() = "revoked".to_string();
    let response = adapter.list_nodes().await;
    let error = response.error.unwrap();
    assert_eq!(error.code, proxmox::codes::AUTH_FAILED);
    assert!(!error.retryable);

    *issued.lock().unwrap() = String::new();
    let _ = adapter.list_nodes().await; // re-auth overwrites `issued`
    assert_eq!(auth_hits.load(Ordering::SeqCst), 2);
    assert!(adapter.list_nodes().await.success);
}

// --- Arr family ----------------------------------------------------------

#[tokio::test]
async fn radarr_sends_api_key_header_and_decodes_status() {
    use axum::response::IntoResponse;

    let app = Router::new().route(
        "/api/v3/system/status",
        get(|headers: HeaderMap| async move {
            match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
                Some("topsecret") => Json(json!({
                    "appName": "Radarr", "version": "5.2.6.8376", "osName": "debian"
                }))
                .into_response(),
                _ => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            }
        }),
    );
    let addr = serve(app).await;

    let good = ArrAdapter::new(local_config(
        AdapterConfig::arr_default("ignored", ArrApp::Radarr, "topsecret"),
        addr,
    ))
    .unwrap();
    let response = good.system_status().await;
    assert!(response.success, "error: {:?}", response.error);
    let status = response.data.unwrap();
    assert_eq!(status.app_name.as_deref(), Some("Radarr"));
    assert_eq!(status.version, "5.2.6.8376");

    let bad = ArrAdapter::new(local_config(
        AdapterConfig::arr_default("ignored", ArrApp::Radarr, "wrong"),
        addr,
    ))
    .unwrap();
    let response = bad.system_status().await;
    let error = response.error.unwrap();
    assert_eq!(error.code, arr::codes::INVALID_API_KEY);
    assert!(!error.retryable);
}

// --- Sabnzbd -------------------------------------------------------------

#[tokio::test]
async fn sabnzbd_api_key_travels_in_the_query_string() {
    let seen_query: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let captured = seen_query.clone();
    let app = Router::new().route(
        "/api",
        get(move |RawQuery(query): RawQuery| {
            let captured = captured.clone();
            async move {
                let query = query.unwrap_or_default();
                *captured.lock().unwrap() = Some(query.clone());
                if !query.contains("apikey=sabkey") {
                    return Json(json!({"status": false, "error": "API Key Incorrect"}));
                }
                if query.contains("mode=queue") {
                    Json(json!({"queue": {"paused": false, "speed": "2.1 M/s",
                                           "sizeleft": "640 MB",
                                           "slots": [{"nzo_id": "SABnzbd_nzo_1",
                                                      "filename": "linux.iso",
                                                      "status": "Downloading",
                                                      "percentage": "42"}]}}))
                } else {
                    Json(json!({"version": "4.2.1"}))
                }
            }
        }),
    );
    let addr = serve(app).await;

    let adapter = SabnzbdAdapter::new(local_config(
        AdapterConfig::sabnzbd_default("ignored", "sabkey"),
        addr,
    ))
    .unwrap();

    let response = adapter.queue().await;
    assert!(response.success, "error: {:?}", response.error);
    let queue = response.data.unwrap();
    assert!(!queue.paused);
    assert_eq!(queue.slots[0].filename, "linux.iso");

    let query = seen_query.lock().unwrap().clone().unwrap();
    assert!(query.contains("mode=queue"));
    assert!(query.contains("output=json"));
    assert!(query.contains("apikey=sabkey"));

    // Wrong key: HTTP 200 body error folded into the uniform taxonomy.
    let bad = SabnzbdAdapter::new(local_config(
        AdapterConfig::sabnzbd_default("ignored", "nope"),
        addr,
    ))
    .unwrap();
    let response = bad.version().await;
    let error = response.error.unwrap();
    assert_eq!(error.code, sabnzbd::codes::INVALID_API_KEY);
    assert!(!error.retryable);
}

#[tokio::test]
async fn sabnzbd_health_check_uses_version_mode() {
    let app = Router::new().route(
        "/api",
        get(|RawQuery(query): RawQuery| async move {
            assert!(query.unwrap_or_default().contains("mode=version"));
            Json(json!({"version": "4.2.1"}))
        }),
    );
    let addr = serve(app).await;

    let adapter = SabnzbdAdapter::new(local_config(
        AdapterConfig::sabnzbd_default("ignored", "sabkey"),
        addr,
    ))
    .unwrap();
    let health = adapter.health_check().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.version.as_deref(), Some("4.2.1"));
}
