//! The service adapter framework.
//!
//! Turns heterogeneous infrastructure APIs (Docker Engine, Proxmox VE,
//! Radarr/Sonarr, Sabnzbd) into one uniform contract: construct an
//! adapter from an [`AdapterConfig`], call lifecycle and verb methods,
//! consume [`AdapterResponse`] / [`HealthCheckResult`]. Per-service
//! quirks (auth schemes, URL conventions, error vocabularies, policy
//! restrictions) stay behind the [`ServiceAdapter`] trait.

pub mod arr;
pub mod base;
pub mod docker;
pub mod factory;
pub mod proxmox;
pub mod registry;
pub mod sabnzbd;
pub mod types;

pub use arr::ArrAdapter;
pub use base::{AdapterCore, QueryParams, ServiceAdapter};
pub use docker::DockerAdapter;
pub use factory::{AdapterFactory, BuiltInAdapterFactory};
pub use proxmox::{ProxmoxAdapter, ProxmoxTicket};
pub use registry::AdapterRegistry;
pub use sabnzbd::SabnzbdAdapter;
pub use types::{
    AdapterConfig, AdapterResponse, ArrApp, AuthType, ConnectionState, HealthCheckResult,
    HealthStatus, ResponseMetadata, ServiceKind, ServiceSettings,
};
