//! homelab-adapters - uniform adapters over home-lab infrastructure APIs
//!
//! This library normalizes the REST APIs of services a home-lab
//! dashboard registers (Docker Engine, Proxmox VE, Radarr/Sonarr,
//! Sabnzbd) behind one request/response contract, so route handlers and
//! the health-check scheduler never branch on service type. Persistence,
//! routing, UI, and notification fan-out are external collaborators.

pub mod adapters;
pub mod error;
pub mod policy;

// Re-export commonly used types
pub use adapters::{
    AdapterConfig, AdapterRegistry, AdapterResponse, ArrAdapter, ArrApp, AuthType,
    BuiltInAdapterFactory, ConnectionState, DockerAdapter, HealthCheckResult, HealthStatus,
    ProxmoxAdapter, SabnzbdAdapter, ServiceAdapter, ServiceKind, ServiceSettings,
};
pub use error::{AdapterError, AdapterResult};
pub use policy::docker::DockerRequestPolicy;
pub use policy::ssh::SshCommandPolicy;
pub use policy::PolicyViolation;
