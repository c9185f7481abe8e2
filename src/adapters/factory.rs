//! Adapter factory.
//!
//! Creates adapter instances from a service kind plus a decrypted
//! configuration record, checking that the kind and the typed settings
//! variant agree before any adapter is constructed.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AdapterError, AdapterResult};

use super::arr::ArrAdapter;
use super::base::ServiceAdapter;
use super::docker::DockerAdapter;
use super::proxmox::ProxmoxAdapter;
use super::sabnzbd::SabnzbdAdapter;
use super::types::{AdapterConfig, ArrApp, ServiceKind, ServiceSettings};

/// Factory trait for creating adapters.
pub trait AdapterFactory: Send + Sync {
    fn create_adapter(
        &self,
        kind: ServiceKind,
        config: AdapterConfig,
    ) -> AdapterResult<Arc<dyn ServiceAdapter>>;

    fn supports_kind(&self, kind: &ServiceKind) -> bool;

    fn name(&self) -> &str;
}

/// Built-in factory covering every service this crate ships an adapter for.
pub struct BuiltInAdapterFactory;

impl BuiltInAdapterFactory {
    pub fn new() -> Self {
        Self
    }

    fn check_settings(kind: ServiceKind, config: &AdapterConfig) -> AdapterResult<()> {
        let matches = match (&kind, &config.settings) {
            (ServiceKind::Docker, ServiceSettings::Docker { .. }) => true,
            (ServiceKind::Proxmox, ServiceSettings::Proxmox { .. }) => true,
            (ServiceKind::Radarr, ServiceSettings::Arr { application }) => {
                *application == ArrApp::Radarr
            }
            (ServiceKind::Sonarr, ServiceSettings::Arr { application }) => {
                *application == ArrApp::Sonarr
            }
            (ServiceKind::Sabnzbd, ServiceSettings::Sabnzbd) => true,
            _ => false,
        };
        if matches {
            Ok(())
        } else {
            Err(AdapterError::configuration(format!(
                "Settings {:?} do not match service kind {}",
                config.settings, kind
            )))
        }
    }
}

impl Default for BuiltInAdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterFactory for BuiltInAdapterFactory {
    fn create_adapter(
        &self,
        kind: ServiceKind,
        config: AdapterConfig,
    ) -> AdapterResult<Arc<dyn ServiceAdapter>> {
        debug!("🏭 Creating adapter for service kind: {}", kind);
        Self::check_settings(kind, &config)?;

        let adapter: Arc<dyn ServiceAdapter> = match kind {
            ServiceKind::Docker => {
                info!("📦 Creating Docker adapter for {}", config.base_url);
                Arc::new(DockerAdapter::new(config)?)
            }
            ServiceKind::Proxmox => {
                info!("🖥️ Creating Proxmox adapter for {}", config.base_url);
                Arc::new(ProxmoxAdapter::new(config)?)
            }
            ServiceKind::Radarr | ServiceKind::Sonarr => {
                info!("🎬 Creating {} adapter for {}", kind, config.base_url);
                Arc::new(ArrAdapter::new(config)?)
            }
            ServiceKind::Sabnzbd => {
                info!("📰 Creating Sabnzbd adapter for {}", config.base_url);
                Arc::new(SabnzbdAdapter::new(config)?)
            }
        };
        Ok(adapter)
    }

    fn supports_kind(&self, kind: &ServiceKind) -> bool {
        matches!(
            kind,
            ServiceKind::Docker
                | ServiceKind::Proxmox
                | ServiceKind::Radarr
                | ServiceKind::Sonarr
                | ServiceKind::Sabnzbd
        )
    }

    fn name(&self) -> &str {
        "built-in"
    }
}
