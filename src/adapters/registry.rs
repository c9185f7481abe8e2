//! Adapter registry: a facade caching one adapter per configured service
//! record, so route handlers and the health-check scheduler share
//! instances (and the Proxmox ticket cache actually gets reused) instead
//! of rebuilding clients per request.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AdapterResult;

use super::base::ServiceAdapter;
use super::factory::{AdapterFactory, BuiltInAdapterFactory};
use super::types::{AdapterConfig, ServiceKind};

pub struct AdapterRegistry {
    factory: Arc<dyn AdapterFactory>,
    adapters: RwLock<HashMap<Uuid, Arc<dyn ServiceAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::with_factory(Arc::new(BuiltInAdapterFactory::new()))
    }

    pub fn with_factory(factory: Arc<dyn AdapterFactory>) -> Self {
        info!("🎯 AdapterRegistry initialized with {} factory", factory.name());
        Self {
            factory,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached adapter for a service record, creating it on
    /// first use.
    pub async fn get_or_create(
        &self,
        service_id: Uuid,
        kind: ServiceKind,
        config: AdapterConfig,
    ) -> AdapterResult<Arc<dyn ServiceAdapter>> {
        if let Some(adapter) = self.adapters.read().await.get(&service_id) {
            debug!("♻️ Using cached {} adapter for service {}", kind, service_id);
            return Ok(Arc::clone(adapter));
        }

        let mut adapters = self.adapters.write().await;
        // Re-check under the write lock: another caller may have created
        // the adapter while we were waiting.
        if let Some(adapter) = adapters.get(&service_id) {
            return Ok(Arc::clone(adapter));
        }
        let adapter = self.factory.create_adapter(kind, config)?;
        adapters.insert(service_id, Arc::clone(&adapter));
        Ok(adapter)
    }

    pub async fn get(&self, service_id: &Uuid) -> Option<Arc<dyn ServiceAdapter>> {
        self.adapters.read().await.get(service_id).cloned()
    }

    /// Drop a service's adapter (e.g. when its record is deleted),
    /// disconnecting it first.
    pub async fn remove(&self, service_id: &Uuid) -> bool {
        let removed = self.adapters.write().await.remove(service_id);
        match removed {
            Some(adapter) => {
                adapter.disconnect().await;
                debug!("🧹 Removed {} adapter for service {}", adapter.name(), service_id);
                true
            }
            None => false,
        }
    }

    /// Reconfigure a service in place, keeping the cached instance (and
    /// its session state machinery) alive.
    pub async fn reconfigure(&self, service_id: &Uuid, config: AdapterConfig) -> AdapterResult<bool> {
        match self.get(service_id).await {
            Some(adapter) => {
                adapter.update_config(config).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn len(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.adapters.read().await.is_empty()
    }

    pub async fn clear(&self) {
        debug!("🧹 Clearing adapter registry");
        self.adapters.write().await.clear();
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
