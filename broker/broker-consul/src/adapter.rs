//! Production `DiscoveryStore` implementation backed by the `consul` crate.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use broker_contracts::error::DomainError;
use broker_contracts::model::{CatalogSnapshot, RegisterRequest};
use broker_contracts::traits::DiscoveryStore;
use consul::agent::{Agent, AgentServiceCheck, Register};
use consul::catalog::Catalog;
use consul::health::Health;
use consul::{Client, Config};

use crate::config::ConsulConfig;
use crate::encoding::{HealthCheckSpec, build_health_check, build_meta, build_tags, decode_catalog_entry};

const CHECK_INTERVAL: &str = "10s";
const DEREGISTER_AFTER: &str = "1m";

/// Talks to the discovery store over its HTTP agent/catalog/health APIs.
pub struct ConsulDiscoveryStore {
    client: Client,
}

impl ConsulDiscoveryStore {
    /// # Errors
    /// Returns an error if the underlying client configuration cannot be
    /// constructed (malformed address).
    pub fn new(cfg: &ConsulConfig) -> anyhow::Result<Self> {
        let mut config = Config::new()?;
        config.address = cfg.address();
        config.datacenter = cfg.datacenter.clone();
        config.token = cfg.token.clone();
        Ok(Self { client: Client::new(config) })
    }

    /// The agent `deregister` call is itself idempotent (Consul answers 200
    /// for an unknown id), so existence must be checked up front to report
    /// `Unregister` of a nonexistent id as `success = false` rather than a
    /// silent no-op success.
    async fn instance_exists(&self, service_id: &str) -> Result<bool, DomainError> {
        let (service_names, _meta) = Catalog::services(&self.client, None)
            .await
            .map_err(|e| DomainError::DiscoveryStoreUnavailable(e.to_string()))?;
        for name in service_names.keys() {
            let (services, _) = Catalog::service(&self.client, name, None, None)
                .await
                .map_err(|e| DomainError::DiscoveryStoreUnavailable(e.to_string()))?;
            if services.iter().any(|svc| svc.ServiceID == service_id) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl DiscoveryStore for ConsulDiscoveryStore {
    async fn register(&self, request: &RegisterRequest, service_id: &str) -> Result<(), DomainError> {
        let (address, port) = request.connectivity.probe_host_port();
        let tags = build_tags(request);
        let meta: HashMap<String, String> = build_meta(request).into_iter().collect();

        let check = match build_health_check(request) {
            HealthCheckSpec::Http { url } => AgentServiceCheck {
                HTTP: Some(url),
                Interval: Some(CHECK_INTERVAL.to_string()),
                DeregisterCriticalServiceAfter: Some(DEREGISTER_AFTER.to_string()),
                ..AgentServiceCheck::default()
            },
            HealthCheckSpec::Grpc { target } => AgentServiceCheck {
                GRPC: Some(target),
                Interval: Some(CHECK_INTERVAL.to_string()),
                DeregisterCriticalServiceAfter: Some(DEREGISTER_AFTER.to_string()),
                ..AgentServiceCheck::default()
            },
        };

        let registration = Register {
            ID: Some(service_id.to_string()),
            Name: request.name.clone(),
            Address: Some(address.to_string()),
            Port: Some(port),
            Tags: Some(tags),
            Meta: Some(meta),
            Check: Some(check),
            ..Register::default()
        };

        self.client
            .register(&registration, None)
            .await
            .map_err(|e| DomainError::DiscoveryStoreUnavailable(e.to_string()))
    }

    async fn deregister(&self, service_id: &str) -> Result<bool, DomainError> {
        if !self.instance_exists(service_id).await? {
            return Ok(false);
        }
        match self.client.deregister(service_id, None).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(service_id, error = %e, "discovery store deregister failed");
                Err(DomainError::DiscoveryStoreUnavailable(e.to_string()))
            }
        }
    }

    async fn list_catalog(&self, name_filter: Option<&str>) -> Result<CatalogSnapshot, DomainError> {
        let (service_names, _meta) = Catalog::services(&self.client, None)
            .await
            .map_err(|e| DomainError::DiscoveryStoreUnavailable(e.to_string()))?;

        let mut entries = Vec::new();
        for name in service_names.keys() {
            if let Some(filter) = name_filter {
                if name != filter {
                    continue;
                }
            }
            let (services, _) = Catalog::service(&self.client, name, None, None)
                .await
                .map_err(|e| DomainError::DiscoveryStoreUnavailable(e.to_string()))?;
            for svc in services {
                let meta: BTreeMap<String, String> = svc.ServiceMeta.into_iter().collect();
                entries.push(decode_catalog_entry(
                    &svc.ServiceID,
                    &svc.ServiceName,
                    &svc.ServiceAddress,
                    svc.ServicePort,
                    &svc.ServiceTags,
                    &meta,
                    true,
                ));
            }
        }

        let total_count = entries.len();
        Ok(CatalogSnapshot { entries, as_of: chrono::Utc::now(), total_count })
    }

    async fn list_healthy_instances(&self, name: &str) -> Result<CatalogSnapshot, DomainError> {
        let (entries_raw, _) = Health::service(&self.client, name, None, true, None)
            .await
            .map_err(|e| DomainError::DiscoveryStoreUnavailable(e.to_string()))?;

        let entries = entries_raw
            .into_iter()
            .map(|entry| {
                let meta: BTreeMap<String, String> = entry.Service.Meta.into_iter().collect();
                decode_catalog_entry(
                    &entry.Service.ID,
                    &entry.Service.Service,
                    &entry.Service.Address,
                    entry.Service.Port,
                    &entry.Service.Tags,
                    &meta,
                    true,
                )
            })
            .collect::<Vec<_>>();

        let total_count = entries.len();
        Ok(CatalogSnapshot { entries, as_of: chrono::Utc::now(), total_count })
    }

    async fn is_healthy(&self) -> bool {
        Catalog::services(&self.client, None).await.is_ok()
    }
}
