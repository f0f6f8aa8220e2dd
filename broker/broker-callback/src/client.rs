//! `ModuleRegistrationProbe` implementation: resolves a module name through
//! the discovery store, dials (or reuses) a cached channel, and invokes the
//! module's own `GetServiceRegistration` RPC.

use std::sync::Arc;

use async_trait::async_trait;
use broker_contracts::error::DomainError;
use broker_contracts::model::ServiceRegistrationMetadata;
use broker_contracts::traits::{DiscoveryStore, ModuleRegistrationProbe};
use broker_module_proto::{GetServiceRegistrationRequest, ModuleRegistrationClient};
use broker_transport_grpc::{DEFAULT_FLOW_CONTROL_WINDOW, GrpcClientConfig, connect_with_stack};

use crate::cache::{ChannelCache, ChannelCacheError};

/// Calls back into healthy module instances. Owns the channel cache for
/// the lifetime of the process; `shutdown` must be called during teardown.
pub struct ModuleCallbackClient {
    discovery: Arc<dyn DiscoveryStore>,
    cache: ChannelCache,
    transport_cfg: GrpcClientConfig,
}

impl ModuleCallbackClient {
    #[must_use]
    pub fn new(discovery: Arc<dyn DiscoveryStore>) -> Self {
        let transport_cfg =
            GrpcClientConfig::new("module_callback").with_flow_control_window(DEFAULT_FLOW_CONTROL_WINDOW);
        Self { discovery, cache: ChannelCache::new(), transport_cfg }
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }

    /// Periodic maintenance: evict idle channels. Callers run this on a
    /// fixed interval (e.g. every minute) from a background task.
    pub fn sweep_idle_channels(&self) {
        self.cache.sweep_expired();
    }
}

#[async_trait]
impl ModuleRegistrationProbe for ModuleCallbackClient {
    async fn fetch_module_metadata(&self, module_name: &str) -> Result<ServiceRegistrationMetadata, DomainError> {
        let healthy = self.discovery.list_healthy_instances(module_name).await?;
        let instance = healthy
            .entries
            .first()
            .ok_or_else(|| DomainError::ModuleNotFound { name: module_name.to_string() })?;

        let uri = format!("http://{}:{}", instance.host, instance.port);
        let cfg = self.transport_cfg.clone();

        let channel = self
            .cache
            .get_or_create(module_name, || async move {
                let endpoint_channel: tonic::transport::Channel =
                    connect_with_stack::<tonic::transport::Channel>(uri, &cfg).await?;
                Ok(endpoint_channel)
            })
            .await
            .map_err(|e| match e {
                ChannelCacheError::ShuttingDown => {
                    DomainError::CallbackFailed("module callback client is shutting down".to_string())
                }
                ChannelCacheError::Connect(err) => DomainError::CallbackFailed(err.to_string()),
            })?;

        let mut client = ModuleRegistrationClient::new(channel);
        let response = client
            .get_service_registration(GetServiceRegistrationRequest {})
            .await
            .map_err(|status| DomainError::CallbackFailed(status.to_string()))?
            .into_inner();

        Ok(ServiceRegistrationMetadata {
            module_name: response.module_name,
            version: response.version,
            json_config_schema: Some(response.json_config_schema).filter(|s| !s.is_empty()),
            display_name: Some(response.display_name).filter(|s| !s.is_empty()),
            description: Some(response.description).filter(|s| !s.is_empty()),
            owner: Some(response.owner).filter(|s| !s.is_empty()),
            documentation_url: Some(response.documentation_url).filter(|s| !s.is_empty()),
            tags: response.tags,
            dependencies: response.dependencies,
            metadata: response.metadata.into_iter().collect(),
        })
    }
}
