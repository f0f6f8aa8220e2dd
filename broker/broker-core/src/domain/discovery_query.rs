//! Discovery Query & Watch (C7): listing, lookup, filtered resolution,
//! change-watch streams, and the module config-schema retrieval cascade.

use std::sync::Arc;
use std::time::Duration;

use broker_contracts::error::DomainError;
use broker_contracts::model::{
    self, CatalogEntry, CatalogSnapshot, GetModuleSchemaRequest, GetModuleSchemaResponse, ResolveRequest,
    ResolveResponse,
};
use broker_contracts::traits::{DiscoveryStore, MetadataRepository, ModuleRegistrationProbe, SchemaArchiveClient};
use tokio_stream::wrappers::ReceiverStream;

const WATCH_INTERVAL: Duration = Duration::from_secs(2);
const WATCH_CHANNEL_CAPACITY: usize = 4;

/// Reads back the discovery store's catalog and serves the multi-tier
/// schema-retrieval cascade for modules.
#[derive(Clone)]
pub struct DiscoveryQueryService {
    discovery: Arc<dyn DiscoveryStore>,
    metadata: Arc<dyn MetadataRepository>,
    archive: Arc<dyn SchemaArchiveClient>,
    callback: Arc<dyn ModuleRegistrationProbe>,
}

impl DiscoveryQueryService {
    #[must_use]
    pub fn new(
        discovery: Arc<dyn DiscoveryStore>,
        metadata: Arc<dyn MetadataRepository>,
        archive: Arc<dyn SchemaArchiveClient>,
        callback: Arc<dyn ModuleRegistrationProbe>,
    ) -> Self {
        Self { discovery, metadata, archive, callback }
    }

    /// # Errors
    /// Propagates `DomainError` from the discovery store.
    pub async fn list_services(&self, name_filter: Option<&str>) -> Result<CatalogSnapshot, DomainError> {
        self.list_by_kind(name_filter, false).await
    }

    /// # Errors
    /// Propagates `DomainError` from the discovery store.
    pub async fn list_modules(&self, name_filter: Option<&str>) -> Result<CatalogSnapshot, DomainError> {
        self.list_by_kind(name_filter, true).await
    }

    async fn list_by_kind(&self, name_filter: Option<&str>, modules_only: bool) -> Result<CatalogSnapshot, DomainError> {
        let snapshot = self.discovery.list_catalog(name_filter).await?;
        let entries: Vec<CatalogEntry> = snapshot.entries.into_iter().filter(|e| e.is_module == modules_only).collect();
        Ok(CatalogSnapshot { total_count: entries.len(), entries, as_of: snapshot.as_of })
    }

    /// # Errors
    /// `DomainError::NotFound` if no healthy, non-module instance of `name`
    /// exists; otherwise propagates the discovery store's error.
    pub async fn get_service_by_name(&self, name: &str) -> Result<CatalogEntry, DomainError> {
        self.get_by_name(name, false).await
    }

    /// # Errors
    /// `DomainError::NotFound` if no healthy module instance of `name`
    /// exists; otherwise propagates the discovery store's error.
    pub async fn get_module_by_name(&self, name: &str) -> Result<CatalogEntry, DomainError> {
        self.get_by_name(name, true).await
    }

    async fn get_by_name(&self, name: &str, modules_only: bool) -> Result<CatalogEntry, DomainError> {
        let snapshot = self.discovery.list_healthy_instances(name).await?;
        snapshot
            .entries
            .into_iter()
            .find(|e| e.is_module == modules_only)
            .ok_or_else(|| DomainError::NotFound { name: name.to_string() })
    }

    /// # Errors
    /// `DomainError::NotFound` if `service_id` cannot be resolved to a
    /// healthy, non-module instance.
    pub async fn get_service_by_id(&self, service_id: &str) -> Result<CatalogEntry, DomainError> {
        self.get_by_id(service_id, false).await
    }

    /// # Errors
    /// `DomainError::NotFound` if `service_id` cannot be resolved to a
    /// healthy module instance.
    pub async fn get_module_by_id(&self, service_id: &str) -> Result<CatalogEntry, DomainError> {
        self.get_by_id(service_id, true).await
    }

    async fn get_by_id(&self, service_id: &str, modules_only: bool) -> Result<CatalogEntry, DomainError> {
        let name = name_from_service_id(service_id)
            .ok_or_else(|| DomainError::ServiceNotFound { service_id: service_id.to_string() })?;
        let snapshot = self.discovery.list_healthy_instances(name).await?;
        snapshot
            .entries
            .into_iter()
            .find(|e| e.service_id == service_id && e.is_module == modules_only)
            .ok_or_else(|| DomainError::ServiceNotFound { service_id: service_id.to_string() })
    }

    /// Filters the healthy set for `request.name` by required tags
    /// (containment) and required capabilities, preferring a localhost
    /// instance when `prefer_local` is set, else the first remaining
    /// instance in the store's iteration order (no guaranteed LB strategy).
    ///
    /// # Errors
    /// Propagates `DomainError` from the discovery store; an empty or
    /// fully-filtered result set is reported via `ResolveResponse::found =
    /// false`, not as an error.
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, DomainError> {
        let snapshot = self.discovery.list_healthy_instances(&request.name).await?;
        let total_instances = snapshot.entries.len();
        if total_instances == 0 {
            return Ok(ResolveResponse::not_found("No healthy instances found", 0, 0));
        }
        let healthy_instances = snapshot.entries.iter().filter(|e| e.healthy).count();

        let matches: Vec<CatalogEntry> = snapshot
            .entries
            .into_iter()
            .filter(|e| request.required_tags.iter().all(|t| e.tags.contains(t)))
            .filter(|e| request.required_capabilities.iter().all(|c| e.capabilities.contains(c)))
            .collect();
        if matches.is_empty() {
            return Ok(ResolveResponse::not_found("No instances match the required criteria", total_instances, healthy_instances));
        }

        let picked = if request.prefer_local {
            matches.iter().find(|e| e.host == "localhost" || e.host == "127.0.0.1").or_else(|| matches.first())
        } else {
            matches.first()
        };
        let Some(chosen) = picked else { unreachable!("matches was checked non-empty above") };

        Ok(ResolveResponse {
            found: true,
            host: chosen.host.clone(),
            port: chosen.port,
            service_id: chosen.service_id.clone(),
            version: chosen.version.clone(),
            tags: chosen.tags.clone(),
            capabilities: chosen.capabilities.clone(),
            http_endpoints: chosen.http_endpoints.clone(),
            http_schema_artifact_id: chosen.http_schema_artifact_id.clone(),
            http_schema_version: chosen.http_schema_version.clone(),
            metadata: chosen.metadata.clone(),
            total_instances,
            healthy_instances,
            selection_reason: "first matching instance".to_string(),
            resolved_at: chrono::Utc::now(),
        })
    }

    /// A lazy, cancellable sequence of catalog snapshots: an immediate
    /// snapshot, then one every 2 s. An inner listing failure is recovered
    /// with an empty snapshot; the stream never terminates on its own —
    /// dropping the returned stream is how a caller cancels the watch.
    #[must_use]
    pub fn watch_services(&self, name_filter: Option<String>) -> ReceiverStream<CatalogSnapshot> {
        self.watch_by_kind(name_filter, false)
    }

    #[must_use]
    pub fn watch_modules(&self, name_filter: Option<String>) -> ReceiverStream<CatalogSnapshot> {
        self.watch_by_kind(name_filter, true)
    }

    fn watch_by_kind(&self, name_filter: Option<String>, modules_only: bool) -> ReceiverStream<CatalogSnapshot> {
        let (tx, rx) = tokio::sync::mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCH_INTERVAL);
            loop {
                let snapshot = this
                    .list_by_kind(name_filter.as_deref(), modules_only)
                    .await
                    .unwrap_or_else(|err| {
                        tracing::warn!(error = %err, "watch listing failed, emitting empty snapshot");
                        CatalogSnapshot { entries: vec![], as_of: chrono::Utc::now(), total_count: 0 }
                    });
                if tx.send(snapshot).await.is_err() {
                    return;
                }
                ticker.tick().await;
            }
        });
        ReceiverStream::new(rx)
    }

    /// Resolves a module's current config schema through the cascade:
    /// metadata repository → schema archive → live callback → synthesized
    /// default.
    ///
    /// # Errors
    /// `DomainError::SchemaNotFound` when every tier is exhausted. Archive
    /// failures never surface directly; they fall through to the next tier.
    /// A callback failure on the last tier is different: it bottoms out the
    /// cascade, so its error is preserved as the `NotFound`'s source chain
    /// (the top-level status/message are unchanged).
    pub async fn get_module_schema(&self, request: &GetModuleSchemaRequest) -> Result<GetModuleSchemaResponse, DomainError> {
        if let Some(resp) = self.schema_from_repository(request).await? {
            return Ok(resp);
        }
        if let Some(resp) = self.schema_from_archive(request).await {
            return Ok(resp);
        }
        let not_found_name =
            format!("Module schema not found: {}. Module may not be running or registered.", request.module_name);
        match self.schema_from_callback(request).await {
            Ok(resp) => Ok(resp),
            Err(callback_err) => Err(DomainError::SchemaNotFound { name: not_found_name, source: Some(callback_err.into()) }),
        }
    }

    async fn schema_from_repository(
        &self,
        request: &GetModuleSchemaRequest,
    ) -> Result<Option<GetModuleSchemaResponse>, DomainError> {
        let row = match &request.version {
            Some(version) => {
                let schema_id = model::schema_id(&request.module_name, version);
                self.metadata.find_schema_by_id(&schema_id).await?
            }
            None => self.metadata.find_latest_schema_by_name(&request.module_name).await?,
        };
        Ok(row.map(|row| GetModuleSchemaResponse {
            module_name: request.module_name.clone(),
            schema_version: row.schema_version,
            schema_json: row.json_schema,
            created_by: row.created_by,
            sync_status: Some(row.sync_status),
            artifact_id: row.archive_artifact_id,
        }))
    }

    async fn schema_from_archive(&self, request: &GetModuleSchemaRequest) -> Option<GetModuleSchemaResponse> {
        let version = request.version.as_deref();
        let schema_json = match self.archive.get_schema_by_name(&request.module_name, version).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(module = %request.module_name, error = %err, "archive schema lookup failed, falling through");
                return None;
            }
        };
        let metadata = self.archive.get_artifact_metadata(&request.module_name).await.ok().flatten();
        Some(GetModuleSchemaResponse {
            module_name: request.module_name.clone(),
            schema_version: metadata.as_ref().map_or_else(|| version.unwrap_or("latest").to_string(), |m| m.version.clone()),
            schema_json,
            created_by: None,
            sync_status: None,
            artifact_id: metadata.map(|m| m.artifact_id),
        })
    }

    async fn schema_from_callback(&self, request: &GetModuleSchemaRequest) -> Result<GetModuleSchemaResponse, DomainError> {
        let meta = self.callback.fetch_module_metadata(&request.module_name).await.inspect_err(|err| {
            tracing::debug!(module = %request.module_name, error = %err, "live callback failed, schema cascade exhausted");
        })?;
        let schema_json = meta
            .json_config_schema
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map_or_else(
                || model::synthesize_default_schema(&request.module_name),
                |raw| serde_json::from_str(raw).unwrap_or_else(|_| model::synthesize_default_schema(&request.module_name)),
            );
        Ok(GetModuleSchemaResponse {
            module_name: request.module_name.clone(),
            schema_version: meta.version,
            schema_json,
            created_by: None,
            sync_status: None,
            artifact_id: None,
        })
    }
}

/// Extract the registrant name from a `"{name}-{host}-{port}"` service id by
/// splitting at the last two dashes.
fn name_from_service_id(service_id: &str) -> Option<&str> {
    let mut parts = service_id.rsplitn(3, '-');
    let _port = parts.next()?;
    let _host = parts.next()?;
    let name = parts.next()?;
    (!name.is_empty()).then_some(name)
}
