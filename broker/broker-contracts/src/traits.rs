//! Adapter trait interfaces. The coordinator and discovery-query services in
//! `broker-core` depend only on these traits; each `broker/broker-*` adapter
//! crate provides one production implementation, and tests provide
//! in-memory fakes.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::model::{
    ArtifactMetadata, CatalogSnapshot, ConfigSchemaRow, ModuleRow, RegisterRequest, ServiceRegistrationMetadata,
};

/// C2: registers/deregisters instances with the discovery store and reads
/// back the catalog.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    /// Register a service or module instance. Idempotent on `service_id`.
    async fn register(&self, request: &RegisterRequest, service_id: &str) -> Result<(), DomainError>;

    /// Remove an instance by its deterministic id. Idempotent: returns
    /// `Ok(true)` when an instance existed and was removed, `Ok(false)`
    /// when no such instance was registered (not an error).
    async fn deregister(&self, service_id: &str) -> Result<bool, DomainError>;

    /// All instances known to the store, healthy or not.
    async fn list_catalog(&self, name_filter: Option<&str>) -> Result<CatalogSnapshot, DomainError>;

    /// Only instances currently passing health checks.
    async fn list_healthy_instances(&self, name: &str) -> Result<CatalogSnapshot, DomainError>;

    /// Whether the store itself is reachable.
    async fn is_healthy(&self) -> bool;
}

/// C4: calls back into a registered module to retrieve its self-declared
/// metadata during registration.
#[async_trait]
pub trait ModuleRegistrationProbe: Send + Sync {
    /// Resolve `module_name` against the discovery store, open (or reuse) a
    /// cached gRPC channel to a healthy instance, and invoke its
    /// `GetServiceRegistration` RPC.
    async fn fetch_module_metadata(&self, module_name: &str) -> Result<ServiceRegistrationMetadata, DomainError>;
}

/// C5: durable storage for module rows and config schema rows.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Within a single transaction: upsert the module row on `service_id`,
    /// upsert a matching schema row on `(service_name, schema_version)` with
    /// `sync_status = PENDING`, point the module row's `config_schema_id`
    /// at it, and return the saved module row.
    async fn register_module(&self, module: &ModuleRow, schema: &ConfigSchemaRow) -> Result<ModuleRow, DomainError>;

    async fn upsert_module(&self, row: &ModuleRow) -> Result<(), DomainError>;

    async fn mark_module_inactive(&self, service_id: &str) -> Result<(), DomainError>;

    async fn find_module_by_id(&self, service_id: &str) -> Result<Option<ModuleRow>, DomainError>;

    async fn find_module_by_name(&self, name: &str) -> Result<Option<ModuleRow>, DomainError>;

    async fn list_modules(&self) -> Result<Vec<ModuleRow>, DomainError>;

    async fn upsert_schema(&self, row: &ConfigSchemaRow) -> Result<(), DomainError>;

    async fn find_schema_by_id(&self, schema_id: &str) -> Result<Option<ConfigSchemaRow>, DomainError>;

    async fn find_latest_schema_by_name(&self, service_name: &str) -> Result<Option<ConfigSchemaRow>, DomainError>;

    async fn mark_schema_synced(
        &self,
        schema_id: &str,
        artifact_id: &str,
        global_id: Option<i64>,
    ) -> Result<(), DomainError>;

    async fn mark_schema_failed(&self, schema_id: &str, error: &str) -> Result<(), DomainError>;

    /// Whether the backing store is reachable.
    async fn is_healthy(&self) -> bool;
}

/// C6: publishes and retrieves config schemas from the external schema
/// archive. Every failure mode (transport, auth, not-found, conflict,
/// serialization) surfaces as `DomainError::ArchiveUnavailable` carrying a
/// message that names the offending service/artifact; callers that need to
/// distinguish archive failures from other domain errors should match on
/// that variant.
#[async_trait]
pub trait SchemaArchiveClient: Send + Sync {
    /// Artifact id derived as `"{service_name}-config-v{sanitized_version}"`.
    async fn create_or_update(
        &self,
        service_name: &str,
        version: &str,
        json_schema: &serde_json::Value,
    ) -> Result<ArtifactMetadata, DomainError>;

    /// Same derivation, with an explicit artifact base instead of
    /// `service_name` (used by the HTTP-schema path: base = `"{name}-http"`).
    async fn create_or_update_with_artifact_base(
        &self,
        artifact_base: &str,
        version: &str,
        json_schema: &serde_json::Value,
    ) -> Result<ArtifactMetadata, DomainError>;

    /// Caller fully owns the artifact id; no derivation applied.
    async fn create_or_update_with_artifact_id(
        &self,
        artifact_id: &str,
        version: &str,
        json_schema: &serde_json::Value,
    ) -> Result<ArtifactMetadata, DomainError>;

    /// `version` of `None` or `Some("latest")` resolves to the newest
    /// version recorded for the derived artifact id.
    async fn get_schema_by_name(
        &self,
        service_name: &str,
        version: Option<&str>,
    ) -> Result<Option<serde_json::Value>, DomainError>;

    async fn get_schema_by_artifact_id(
        &self,
        artifact_id: &str,
        version: Option<&str>,
    ) -> Result<Option<serde_json::Value>, DomainError>;

    async fn get_artifact_metadata(&self, service_name: &str) -> Result<Option<ArtifactMetadata>, DomainError>;

    async fn is_healthy(&self) -> bool;
}

/// Fire-and-forget notifications of registration lifecycle events onto the
/// event bus. Publish failures must never fail a registration; implementors
/// log and swallow them.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn emit_service_registered(&self, service_id: &str, name: &str);

    async fn emit_service_unregistered(&self, service_id: &str, name: &str);

    async fn emit_module_registered(&self, service_id: &str, name: &str);

    async fn emit_module_unregistered(&self, service_id: &str, name: &str);
}
