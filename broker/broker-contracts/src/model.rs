//! Core data model shared by the coordinator and every adapter.
//!
//! Field and type names here are part of the wire contract described by the
//! broker's gRPC surface; keep them stable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Which kind of registrant a `Register` call is announcing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrantKind {
    Unspecified,
    Service,
    Module,
}

impl RegistrantKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Service => "SERVICE",
            Self::Module => "MODULE",
        }
    }
}

/// Where peers should dial a registrant, and where the discovery store's
/// health probe should dial it (which may differ, e.g. container bridge
/// addresses).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connectivity {
    pub advertised_host: String,
    pub advertised_port: u16,
    pub internal_host: Option<String>,
    pub internal_port: Option<u16>,
    pub tls_enabled: bool,
}

impl Connectivity {
    /// The host/port the discovery store and its health probe must use.
    #[must_use]
    pub fn probe_host_port(&self) -> (&str, u16) {
        match (&self.internal_host, self.internal_port) {
            (Some(host), Some(port)) => (host.as_str(), port),
            _ => (self.advertised_host.as_str(), self.advertised_port),
        }
    }
}

/// One HTTP endpoint a registrant exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub health_path: String,
    pub tls_enabled: bool,
}

/// A `Register` request as parsed off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub kind: RegistrantKind,
    pub connectivity: Connectivity,
    pub version: String,
    pub metadata: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub http_endpoints: Vec<HttpEndpoint>,
    pub http_schema: Option<String>,
    pub http_schema_artifact_id: Option<String>,
    pub http_schema_version: Option<String>,
}

/// Compute the deterministic service id `"{name}-{host}-{port}"` from the
/// *advertised* triple. Identical triples always yield identical ids.
#[must_use]
pub fn service_id(name: &str, advertised_host: &str, advertised_port: u16) -> String {
    format!("{name}-{advertised_host}-{advertised_port}")
}

/// Status of a module row as tracked in the metadata repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleStatus {
    Active,
    Inactive,
}

/// Relational row for a registered module (C5's `modules` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRow {
    pub service_id: String,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub version: String,
    pub config_schema_id: Option<String>,
    pub metadata: serde_json::Value,
    pub registered_at: chrono::DateTime<chrono::Utc>,
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    pub status: ModuleStatus,
}

/// Sync state of a schema row against the external schema archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

/// Relational row for a versioned config schema (C5's `config_schemas`
/// table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchemaRow {
    pub schema_id: String,
    pub service_name: String,
    pub schema_version: String,
    pub json_schema: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub created_by: Option<String>,
    pub archive_artifact_id: Option<String>,
    pub archive_global_id: Option<i64>,
    pub sync_status: SyncStatus,
    pub last_sync_attempt: Option<chrono::DateTime<chrono::Utc>>,
    pub sync_error: Option<String>,
}

/// Derive the deterministic schema id `"{service_name}-{schema_version}"`
/// after sanitizing any `.` in the version to `_`.
#[must_use]
pub fn schema_id(service_name: &str, schema_version: &str) -> String {
    format!("{service_name}-{}", sanitize_dots(schema_version))
}

/// Replace `.` with `_`; the discovery store's metadata-key alphabet (and,
/// by convention here, schema/artifact ids derived from version strings)
/// forbid literal dots.
#[must_use]
pub fn sanitize_dots(s: &str) -> String {
    s.replace('.', "_")
}

/// Undo the dot sanitization on read-back from the discovery store.
#[must_use]
pub fn desanitize_dots(s: &str) -> String {
    s.replace('_', ".")
}

/// The ordered event-type enumeration from the wire contract. Order is
/// significant: within one stream, events are emitted in non-decreasing
/// position in this list (never regressing), with `Failed` terminating the
/// stream from any position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Started,
    Validated,
    ConsulRegistered,
    HealthCheckConfigured,
    ConsulHealthy,
    MetadataRetrieved,
    SchemaValidated,
    DatabaseSaved,
    ApicurioRegistered,
    Completed,
    Failed,
}

/// One progress element of a `Register` response stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationEvent {
    pub event_type: EventType,
    pub message: String,
    pub service_id: Option<String>,
    pub error_detail: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl RegistrationEvent {
    #[must_use]
    pub fn new(event_type: EventType, message: impl Into<String>, service_id: Option<String>) -> Self {
        Self {
            event_type,
            message: message.into(),
            service_id,
            error_detail: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>, service_id: Option<String>, error_detail: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Failed,
            message: message.into(),
            service_id,
            error_detail: Some(error_detail.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Result of `Unregister`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Metadata returned by the module callback (`GetServiceRegistration`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRegistrationMetadata {
    pub module_name: String,
    pub version: String,
    pub json_config_schema: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub documentation_url: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

/// One instance as reconstructed from the discovery store's flat metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub service_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub version: Option<String>,
    pub tags: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub http_endpoints: Vec<HttpEndpoint>,
    pub http_schema_artifact_id: Option<String>,
    pub http_schema_version: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub is_module: bool,
    pub healthy: bool,
}

/// A snapshot returned by `list_services`/`list_modules`/the watch streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub entries: Vec<CatalogEntry>,
    pub as_of: chrono::DateTime<chrono::Utc>,
    pub total_count: usize,
}

/// Request to `resolve()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub name: String,
    pub required_tags: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub prefer_local: bool,
}

/// Response from `resolve()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub found: bool,
    pub host: String,
    pub port: u16,
    pub service_id: String,
    pub version: Option<String>,
    pub tags: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    pub http_endpoints: Vec<HttpEndpoint>,
    pub http_schema_artifact_id: Option<String>,
    pub http_schema_version: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub selection_reason: String,
    pub resolved_at: chrono::DateTime<chrono::Utc>,
}

impl ResolveResponse {
    #[must_use]
    pub fn not_found(reason: impl Into<String>, total_instances: usize, healthy_instances: usize) -> Self {
        Self {
            found: false,
            host: String::new(),
            port: 0,
            service_id: String::new(),
            version: None,
            tags: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            http_endpoints: Vec::new(),
            http_schema_artifact_id: None,
            http_schema_version: None,
            metadata: BTreeMap::new(),
            total_instances,
            healthy_instances,
            selection_reason: reason.into(),
            resolved_at: chrono::Utc::now(),
        }
    }
}

/// Request to the schema-retrieval cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModuleSchemaRequest {
    pub module_name: String,
    pub version: Option<String>,
}

/// Response from the schema-retrieval cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModuleSchemaResponse {
    pub module_name: String,
    pub schema_version: String,
    pub schema_json: serde_json::Value,
    pub created_by: Option<String>,
    pub sync_status: Option<SyncStatus>,
    pub artifact_id: Option<String>,
}

/// Metadata about an archived artifact (C6's `get_artifact_metadata`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact_id: String,
    pub global_id: Option<i64>,
    pub version: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Synthesize the minimal default OpenAPI 3.1 config schema document used
/// whenever no real schema is available (module callback returned blank, or
/// the schema cascade is exhausted).
#[must_use]
pub fn synthesize_default_schema(name: &str) -> serde_json::Value {
    serde_json::json!({
        "openapi": "3.1.0",
        "info": {
            "title": format!("{name} Configuration"),
            "version": "1.0.0"
        },
        "paths": {},
        "components": {
            "schemas": {
                "Config": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                }
            }
        }
    })
}
