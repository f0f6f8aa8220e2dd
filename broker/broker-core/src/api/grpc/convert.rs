//! Conversions between the wire types generated from `broker.proto` and the
//! domain model in `broker_contracts::model`.

use broker_contracts::model as dm;
use broker_proto::v1 as pb;
use tonic::Status;

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn port_from_u32(port: u32) -> Result<u16, Status> {
    u16::try_from(port).map_err(|_| Status::invalid_argument(format!("port {port} out of range")))
}

impl From<pb::HttpEndpoint> for dm::HttpEndpoint {
    fn from(ep: pb::HttpEndpoint) -> Self {
        Self {
            scheme: ep.scheme,
            host: ep.host,
            port: u16::try_from(ep.port).unwrap_or(0),
            base_path: ep.base_path,
            health_path: ep.health_path,
            tls_enabled: ep.tls_enabled,
        }
    }
}

impl From<dm::HttpEndpoint> for pb::HttpEndpoint {
    fn from(ep: dm::HttpEndpoint) -> Self {
        Self {
            scheme: ep.scheme,
            host: ep.host,
            port: u32::from(ep.port),
            base_path: ep.base_path,
            health_path: ep.health_path,
            tls_enabled: ep.tls_enabled,
        }
    }
}

impl TryFrom<pb::RegisterRequest> for dm::RegisterRequest {
    type Error = Status;

    fn try_from(req: pb::RegisterRequest) -> Result<Self, Status> {
        let kind = match req.kind() {
            pb::RegistrantKind::Unspecified => dm::RegistrantKind::Unspecified,
            pb::RegistrantKind::Service => dm::RegistrantKind::Service,
            pb::RegistrantKind::Module => dm::RegistrantKind::Module,
        };
        let advertised_port = port_from_u32(req.advertised_port)?;
        let internal_port = if req.internal_port == 0 { None } else { Some(port_from_u32(req.internal_port)?) };

        Ok(Self {
            name: req.name,
            kind,
            connectivity: dm::Connectivity {
                advertised_host: req.advertised_host,
                advertised_port,
                internal_host: non_empty(req.internal_host),
                internal_port,
                tls_enabled: req.tls_enabled,
            },
            version: req.version,
            metadata: req.metadata.into_iter().collect(),
            tags: req.tags.into_iter().collect(),
            capabilities: req.capabilities.into_iter().collect(),
            http_endpoints: req.http_endpoints.into_iter().map(Into::into).collect(),
            http_schema: non_empty(req.http_schema),
            http_schema_artifact_id: non_empty(req.http_schema_artifact_id),
            http_schema_version: non_empty(req.http_schema_version),
        })
    }
}

impl From<dm::RegistrationEvent> for pb::RegistrationEvent {
    fn from(ev: dm::RegistrationEvent) -> Self {
        let event_type = match ev.event_type {
            dm::EventType::Started => pb::EventType::Started,
            dm::EventType::Validated => pb::EventType::Validated,
            dm::EventType::ConsulRegistered => pb::EventType::ConsulRegistered,
            dm::EventType::HealthCheckConfigured => pb::EventType::HealthCheckConfigured,
            dm::EventType::ConsulHealthy => pb::EventType::ConsulHealthy,
            dm::EventType::MetadataRetrieved => pb::EventType::MetadataRetrieved,
            dm::EventType::SchemaValidated => pb::EventType::SchemaValidated,
            dm::EventType::DatabaseSaved => pb::EventType::DatabaseSaved,
            dm::EventType::ApicurioRegistered => pb::EventType::ApicurioRegistered,
            dm::EventType::Completed => pb::EventType::Completed,
            dm::EventType::Failed => pb::EventType::Failed,
        };
        Self {
            event_type: event_type as i32,
            message: ev.message,
            service_id: ev.service_id.unwrap_or_default(),
            error_detail: ev.error_detail.unwrap_or_default(),
            timestamp_unix_millis: ev.timestamp.timestamp_millis(),
        }
    }
}

impl From<dm::UnregisterResponse> for pb::UnregisterResponse {
    fn from(r: dm::UnregisterResponse) -> Self {
        Self { success: r.success, message: r.message, timestamp_unix_millis: r.timestamp.timestamp_millis() }
    }
}

impl From<dm::CatalogEntry> for pb::ServiceInstance {
    fn from(e: dm::CatalogEntry) -> Self {
        Self {
            service_id: e.service_id,
            name: e.name,
            host: e.host,
            port: u32::from(e.port),
            version: e.version.unwrap_or_default(),
            tags: e.tags.into_iter().collect(),
            capabilities: e.capabilities.into_iter().collect(),
            http_endpoints: e.http_endpoints.into_iter().map(Into::into).collect(),
            http_schema_artifact_id: e.http_schema_artifact_id.unwrap_or_default(),
            http_schema_version: e.http_schema_version.unwrap_or_default(),
            metadata: e.metadata.into_iter().collect(),
            is_module: e.is_module,
            healthy: e.healthy,
        }
    }
}

/// Shared by `ListServices`/`ListModules` (list) and the corresponding watch
/// streams, which reuse the same response shape.
pub fn catalog_snapshot_to_list_response(snapshot: dm::CatalogSnapshot) -> (Vec<pb::ServiceInstance>, i64, u32) {
    let as_of = snapshot.as_of.timestamp_millis();
    let total = u32::try_from(snapshot.total_count).unwrap_or(u32::MAX);
    (snapshot.entries.into_iter().map(Into::into).collect(), as_of, total)
}

impl From<pb::ResolveServiceRequest> for dm::ResolveRequest {
    fn from(req: pb::ResolveServiceRequest) -> Self {
        Self {
            name: req.name,
            required_tags: req.required_tags,
            required_capabilities: req.required_capabilities,
            prefer_local: req.prefer_local,
        }
    }
}

impl From<dm::ResolveResponse> for pb::ResolveServiceResponse {
    fn from(r: dm::ResolveResponse) -> Self {
        Self {
            found: r.found,
            host: r.host,
            port: u32::from(r.port),
            service_id: r.service_id,
            version: r.version.unwrap_or_default(),
            tags: r.tags.into_iter().collect(),
            capabilities: r.capabilities.into_iter().collect(),
            http_endpoints: r.http_endpoints.into_iter().map(Into::into).collect(),
            http_schema_artifact_id: r.http_schema_artifact_id.unwrap_or_default(),
            http_schema_version: r.http_schema_version.unwrap_or_default(),
            metadata: r.metadata.into_iter().collect(),
            total_instances: u32::try_from(r.total_instances).unwrap_or(u32::MAX),
            healthy_instances: u32::try_from(r.healthy_instances).unwrap_or(u32::MAX),
            selection_reason: r.selection_reason,
            resolved_at_unix_millis: r.resolved_at.timestamp_millis(),
        }
    }
}

impl From<pb::GetModuleSchemaRequest> for dm::GetModuleSchemaRequest {
    fn from(req: pb::GetModuleSchemaRequest) -> Self {
        Self { module_name: req.module_name, version: non_empty(req.version) }
    }
}

impl From<dm::GetModuleSchemaResponse> for pb::GetModuleSchemaResponse {
    fn from(r: dm::GetModuleSchemaResponse) -> Self {
        Self {
            module_name: r.module_name,
            schema_version: r.schema_version,
            schema_json: r.schema_json.to_string(),
            created_by: r.created_by.unwrap_or_default(),
            sync_status: r.sync_status.map(sync_status_str).unwrap_or_default().to_string(),
            artifact_id: r.artifact_id.unwrap_or_default(),
        }
    }
}

fn sync_status_str(status: dm::SyncStatus) -> &'static str {
    match status {
        dm::SyncStatus::Pending => "PENDING",
        dm::SyncStatus::Synced => "SYNCED",
        dm::SyncStatus::Failed => "FAILED",
    }
}

/// Extracts `(name_or_id, by_id)` from a `GetServiceRequest`/`GetModuleRequest`
/// oneof identifier field.
pub fn identifier_from_service_request(req: pb::GetServiceRequest) -> Result<(String, bool), Status> {
    match req.identifier {
        Some(pb::get_service_request::Identifier::ServiceName(n)) => Ok((n, false)),
        Some(pb::get_service_request::Identifier::ServiceId(id)) => Ok((id, true)),
        None => Err(Status::invalid_argument("identifier is required")),
    }
}

pub fn identifier_from_module_request(req: pb::GetModuleRequest) -> Result<(String, bool), Status> {
    match req.identifier {
        Some(pb::get_module_request::Identifier::ServiceName(n)) => Ok((n, false)),
        Some(pb::get_module_request::Identifier::ServiceId(id)) => Ok((id, true)),
        None => Err(Status::invalid_argument("identifier is required")),
    }
}

/// Maps a `DomainError` to the `tonic::Status` code it should be reported
/// as: the not-found family maps to `NotFound`, timeouts to
/// `DeadlineExceeded`, everything else to `Unavailable`/`Internal`.
pub fn domain_error_to_status(err: &broker_contracts::error::DomainError) -> Status {
    use broker_contracts::error::DomainError;
    if err.is_not_found() {
        return Status::not_found(err.to_string());
    }
    match err {
        DomainError::InvalidRequest { .. } => Status::invalid_argument(err.to_string()),
        DomainError::Conflict { .. } => Status::already_exists(err.to_string()),
        DomainError::Timeout { .. } => Status::deadline_exceeded(err.to_string()),
        DomainError::DiscoveryStoreUnavailable(_)
        | DomainError::RepositoryUnavailable(_)
        | DomainError::ArchiveUnavailable(_)
        | DomainError::CallbackFailed(_) => Status::unavailable(err.to_string()),
        DomainError::NotFound { .. }
        | DomainError::ServiceNotFound { .. }
        | DomainError::ModuleNotFound { .. }
        | DomainError::SchemaNotFound { .. }
        | DomainError::Internal(_) => Status::internal(err.to_string()),
    }
}
