//! Registration Coordinator (C1): the forward-only streaming state machine
//! that drives one `Register` call end-to-end, and `Unregister`.

use std::sync::Arc;

use broker_contracts::error::DomainError;
use broker_contracts::model::{
    self, ConfigSchemaRow, EventType, ModuleRow, ModuleStatus, RegisterRequest, RegistrantKind, RegistrationEvent,
    ServiceRegistrationMetadata, SyncStatus, UnregisterResponse,
};
use broker_contracts::traits::{DiscoveryStore, EventPublisher, MetadataRepository, ModuleRegistrationProbe, SchemaArchiveClient};
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::domain::health_gate::HealthGate;

/// One best-effort undo action, run LIFO on failure.
type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Drives registration pipelines and owns the compensation stack.
///
/// Holds only shared, `Clone`-cheap handles, so `RegistrationCoordinator`
/// itself is `Clone` and a fresh clone is moved into each spawned `Register`
/// task.
#[derive(Clone)]
pub struct RegistrationCoordinator {
    discovery: Arc<dyn DiscoveryStore>,
    metadata: Arc<dyn MetadataRepository>,
    archive: Arc<dyn SchemaArchiveClient>,
    callback: Arc<dyn ModuleRegistrationProbe>,
    events: Arc<dyn EventPublisher>,
    health_gate: HealthGate,
}

impl RegistrationCoordinator {
    #[must_use]
    pub fn new(
        discovery: Arc<dyn DiscoveryStore>,
        metadata: Arc<dyn MetadataRepository>,
        archive: Arc<dyn SchemaArchiveClient>,
        callback: Arc<dyn ModuleRegistrationProbe>,
        events: Arc<dyn EventPublisher>,
        health_gate: HealthGate,
    ) -> Self {
        Self { discovery, metadata, archive, callback, events, health_gate }
    }

    /// Start a `Register` pipeline on its own task and return the stream of
    /// progress events. The task owns the event-stream sink; dropping the
    /// returned stream cancels the pipeline at its next suspension point.
    #[must_use]
    pub fn register(&self, request: RegisterRequest) -> ReceiverStream<RegistrationEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let this = self.clone();
        tokio::spawn(async move { this.run_register(request, tx).await });
        ReceiverStream::new(rx)
    }

    async fn run_register(&self, request: RegisterRequest, tx: mpsc::Sender<RegistrationEvent>) {
        if tx.send(RegistrationEvent::new(EventType::Started, "registration started", None)).await.is_err() {
            return;
        }

        let Some(service_id) = self.validate_and_emit(&request, &tx).await else { return };

        let mut compensations: Vec<Compensation> = Vec::new();

        if let Err(err) = self.discovery.register(&request, &service_id).await {
            let _ = tx
                .send(RegistrationEvent::failed("discovery store registration failed", Some(service_id), err.to_string()))
                .await;
            return;
        }
        let discovery = Arc::clone(&self.discovery);
        let rollback_id = service_id.clone();
        compensations.push(Box::new(move || {
            Box::pin(async move {
                if let Err(err) = discovery.deregister(&rollback_id).await {
                    tracing::warn!(service_id = %rollback_id, error = %err, "rollback deregister failed");
                }
            })
        }));

        if tx
            .send(RegistrationEvent::new(EventType::ConsulRegistered, "registered with discovery store", Some(service_id.clone())))
            .await
            .is_err()
        {
            self.rollback(compensations).await;
            return;
        }
        if tx
            .send(RegistrationEvent::new(
                EventType::HealthCheckConfigured,
                "health check configured",
                Some(service_id.clone()),
            ))
            .await
            .is_err()
        {
            self.rollback(compensations).await;
            return;
        }

        if !self.health_gate.wait_for_healthy(&request.name, &service_id).await {
            self.rollback(compensations).await;
            let _ = tx
                .send(RegistrationEvent::failed(
                    "health check did not pass before the deadline",
                    Some(service_id),
                    "registered but failed health checks",
                ))
                .await;
            return;
        }
        if tx
            .send(RegistrationEvent::new(EventType::ConsulHealthy, "instance reports healthy", Some(service_id.clone())))
            .await
            .is_err()
        {
            self.rollback(compensations).await;
            return;
        }

        match request.kind {
            RegistrantKind::Service => self.run_service_tail(&request, service_id, compensations, &tx).await,
            RegistrantKind::Module => self.run_module_tail(&request, service_id, compensations, &tx).await,
            RegistrantKind::Unspecified => unreachable!("validate_and_emit rejects Unspecified"),
        }
    }

    /// Validates `request`, emitting `FAILED` and returning `None` on the
    /// first violation, else emits `VALIDATED` and returns the service id.
    async fn validate_and_emit(&self, request: &RegisterRequest, tx: &mpsc::Sender<RegistrationEvent>) -> Option<String> {
        let invalid = request.name.trim().is_empty()
            || matches!(request.kind, RegistrantKind::Unspecified)
            || request.connectivity.advertised_host.trim().is_empty()
            || request.connectivity.advertised_port == 0;
        if invalid {
            let _ = tx.send(RegistrationEvent::failed("validation failed", None, "Missing required fields")).await;
            return None;
        }

        let service_id =
            model::service_id(&request.name, &request.connectivity.advertised_host, request.connectivity.advertised_port);
        tx.send(RegistrationEvent::new(EventType::Validated, "request validated", Some(service_id.clone())))
            .await
            .ok()?;
        Some(service_id)
    }

    async fn run_service_tail(
        &self,
        request: &RegisterRequest,
        service_id: String,
        compensations: Vec<Compensation>,
        tx: &mpsc::Sender<RegistrationEvent>,
    ) {
        if let Some(http_schema) = request.http_schema.as_deref().filter(|s| !s.trim().is_empty()) {
            let artifact_base = request.http_schema_artifact_id.clone().unwrap_or_else(|| format!("{}-http", request.name));
            let version = request.http_schema_version.clone().unwrap_or_else(|| request.version.clone());
            let json = serde_json::Value::String(http_schema.to_string());
            if let Err(err) = self.archive.create_or_update_with_artifact_base(&artifact_base, &version, &json).await {
                tracing::warn!(service_id = %service_id, error = %err, "http schema archive skipped, continuing");
            }
        }

        self.events.emit_service_registered(&service_id, &request.name).await;
        let _ = tx.send(RegistrationEvent::new(EventType::Completed, "service registered", Some(service_id))).await;
        drop(compensations);
    }

    async fn run_module_tail(
        &self,
        request: &RegisterRequest,
        service_id: String,
        mut compensations: Vec<Compensation>,
        tx: &mpsc::Sender<RegistrationEvent>,
    ) {
        let callback_meta = match self.callback.fetch_module_metadata(&request.name).await {
            Ok(meta) => meta,
            Err(err) => {
                self.rollback(compensations).await;
                let _ = tx
                    .send(RegistrationEvent::failed("module callback failed", Some(service_id), err.to_string()))
                    .await;
                return;
            }
        };
        if tx
            .send(RegistrationEvent::new(
                EventType::MetadataRetrieved,
                "module metadata retrieved",
                Some(service_id.clone()),
            ))
            .await
            .is_err()
        {
            self.rollback(compensations).await;
            return;
        }

        let schema_json = derive_schema_json(&callback_meta, &request.name);
        if tx
            .send(RegistrationEvent::new(EventType::SchemaValidated, "config schema validated", Some(service_id.clone())))
            .await
            .is_err()
        {
            self.rollback(compensations).await;
            return;
        }

        let saved = match self.persist_module(request, &service_id, schema_json.clone()).await {
            Ok(saved) => saved,
            Err(err) => {
                self.rollback(compensations).await;
                let _ = tx
                    .send(RegistrationEvent::failed("persisting module metadata failed", Some(service_id), err.to_string()))
                    .await;
                return;
            }
        };
        let metadata = Arc::clone(&self.metadata);
        let rollback_id = saved.service_id.clone();
        compensations.push(Box::new(move || {
            Box::pin(async move {
                if let Err(err) = metadata.mark_module_inactive(&rollback_id).await {
                    tracing::warn!(service_id = %rollback_id, error = %err, "rollback mark-inactive failed");
                }
            })
        }));
        if tx
            .send(RegistrationEvent::new(EventType::DatabaseSaved, "module metadata persisted", Some(service_id.clone())))
            .await
            .is_err()
        {
            self.rollback(compensations).await;
            return;
        }

        let schema_id = model::schema_id(&request.name, &request.version);
        let schema_event_message =
            self.archive_module_schema(&service_id, &schema_id, &request.name, &request.version, schema_json).await;
        if tx
            .send(RegistrationEvent::new(EventType::ApicurioRegistered, schema_event_message, Some(service_id.clone())))
            .await
            .is_err()
        {
            self.rollback(compensations).await;
            return;
        }

        self.events.emit_module_registered(&service_id, &request.name).await;
        let _ = tx.send(RegistrationEvent::new(EventType::Completed, "module registered", Some(service_id))).await;
        drop(compensations);
    }

    async fn persist_module(
        &self,
        request: &RegisterRequest,
        service_id: &str,
        schema_json: serde_json::Value,
    ) -> Result<ModuleRow, DomainError> {
        let module_row = ModuleRow {
            service_id: service_id.to_string(),
            service_name: request.name.clone(),
            host: request.connectivity.advertised_host.clone(),
            port: request.connectivity.advertised_port,
            version: request.version.clone(),
            config_schema_id: None,
            metadata: serde_json::to_value(&request.metadata).unwrap_or_else(|_| serde_json::json!({})),
            registered_at: chrono::Utc::now(),
            last_heartbeat: None,
            status: ModuleStatus::Active,
        };
        let schema_row = ConfigSchemaRow {
            schema_id: model::schema_id(&request.name, &request.version),
            service_name: request.name.clone(),
            schema_version: request.version.clone(),
            json_schema: schema_json,
            created_at: chrono::Utc::now(),
            created_by: None,
            archive_artifact_id: None,
            archive_global_id: None,
            sync_status: SyncStatus::Pending,
            last_sync_attempt: None,
            sync_error: None,
        };
        self.metadata.register_module(&module_row, &schema_row).await
    }

    /// Archives the module's config schema via C6 on a fresh task, so the
    /// relational transaction's context from C5 never leaks into C6's HTTP
    /// client. Non-fatal: a failure here is logged and reflected only in the
    /// returned event message, never surfaced as `FAILED`. On success, marks
    /// the schema row synced with the archive's artifact/global id; on
    /// failure, records the sync error for later inspection.
    async fn archive_module_schema(
        &self,
        service_id: &str,
        schema_id: &str,
        name: &str,
        version: &str,
        schema_json: serde_json::Value,
    ) -> &'static str {
        let archive = Arc::clone(&self.archive);
        let archive_name = name.to_string();
        let archive_version = version.to_string();
        let result = tokio::spawn(async move { archive.create_or_update(&archive_name, &archive_version, &schema_json).await }).await;

        match result {
            Ok(Ok(artifact)) => {
                if let Err(err) =
                    self.metadata.mark_schema_synced(schema_id, &artifact.artifact_id, artifact.global_id).await
                {
                    tracing::warn!(service_id, error = %err, "recording schema sync status failed");
                }
                "schema archived"
            }
            Ok(Err(err)) => {
                tracing::warn!(service_id, error = %err, "apicurio registry sync skipped (failure)");
                if let Err(mark_err) = self.metadata.mark_schema_failed(schema_id, &err.to_string()).await {
                    tracing::warn!(service_id, error = %mark_err, "recording schema sync failure failed");
                }
                "registry sync skipped"
            }
            Err(join_err) => {
                tracing::warn!(service_id, error = %join_err, "apicurio registry sync task failed");
                if let Err(mark_err) = self.metadata.mark_schema_failed(schema_id, &join_err.to_string()).await {
                    tracing::warn!(service_id, error = %mark_err, "recording schema sync failure failed");
                }
                "registry sync skipped"
            }
        }
    }

    async fn rollback(&self, compensations: Vec<Compensation>) {
        for compensation in compensations.into_iter().rev() {
            compensation().await;
        }
    }

    /// Computes `service_id` from `(name, host, port)`, deregisters via C2,
    /// fires-and-forgets the lifecycle-unregistered event only when an
    /// instance actually existed, and returns without consulting or
    /// deleting any metadata row (preserved behavior).
    ///
    /// `UnregisterRequest` carries no registrant kind on the wire, so the
    /// module-vs-service event choice is resolved by consulting C5 for a
    /// module row at `service_id` — a lookup keyed on the id directly,
    /// avoiding the last-two-dashes name-splitting heuristic applied
    /// elsewhere.
    ///
    /// # Errors
    /// Returns `DomainError` when the discovery store itself is unreachable;
    /// deregistering a nonexistent id is reported via `success = false`, not
    /// as an error.
    pub async fn unregister(&self, name: &str, host: &str, port: u16) -> Result<UnregisterResponse, DomainError> {
        let service_id = model::service_id(name, host, port);
        let existed = self.discovery.deregister(&service_id).await?;

        if !existed {
            return Ok(UnregisterResponse {
                success: false,
                message: format!("{service_id} was not registered"),
                timestamp: chrono::Utc::now(),
            });
        }

        let is_module = self.metadata.find_module_by_id(&service_id).await.ok().flatten().is_some();
        if is_module {
            self.events.emit_module_unregistered(&service_id, name).await;
        } else {
            self.events.emit_service_unregistered(&service_id, name).await;
        }

        Ok(UnregisterResponse {
            success: true,
            message: format!("{service_id} deregistered"),
            timestamp: chrono::Utc::now(),
        })
    }
}

/// Use the callback's self-declared schema when present and parseable,
/// else synthesize the default minimal document.
fn derive_schema_json(callback_meta: &ServiceRegistrationMetadata, name: &str) -> serde_json::Value {
    callback_meta
        .json_config_schema
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map_or_else(
            || model::synthesize_default_schema(name),
            |raw| serde_json::from_str(raw).unwrap_or_else(|_| model::synthesize_default_schema(name)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use broker_contracts::error::DomainError;
    use broker_contracts::model::{ArtifactMetadata, CatalogEntry, CatalogSnapshot, Connectivity};
    use broker_contracts::traits::{DiscoveryStore, EventPublisher, MetadataRepository, ModuleRegistrationProbe, SchemaArchiveClient};
    use tokio_stream::StreamExt;

    use super::*;

    #[derive(Default)]
    struct FakeDiscovery {
        register_fails: bool,
        healthy: bool,
        registered_ids: StdMutex<BTreeSet<String>>,
    }

    #[async_trait]
    impl DiscoveryStore for FakeDiscovery {
        async fn register(&self, _request: &RegisterRequest, service_id: &str) -> Result<(), DomainError> {
            if self.register_fails {
                return Err(DomainError::DiscoveryStoreUnavailable("boom".to_string()));
            }
            self.registered_ids.lock().unwrap().insert(service_id.to_string());
            Ok(())
        }

        async fn deregister(&self, service_id: &str) -> Result<bool, DomainError> {
            Ok(self.registered_ids.lock().unwrap().remove(service_id))
        }

        async fn list_catalog(&self, _name_filter: Option<&str>) -> Result<CatalogSnapshot, DomainError> {
            Ok(CatalogSnapshot { entries: vec![], as_of: chrono::Utc::now(), total_count: 0 })
        }

        async fn list_healthy_instances(&self, name: &str) -> Result<CatalogSnapshot, DomainError> {
            if !self.healthy {
                return Ok(CatalogSnapshot { entries: vec![], as_of: chrono::Utc::now(), total_count: 0 });
            }
            let entries: Vec<CatalogEntry> = self
                .registered_ids
                .lock()
                .unwrap()
                .iter()
                .filter(|id| id.starts_with(&format!("{name}-")))
                .map(|id| CatalogEntry {
                    service_id: id.clone(),
                    name: name.to_string(),
                    host: "10.0.0.1".to_string(),
                    port: 7000,
                    version: None,
                    tags: BTreeSet::new(),
                    capabilities: BTreeSet::new(),
                    http_endpoints: vec![],
                    http_schema_artifact_id: None,
                    http_schema_version: None,
                    metadata: Default::default(),
                    is_module: false,
                    healthy: true,
                })
                .collect();
            let total_count = entries.len();
            Ok(CatalogSnapshot { entries, as_of: chrono::Utc::now(), total_count })
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeMetadata {
        register_fails: bool,
        saved: StdMutex<Option<ModuleRow>>,
        saved_schema: StdMutex<Option<ConfigSchemaRow>>,
        mark_inactive_calls: StdMutex<Vec<String>>,
        synced_calls: StdMutex<Vec<(String, String, Option<i64>)>>,
        failed_calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl MetadataRepository for FakeMetadata {
        async fn register_module(&self, module: &ModuleRow, schema: &ConfigSchemaRow) -> Result<ModuleRow, DomainError> {
            if self.register_fails {
                return Err(DomainError::RepositoryUnavailable("boom".to_string()));
            }
            *self.saved.lock().unwrap() = Some(module.clone());
            *self.saved_schema.lock().unwrap() = Some(schema.clone());
            Ok(module.clone())
        }

        async fn upsert_module(&self, _row: &ModuleRow) -> Result<(), DomainError> {
            Ok(())
        }

        async fn mark_module_inactive(&self, service_id: &str) -> Result<(), DomainError> {
            self.mark_inactive_calls.lock().unwrap().push(service_id.to_string());
            Ok(())
        }

        async fn find_module_by_id(&self, service_id: &str) -> Result<Option<ModuleRow>, DomainError> {
            Ok(self.saved.lock().unwrap().clone().filter(|m| m.service_id == service_id))
        }

        async fn find_module_by_name(&self, _name: &str) -> Result<Option<ModuleRow>, DomainError> {
            Ok(None)
        }

        async fn list_modules(&self) -> Result<Vec<ModuleRow>, DomainError> {
            Ok(vec![])
        }

        async fn upsert_schema(&self, _row: &ConfigSchemaRow) -> Result<(), DomainError> {
            Ok(())
        }

        async fn find_schema_by_id(&self, _schema_id: &str) -> Result<Option<ConfigSchemaRow>, DomainError> {
            Ok(None)
        }

        async fn find_latest_schema_by_name(&self, _service_name: &str) -> Result<Option<ConfigSchemaRow>, DomainError> {
            Ok(None)
        }

        async fn mark_schema_synced(&self, schema_id: &str, artifact_id: &str, global_id: Option<i64>) -> Result<(), DomainError> {
            self.synced_calls.lock().unwrap().push((schema_id.to_string(), artifact_id.to_string(), global_id));
            Ok(())
        }

        async fn mark_schema_failed(&self, schema_id: &str, _error: &str) -> Result<(), DomainError> {
            self.failed_calls.lock().unwrap().push(schema_id.to_string());
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeArchive {
        create_fails: bool,
    }

    #[async_trait]
    impl SchemaArchiveClient for FakeArchive {
        async fn create_or_update(&self, service_name: &str, version: &str, _json_schema: &serde_json::Value) -> Result<ArtifactMetadata, DomainError> {
            if self.create_fails {
                return Err(DomainError::ArchiveUnavailable("boom".to_string()));
            }
            Ok(ArtifactMetadata {
                artifact_id: format!("{service_name}-config-v{version}"),
                global_id: Some(1),
                version: version.to_string(),
                created_at: None,
            })
        }

        async fn create_or_update_with_artifact_base(&self, artifact_base: &str, version: &str, json_schema: &serde_json::Value) -> Result<ArtifactMetadata, DomainError> {
            self.create_or_update(artifact_base, version, json_schema).await
        }

        async fn create_or_update_with_artifact_id(&self, artifact_id: &str, version: &str, _json_schema: &serde_json::Value) -> Result<ArtifactMetadata, DomainError> {
            if self.create_fails {
                return Err(DomainError::ArchiveUnavailable("boom".to_string()));
            }
            Ok(ArtifactMetadata { artifact_id: artifact_id.to_string(), global_id: Some(1), version: version.to_string(), created_at: None })
        }

        async fn get_schema_by_name(&self, _service_name: &str, _version: Option<&str>) -> Result<Option<serde_json::Value>, DomainError> {
            Ok(None)
        }

        async fn get_schema_by_artifact_id(&self, _artifact_id: &str, _version: Option<&str>) -> Result<Option<serde_json::Value>, DomainError> {
            Ok(None)
        }

        async fn get_artifact_metadata(&self, _service_name: &str) -> Result<Option<ArtifactMetadata>, DomainError> {
            Ok(None)
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeCallback {
        fails: bool,
        schema: Option<String>,
    }

    #[async_trait]
    impl ModuleRegistrationProbe for FakeCallback {
        async fn fetch_module_metadata(&self, module_name: &str) -> Result<ServiceRegistrationMetadata, DomainError> {
            if self.fails {
                return Err(DomainError::CallbackFailed("module unreachable".to_string()));
            }
            Ok(ServiceRegistrationMetadata {
                module_name: module_name.to_string(),
                version: "2.1.0".to_string(),
                json_config_schema: self.schema.clone(),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct FakeEvents {
        service_registered: AtomicUsize,
        service_unregistered: AtomicUsize,
        module_registered: AtomicUsize,
        module_unregistered: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for FakeEvents {
        async fn emit_service_registered(&self, _service_id: &str, _name: &str) {
            self.service_registered.fetch_add(1, Ordering::SeqCst);
        }

        async fn emit_service_unregistered(&self, _service_id: &str, _name: &str) {
            self.service_unregistered.fetch_add(1, Ordering::SeqCst);
        }

        async fn emit_module_registered(&self, _service_id: &str, _name: &str) {
            self.module_registered.fetch_add(1, Ordering::SeqCst);
        }

        async fn emit_module_unregistered(&self, _service_id: &str, _name: &str) {
            self.module_unregistered.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        coordinator: RegistrationCoordinator,
        discovery: Arc<FakeDiscovery>,
        metadata: Arc<FakeMetadata>,
        events: Arc<FakeEvents>,
    }

    fn build_harness(discovery: FakeDiscovery, metadata: FakeMetadata, archive: FakeArchive, callback: FakeCallback) -> Harness {
        let discovery = Arc::new(discovery);
        let metadata = Arc::new(metadata);
        let events = Arc::new(FakeEvents::default());
        let health_gate = HealthGate::new(Arc::clone(&discovery) as Arc<dyn DiscoveryStore>)
            .with_poll_interval(Duration::from_millis(5))
            .with_deadline(Duration::from_millis(100));
        let coordinator = RegistrationCoordinator::new(
            Arc::clone(&discovery) as Arc<dyn DiscoveryStore>,
            Arc::clone(&metadata) as Arc<dyn MetadataRepository>,
            Arc::new(archive) as Arc<dyn SchemaArchiveClient>,
            Arc::new(callback) as Arc<dyn ModuleRegistrationProbe>,
            Arc::clone(&events) as Arc<dyn EventPublisher>,
            health_gate,
        );
        Harness { coordinator, discovery, metadata, events }
    }

    fn service_request(name: &str, kind: RegistrantKind) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            kind,
            connectivity: Connectivity {
                advertised_host: "10.0.0.1".to_string(),
                advertised_port: 7000,
                internal_host: None,
                internal_port: None,
                tls_enabled: false,
            },
            version: "1.0.0".to_string(),
            metadata: Default::default(),
            tags: Default::default(),
            capabilities: Default::default(),
            http_endpoints: vec![],
            http_schema: None,
            http_schema_artifact_id: None,
            http_schema_version: None,
        }
    }

    async fn drain(stream: ReceiverStream<RegistrationEvent>) -> Vec<RegistrationEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn service_happy_path_emits_full_sequence_and_publishes_once() {
        let harness = build_harness(
            FakeDiscovery { healthy: true, ..Default::default() },
            FakeMetadata::default(),
            FakeArchive::default(),
            FakeCallback::default(),
        );
        let events = drain(harness.coordinator.register(service_request("auth-svc", RegistrantKind::Service))).await;

        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::Started,
                EventType::Validated,
                EventType::ConsulRegistered,
                EventType::HealthCheckConfigured,
                EventType::ConsulHealthy,
                EventType::Completed,
            ]
        );
        assert_eq!(harness.events.service_registered.load(Ordering::SeqCst), 1);
        assert_eq!(events.last().unwrap().service_id.as_deref(), Some("auth-svc-10.0.0.1-7000"));
    }

    #[tokio::test]
    async fn module_happy_path_emits_full_sequence() {
        let harness = build_harness(
            FakeDiscovery { healthy: true, ..Default::default() },
            FakeMetadata::default(),
            FakeArchive::default(),
            FakeCallback { fails: false, schema: Some("{\"x\":1}".to_string()) },
        );
        let events = drain(harness.coordinator.register(service_request("pdf-extract", RegistrantKind::Module))).await;

        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::Started,
                EventType::Validated,
                EventType::ConsulRegistered,
                EventType::HealthCheckConfigured,
                EventType::ConsulHealthy,
                EventType::MetadataRetrieved,
                EventType::SchemaValidated,
                EventType::DatabaseSaved,
                EventType::ApicurioRegistered,
                EventType::Completed,
            ]
        );
        assert_eq!(harness.events.module_registered.load(Ordering::SeqCst), 1);
        let saved = harness.metadata.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.service_id, "pdf-extract-10.0.0.1-7000");
        let synced = harness.metadata.synced_calls.lock().unwrap().clone();
        assert_eq!(synced.len(), 1, "a successful archive must mark the schema row synced");
        assert_eq!(synced[0].0, "pdf-extract-1_0_0");
        assert_eq!(synced[0].1, "pdf-extract-config-v1.0.0");
    }

    #[tokio::test]
    async fn unspecified_kind_fails_validation_with_no_side_effects() {
        let harness = build_harness(
            FakeDiscovery::default(),
            FakeMetadata::default(),
            FakeArchive::default(),
            FakeCallback::default(),
        );
        let events = drain(harness.coordinator.register(service_request("ghost", RegistrantKind::Unspecified))).await;

        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Started, EventType::Failed]);
        assert_eq!(events.last().unwrap().error_detail.as_deref(), Some("Missing required fields"));
        assert!(harness.discovery.registered_ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_timeout_rolls_back_discovery_registration() {
        let harness = build_harness(
            FakeDiscovery { healthy: false, ..Default::default() },
            FakeMetadata::default(),
            FakeArchive::default(),
            FakeCallback::default(),
        );
        let events = drain(harness.coordinator.register(service_request("slow-svc", RegistrantKind::Service))).await;

        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::Started,
                EventType::Validated,
                EventType::ConsulRegistered,
                EventType::HealthCheckConfigured,
                EventType::Failed,
            ]
        );
        assert!(harness.discovery.registered_ids.lock().unwrap().is_empty(), "rollback must deregister");
        assert_eq!(harness.events.service_registered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn module_callback_failure_rolls_back_and_does_not_persist() {
        let harness = build_harness(
            FakeDiscovery { healthy: true, ..Default::default() },
            FakeMetadata::default(),
            FakeArchive::default(),
            FakeCallback { fails: true, schema: None },
        );
        let events = drain(harness.coordinator.register(service_request("pdf-extract", RegistrantKind::Module))).await;

        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::Started,
                EventType::Validated,
                EventType::ConsulRegistered,
                EventType::HealthCheckConfigured,
                EventType::ConsulHealthy,
                EventType::Failed,
            ]
        );
        assert!(harness.discovery.registered_ids.lock().unwrap().is_empty());
        assert!(harness.metadata.saved.lock().unwrap().is_none());
        assert!(harness.metadata.mark_inactive_calls.lock().unwrap().is_empty(), "nothing was persisted, so nothing to unwind");
    }

    #[tokio::test]
    async fn module_archive_failure_is_non_fatal_and_completes() {
        let harness = build_harness(
            FakeDiscovery { healthy: true, ..Default::default() },
            FakeMetadata::default(),
            FakeArchive { create_fails: true },
            FakeCallback { fails: false, schema: None },
        );
        let events = drain(harness.coordinator.register(service_request("pdf-extract", RegistrantKind::Module))).await;

        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types.last(), Some(&EventType::Completed));
        let apicurio_event = events.iter().find(|e| e.event_type == EventType::ApicurioRegistered).unwrap();
        assert_eq!(apicurio_event.message, "registry sync skipped");
        assert!(harness.metadata.saved.lock().unwrap().is_some(), "DB row must survive a non-fatal archive failure");
        let failed = harness.metadata.failed_calls.lock().unwrap().clone();
        assert_eq!(failed, vec!["pdf-extract-1_0_0".to_string()], "a failed archive must record the sync failure");
        assert!(harness.metadata.synced_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn module_with_blank_callback_schema_synthesizes_default() {
        let harness = build_harness(
            FakeDiscovery { healthy: true, ..Default::default() },
            FakeMetadata::default(),
            FakeArchive::default(),
            FakeCallback { fails: false, schema: Some(String::new()) },
        );
        drain(harness.coordinator.register(service_request("pdf-extract", RegistrantKind::Module))).await;

        let schema = harness.metadata.saved_schema.lock().unwrap().clone().unwrap();
        assert_eq!(schema.json_schema, model::synthesize_default_schema("pdf-extract"));
    }

    #[tokio::test]
    async fn module_with_valid_callback_schema_uses_it_verbatim() {
        let harness = build_harness(
            FakeDiscovery { healthy: true, ..Default::default() },
            FakeMetadata::default(),
            FakeArchive::default(),
            FakeCallback { fails: false, schema: Some(r#"{"custom":true}"#.to_string()) },
        );
        drain(harness.coordinator.register(service_request("pdf-extract", RegistrantKind::Module))).await;

        let schema = harness.metadata.saved_schema.lock().unwrap().clone().unwrap();
        assert_eq!(schema.json_schema, serde_json::json!({"custom": true}));
    }

    #[tokio::test]
    async fn unregister_nonexistent_id_reports_failure_without_events() {
        let harness =
            build_harness(FakeDiscovery::default(), FakeMetadata::default(), FakeArchive::default(), FakeCallback::default());
        let response = harness.coordinator.unregister("ghost", "10.0.0.1", 7000).await.unwrap();

        assert!(!response.success);
        assert_eq!(harness.events.service_unregistered.load(Ordering::SeqCst), 0);
        assert_eq!(harness.events.module_unregistered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregister_existing_module_fires_module_unregistered() {
        let discovery = FakeDiscovery { healthy: true, ..Default::default() };
        discovery.registered_ids.lock().unwrap().insert("pdf-extract-10.0.0.1-7000".to_string());
        let metadata = FakeMetadata::default();
        *metadata.saved.lock().unwrap() = Some(ModuleRow {
            service_id: "pdf-extract-10.0.0.1-7000".to_string(),
            service_name: "pdf-extract".to_string(),
            host: "10.0.0.1".to_string(),
            port: 7000,
            version: "2.1.0".to_string(),
            config_schema_id: None,
            metadata: serde_json::json!({}),
            registered_at: chrono::Utc::now(),
            last_heartbeat: None,
            status: ModuleStatus::Active,
        });
        let harness = build_harness(discovery, metadata, FakeArchive::default(), FakeCallback::default());

        let response = harness.coordinator.unregister("pdf-extract", "10.0.0.1", 7000).await.unwrap();

        assert!(response.success);
        assert_eq!(harness.events.module_unregistered.load(Ordering::SeqCst), 1);
        assert_eq!(harness.events.service_unregistered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregister_existing_service_fires_service_unregistered() {
        let discovery = FakeDiscovery { healthy: true, ..Default::default() };
        discovery.registered_ids.lock().unwrap().insert("auth-svc-10.0.0.1-7000".to_string());
        let harness = build_harness(discovery, FakeMetadata::default(), FakeArchive::default(), FakeCallback::default());

        let response = harness.coordinator.unregister("auth-svc", "10.0.0.1", 7000).await.unwrap();

        assert!(response.success);
        assert_eq!(harness.events.service_unregistered.load(Ordering::SeqCst), 1);
        assert_eq!(harness.events.module_unregistered.load(Ordering::SeqCst), 0);
    }
}
