//! Conversions between `broker-contracts` domain rows and sea-orm models.

use broker_contracts::model::{ConfigSchemaRow, ModuleRow, ModuleStatus, SyncStatus};

use crate::entity::{config_schemas, modules};

fn module_status_str(status: ModuleStatus) -> &'static str {
    match status {
        ModuleStatus::Active => "ACTIVE",
        ModuleStatus::Inactive => "INACTIVE",
    }
}

fn module_status_from_str(s: &str) -> ModuleStatus {
    match s {
        "INACTIVE" => ModuleStatus::Inactive,
        _ => ModuleStatus::Active,
    }
}

fn sync_status_str(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Pending => "PENDING",
        SyncStatus::Synced => "SYNCED",
        SyncStatus::Failed => "FAILED",
    }
}

fn sync_status_from_str(s: &str) -> SyncStatus {
    match s {
        "SYNCED" => SyncStatus::Synced,
        "FAILED" => SyncStatus::Failed,
        _ => SyncStatus::Pending,
    }
}

impl From<&ModuleRow> for modules::ActiveModel {
    fn from(row: &ModuleRow) -> Self {
        use sea_orm::Set;
        Self {
            service_id: Set(row.service_id.clone()),
            service_name: Set(row.service_name.clone()),
            host: Set(row.host.clone()),
            port: Set(i32::from(row.port)),
            version: Set(row.version.clone()),
            config_schema_id: Set(row.config_schema_id.clone()),
            metadata: Set(row.metadata.clone()),
            registered_at: Set(row.registered_at),
            last_heartbeat: Set(row.last_heartbeat),
            status: Set(module_status_str(row.status).to_string()),
        }
    }
}

impl From<modules::Model> for ModuleRow {
    fn from(m: modules::Model) -> Self {
        let port = u16::try_from(m.port).unwrap_or(0);
        Self {
            service_id: m.service_id,
            service_name: m.service_name,
            host: m.host,
            port,
            version: m.version,
            config_schema_id: m.config_schema_id,
            metadata: m.metadata,
            registered_at: m.registered_at,
            last_heartbeat: m.last_heartbeat,
            status: module_status_from_str(&m.status),
        }
    }
}

impl From<&ConfigSchemaRow> for config_schemas::ActiveModel {
    fn from(row: &ConfigSchemaRow) -> Self {
        use sea_orm::Set;
        Self {
            schema_id: Set(row.schema_id.clone()),
            service_name: Set(row.service_name.clone()),
            schema_version: Set(row.schema_version.clone()),
            json_schema: Set(row.json_schema.clone()),
            created_at: Set(row.created_at),
            created_by: Set(row.created_by.clone()),
            archive_artifact_id: Set(row.archive_artifact_id.clone()),
            archive_global_id: Set(row.archive_global_id),
            sync_status: Set(sync_status_str(row.sync_status).to_string()),
            last_sync_attempt: Set(row.last_sync_attempt),
            sync_error: Set(row.sync_error.clone()),
        }
    }
}

impl From<config_schemas::Model> for ConfigSchemaRow {
    fn from(m: config_schemas::Model) -> Self {
        Self {
            schema_id: m.schema_id,
            service_name: m.service_name,
            schema_version: m.schema_version,
            json_schema: m.json_schema,
            created_at: m.created_at,
            created_by: m.created_by,
            archive_artifact_id: m.archive_artifact_id,
            archive_global_id: m.archive_global_id,
            sync_status: sync_status_from_str(&m.sync_status),
            last_sync_attempt: m.last_sync_attempt,
            sync_error: m.sync_error,
        }
    }
}
