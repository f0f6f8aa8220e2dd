//! `MetadataRepository` implementation over a sea-orm connection pool.

use async_trait::async_trait;
use broker_contracts::error::DomainError;
use broker_contracts::model::{ConfigSchemaRow, ModuleRow};
use broker_contracts::traits::MetadataRepository;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait};

use crate::entity::{config_schemas, modules};

/// Durable storage for module rows and config schema rows, backed by a
/// PostgreSQL-compatible relational store.
pub struct SeaOrmMetadataRepository {
    conn: DatabaseConnection,
}

impl SeaOrmMetadataRepository {
    #[must_use]
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// # Errors
    /// Returns an error if the DSN cannot be parsed or the connection
    /// cannot be established.
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let conn = sea_orm::Database::connect(dsn).await?;
        Ok(Self { conn })
    }
}

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::RepositoryUnavailable(e.to_string())
}

#[async_trait]
impl MetadataRepository for SeaOrmMetadataRepository {
    async fn register_module(&self, module: &ModuleRow, schema: &ConfigSchemaRow) -> Result<ModuleRow, DomainError> {
        let txn = self.conn.begin().await.map_err(db_err)?;

        let schema_active: config_schemas::ActiveModel = schema.into();
        config_schemas::Entity::insert(schema_active)
            .on_conflict(
                OnConflict::column(config_schemas::Column::SchemaId)
                    .update_columns([config_schemas::Column::JsonSchema, config_schemas::Column::CreatedBy])
                    .to_owned(),
            )
            .exec(&txn)
            .await
            .map_err(db_err)?;

        let mut module_active: modules::ActiveModel = module.into();
        module_active.config_schema_id = Set(Some(schema.schema_id.clone()));
        modules::Entity::insert(module_active)
            .on_conflict(
                OnConflict::column(modules::Column::ServiceId)
                    .update_columns([
                        modules::Column::ServiceName,
                        modules::Column::Host,
                        modules::Column::Port,
                        modules::Column::Version,
                        modules::Column::ConfigSchemaId,
                        modules::Column::Metadata,
                        modules::Column::LastHeartbeat,
                        modules::Column::Status,
                    ])
                    .to_owned(),
            )
            .exec(&txn)
            .await
            .map_err(db_err)?;

        let saved = modules::Entity::find_by_id(module.service_id.clone())
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| DomainError::Internal(anyhow::anyhow!("module row missing after insert")))?;

        txn.commit().await.map_err(db_err)?;
        Ok(saved.into())
    }

    async fn upsert_module(&self, row: &ModuleRow) -> Result<(), DomainError> {
        let active_model: modules::ActiveModel = row.into();
        modules::Entity::insert(active_model)
            .on_conflict(
                OnConflict::column(modules::Column::ServiceId)
                    .update_columns([
                        modules::Column::ServiceName,
                        modules::Column::Host,
                        modules::Column::Port,
                        modules::Column::Version,
                        modules::Column::ConfigSchemaId,
                        modules::Column::Metadata,
                        modules::Column::LastHeartbeat,
                        modules::Column::Status,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_module_inactive(&self, service_id: &str) -> Result<(), DomainError> {
        if let Some(existing) = modules::Entity::find_by_id(service_id.to_string()).one(&self.conn).await.map_err(db_err)? {
            let mut active: modules::ActiveModel = existing.into();
            active.status = Set("INACTIVE".to_string());
            modules::Entity::update(active).exec(&self.conn).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn find_module_by_id(&self, service_id: &str) -> Result<Option<ModuleRow>, DomainError> {
        let found = modules::Entity::find_by_id(service_id.to_string()).one(&self.conn).await.map_err(db_err)?;
        Ok(found.map(ModuleRow::from))
    }

    async fn find_module_by_name(&self, name: &str) -> Result<Option<ModuleRow>, DomainError> {
        let found = modules::Entity::find()
            .filter(modules::Column::ServiceName.eq(name))
            .one(&self.conn)
            .await
            .map_err(db_err)?;
        Ok(found.map(ModuleRow::from))
    }

    async fn list_modules(&self) -> Result<Vec<ModuleRow>, DomainError> {
        let rows = modules::Entity::find().all(&self.conn).await.map_err(db_err)?;
        Ok(rows.into_iter().map(ModuleRow::from).collect())
    }

    async fn upsert_schema(&self, row: &ConfigSchemaRow) -> Result<(), DomainError> {
        let active_model: config_schemas::ActiveModel = row.into();
        config_schemas::Entity::insert(active_model)
            .on_conflict(
                OnConflict::column(config_schemas::Column::SchemaId)
                    .update_columns([
                        config_schemas::Column::JsonSchema,
                        config_schemas::Column::CreatedBy,
                        config_schemas::Column::ArchiveArtifactId,
                        config_schemas::Column::ArchiveGlobalId,
                        config_schemas::Column::SyncStatus,
                        config_schemas::Column::LastSyncAttempt,
                        config_schemas::Column::SyncError,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_schema_by_id(&self, schema_id: &str) -> Result<Option<ConfigSchemaRow>, DomainError> {
        let found =
            config_schemas::Entity::find_by_id(schema_id.to_string()).one(&self.conn).await.map_err(db_err)?;
        Ok(found.map(ConfigSchemaRow::from))
    }

    async fn find_latest_schema_by_name(&self, service_name: &str) -> Result<Option<ConfigSchemaRow>, DomainError> {
        let found = config_schemas::Entity::find()
            .filter(config_schemas::Column::ServiceName.eq(service_name))
            .order_by_desc(config_schemas::Column::CreatedAt)
            .order_by_desc(config_schemas::Column::SchemaVersion)
            .one(&self.conn)
            .await
            .map_err(db_err)?;
        Ok(found.map(ConfigSchemaRow::from))
    }

    async fn mark_schema_synced(
        &self,
        schema_id: &str,
        artifact_id: &str,
        global_id: Option<i64>,
    ) -> Result<(), DomainError> {
        if let Some(existing) =
            config_schemas::Entity::find_by_id(schema_id.to_string()).one(&self.conn).await.map_err(db_err)?
        {
            let mut active: config_schemas::ActiveModel = existing.into();
            active.sync_status = Set("SYNCED".to_string());
            active.archive_artifact_id = Set(Some(artifact_id.to_string()));
            active.archive_global_id = Set(global_id);
            active.last_sync_attempt = Set(Some(chrono::Utc::now()));
            active.sync_error = Set(None);
            config_schemas::Entity::update(active).exec(&self.conn).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn mark_schema_failed(&self, schema_id: &str, error: &str) -> Result<(), DomainError> {
        if let Some(existing) =
            config_schemas::Entity::find_by_id(schema_id.to_string()).one(&self.conn).await.map_err(db_err)?
        {
            let mut active: config_schemas::ActiveModel = existing.into();
            active.sync_status = Set("FAILED".to_string());
            active.last_sync_attempt = Set(Some(chrono::Utc::now()));
            active.sync_error = Set(Some(error.to_string()));
            config_schemas::Entity::update(active).exec(&self.conn).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        self.conn.ping().await.is_ok()
    }
}
