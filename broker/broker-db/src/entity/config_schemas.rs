use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "config_schemas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub schema_id: String,
    #[sea_orm(indexed)]
    pub service_name: String,
    pub schema_version: String,
    pub json_schema: Json,
    pub created_at: DateTimeUtc,
    pub created_by: Option<String>,
    pub archive_artifact_id: Option<String>,
    pub archive_global_id: Option<i64>,
    #[sea_orm(indexed)]
    pub sync_status: String,
    pub last_sync_attempt: Option<DateTimeUtc>,
    pub sync_error: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
