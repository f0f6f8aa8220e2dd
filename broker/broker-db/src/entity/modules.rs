use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "modules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub service_id: String,
    #[sea_orm(indexed)]
    pub service_name: String,
    pub host: String,
    pub port: i32,
    pub version: String,
    pub config_schema_id: Option<String>,
    pub metadata: Json,
    pub registered_at: DateTimeUtc,
    pub last_heartbeat: Option<DateTimeUtc>,
    #[sea_orm(indexed)]
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
