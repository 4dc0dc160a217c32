use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub operation: String,
    pub class: Option<String>,
    pub field: Option<String>,
    pub label: Option<String>,
    pub detail_label: Option<String>,
    pub translation_domain: Option<String>,
    pub contexts: String, // JSON-encoded Vec<String>
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
