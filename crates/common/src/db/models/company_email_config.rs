//! Per-company notification recipients (`configuracion_correos`)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "configuracion_correos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_name = "empresa", column_type = "Text")]
    pub company: String,

    /// Subject prefix shown as `[label]`
    #[sea_orm(column_name = "etiqueta", column_type = "Text", nullable)]
    pub label: Option<String>,

    #[sea_orm(column_name = "destinatarios", column_type = "JsonBinary")]
    pub recipients: serde_json::Value,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Configured addresses; a malformed column reads as empty
    pub fn recipient_list(&self) -> Vec<String> {
        serde_json::from_value(self.recipients.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
