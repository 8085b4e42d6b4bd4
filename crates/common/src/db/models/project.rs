//! Project entity (`proyectos`), read only in this service

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "proyectos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_name = "nombre", column_type = "Text")]
    pub name: String,

    /// Cost-center code copied onto purchase-order requests
    #[sea_orm(column_name = "ceco", column_type = "Text", nullable)]
    pub cost_center: Option<String>,

    #[sea_orm(column_name = "encargado", column_type = "Text", nullable)]
    pub manager: Option<String>,
}

impl Model {
    /// Cost center, ignoring blank values
    pub fn resolved_cost_center(&self) -> Option<&str> {
        self.cost_center
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_order::Entity")]
    PurchaseOrders,
}

impl Related<super::purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
