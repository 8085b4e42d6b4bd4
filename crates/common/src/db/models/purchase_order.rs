//! Purchase-order request entity (`solicitudes_oc`)

use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supporting document type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Factura,
    FacturaExenta,
    BoletaHonorarios,
    Invoice,
    Otro,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Factura,
        DocumentType::FacturaExenta,
        DocumentType::BoletaHonorarios,
        DocumentType::Invoice,
        DocumentType::Otro,
    ];

    /// Stored value
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Factura => "factura",
            DocumentType::FacturaExenta => "factura_exenta",
            DocumentType::BoletaHonorarios => "boleta_honorarios",
            DocumentType::Invoice => "invoice",
            DocumentType::Otro => "otro",
        }
    }

    /// Human-facing label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Factura => "Factura",
            DocumentType::FacturaExenta => "Factura Exenta",
            DocumentType::BoletaHonorarios => "Boleta de Honorarios",
            DocumentType::Invoice => "Invoice",
            DocumentType::Otro => "Otro",
        }
    }
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Factura
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown document type '{}'", s))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status. Any value may follow any other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "enviada")]
    Submitted,
    #[serde(rename = "procesada")]
    Processed,
    #[serde(rename = "en adquisiciones")]
    InProcurement,
    #[serde(rename = "ok adquisiciones")]
    ProcurementApproved,
    #[serde(rename = "finalizado flujo")]
    FlowFinished,
    #[serde(rename = "anulada")]
    Voided,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Submitted,
        RequestStatus::Processed,
        RequestStatus::InProcurement,
        RequestStatus::ProcurementApproved,
        RequestStatus::FlowFinished,
        RequestStatus::Voided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Submitted => "enviada",
            RequestStatus::Processed => "procesada",
            RequestStatus::InProcurement => "en adquisiciones",
            RequestStatus::ProcurementApproved => "ok adquisiciones",
            RequestStatus::FlowFinished => "finalizado flujo",
            RequestStatus::Voided => "anulada",
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Submitted
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded attachment reference, stored in `archivos_adjuntos`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// Original file name
    #[serde(rename = "nombre")]
    pub name: String,

    /// Storage key inside the attachment bucket
    pub path: String,

    pub size: u64,

    /// MIME type
    #[serde(rename = "type")]
    pub content_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "solicitudes_oc")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-facing sequence number, per company
    #[sea_orm(column_name = "id_correlativo")]
    pub correlative: i64,

    #[sea_orm(column_name = "empresa", column_type = "Text")]
    pub company: String,

    #[sea_orm(column_name = "tipo", column_type = "Text")]
    pub document_type: String,

    #[sea_orm(column_name = "proveedor", column_type = "Text")]
    pub supplier: String,

    #[sea_orm(column_name = "rut", column_type = "Text")]
    pub supplier_tax_id: String,

    #[sea_orm(column_name = "proyecto_id")]
    pub project_id: Uuid,

    #[sea_orm(column_name = "proyecto_nombre", column_type = "Text")]
    pub project_name: String,

    #[sea_orm(column_name = "subproyecto", column_type = "Text", nullable)]
    pub sub_project: Option<String>,

    #[sea_orm(column_name = "ceco", column_type = "Text")]
    pub cost_center: String,

    #[sea_orm(column_type = "Text")]
    pub glosa: String,

    #[sea_orm(column_name = "detalle", column_type = "Text", nullable)]
    pub detail: Option<String>,

    #[sea_orm(column_name = "valor", column_type = "Decimal(Some((16, 2)))")]
    pub value: Decimal,

    #[sea_orm(column_name = "archivos_adjuntos", column_type = "JsonBinary")]
    pub attachments: serde_json::Value,

    #[sea_orm(column_name = "estado", column_type = "Text")]
    pub status: String,

    /// External ERP reference
    #[sea_orm(column_name = "sol_netsuite", column_type = "Text", nullable)]
    pub erp_reference: Option<String>,

    #[sea_orm(column_name = "usuario_id")]
    pub requester_id: Uuid,

    #[sea_orm(column_name = "usuario_email", column_type = "Text")]
    pub requester_email: String,

    #[sea_orm(column_name = "fecha_creacion")]
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Stored document type, if it is one of the known values
    pub fn document_type(&self) -> Option<DocumentType> {
        self.document_type.parse().ok()
    }

    /// Label for notifications, falling back to the raw stored value
    pub fn document_type_label(&self) -> String {
        self.document_type()
            .map(|t| t.label().to_string())
            .unwrap_or_else(|| self.document_type.clone())
    }

    /// Attachment list; a malformed column reads as empty
    pub fn attachment_list(&self) -> Vec<AttachmentMeta> {
        serde_json::from_value(self.attachments.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
