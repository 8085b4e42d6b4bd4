//! Form screening and validation
//!
//! Rules run in a fixed order and the first failure wins. Nothing here
//! performs I/O, so a rejected draft never reaches storage or the mailer.

use super::{required_attachments, PendingFile, HIGH_VALUE_THRESHOLD, MAX_VALUE, VALUE_SCALE};
use crate::db::models::{DocumentType, Project};
use crate::db::NewPurchaseOrder;
use crate::errors::AppError;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::submission::Requester;

/// Request form as submitted, with the selected project already looked up
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderDraft {
    pub document_type: Option<DocumentType>,
    pub supplier: String,
    pub supplier_tax_id: String,
    pub project: Option<Project>,
    pub sub_project: Option<String>,
    pub glosa: String,
    /// Raw value as typed
    pub value: String,
    pub detail: Option<String>,
    pub attachments: Vec<PendingFile>,
}

/// A draft that passed every rule
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub document_type: DocumentType,
    pub supplier: String,
    pub supplier_tax_id: String,
    pub project_id: Uuid,
    pub project_name: String,
    pub cost_center: String,
    pub sub_project: Option<String>,
    pub glosa: String,
    pub value: Decimal,
    pub detail: Option<String>,
    pub attachments: Vec<PendingFile>,
}

impl ValidatedRequest {
    /// Record fields for the insert; attachments are patched in later
    pub fn to_new_record(&self, requester: &Requester) -> NewPurchaseOrder {
        NewPurchaseOrder {
            company: requester.company.clone(),
            document_type: self.document_type,
            supplier: self.supplier.clone(),
            supplier_tax_id: self.supplier_tax_id.clone(),
            project_id: self.project_id,
            project_name: self.project_name.clone(),
            sub_project: self.sub_project.clone(),
            cost_center: self.cost_center.clone(),
            glosa: self.glosa.clone(),
            detail: self.detail.clone(),
            value: self.value,
            requester_id: requester.id,
            requester_email: requester.email.clone(),
        }
    }
}

/// First failing rule. The display text is the warning shown to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("Seleccione un tipo de documento")]
    MissingDocumentType,

    #[error("Ingrese el nombre del proveedor")]
    MissingSupplier,

    #[error("Ingrese el RUT del proveedor")]
    MissingSupplierTaxId,

    #[error("Seleccione un proyecto")]
    MissingProject,

    #[error("El proyecto seleccionado no tiene CECO asignado")]
    MissingCostCenter,

    #[error("Ingrese una glosa")]
    MissingGlosa,

    #[error("Ingrese un valor válido mayor a 0")]
    InvalidValue,

    #[error(
        "Para valores {} se requieren al menos {required} archivo(s) adjunto(s). Actualmente tiene {actual}.",
        value_tier(.high_value)
    )]
    NotEnoughAttachments {
        required: usize,
        actual: usize,
        high_value: bool,
    },
}

impl ValidationFailure {
    /// Form field the rule applies to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationFailure::MissingDocumentType => "tipo",
            ValidationFailure::MissingSupplier => "proveedor",
            ValidationFailure::MissingSupplierTaxId => "rut",
            ValidationFailure::MissingProject => "proyecto_id",
            ValidationFailure::MissingCostCenter => "ceco",
            ValidationFailure::MissingGlosa => "glosa",
            ValidationFailure::InvalidValue => "valor",
            ValidationFailure::NotEnoughAttachments { .. } => "archivos",
        }
    }
}

impl From<ValidationFailure> for AppError {
    fn from(failure: ValidationFailure) -> Self {
        AppError::Validation {
            field: Some(failure.field().to_string()),
            message: failure.to_string(),
        }
    }
}

fn value_tier(high_value: &bool) -> &'static str {
    if *high_value {
        "mayores o iguales a $1.500.000"
    } else {
        "menores a $1.500.000"
    }
}

/// A file dropped at selection time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name} excede el tamaño máximo de {}MB", .limit / (1024 * 1024))]
pub struct FileRejection {
    pub name: String,
    pub size: u64,
    pub limit: u64,
}

/// Split selected files into those within `max_bytes` and per-file warnings
pub fn screen_files(files: Vec<PendingFile>, max_bytes: u64) -> (Vec<PendingFile>, Vec<FileRejection>) {
    let mut accepted = Vec::with_capacity(files.len());
    let mut rejected = Vec::new();

    for file in files {
        if file.size() > max_bytes {
            tracing::warn!(file_name = %file.name, size = file.size(), limit = max_bytes, "File exceeds size limit");
            rejected.push(FileRejection {
                name: file.name,
                size: file.bytes.len() as u64,
                limit: max_bytes,
            });
        } else {
            accepted.push(file);
        }
    }

    (accepted, rejected)
}

/// Parse a typed value at the stored scale.
///
/// The amount is rounded to the column's two decimals before any check, so
/// the tier rule sees the value that will be persisted. It must then be
/// greater than zero and fit the column.
pub fn parse_value(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    Decimal::from_str(raw)
        .ok()
        .map(|v| v.round_dp_with_strategy(VALUE_SCALE, RoundingStrategy::MidpointAwayFromZero))
        .filter(|v| *v > Decimal::ZERO && *v <= MAX_VALUE)
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Run every rule in order; the first failure wins
pub fn validate(draft: PurchaseOrderDraft) -> Result<ValidatedRequest, ValidationFailure> {
    let document_type = draft.document_type.ok_or(ValidationFailure::MissingDocumentType)?;

    let supplier = draft.supplier.trim();
    if supplier.is_empty() {
        return Err(ValidationFailure::MissingSupplier);
    }

    let supplier_tax_id = draft.supplier_tax_id.trim();
    if supplier_tax_id.is_empty() {
        return Err(ValidationFailure::MissingSupplierTaxId);
    }

    let project = draft.project.as_ref().ok_or(ValidationFailure::MissingProject)?;

    let cost_center = project
        .resolved_cost_center()
        .ok_or(ValidationFailure::MissingCostCenter)?
        .to_string();

    let glosa = draft.glosa.trim();
    if glosa.is_empty() {
        return Err(ValidationFailure::MissingGlosa);
    }

    let value = parse_value(&draft.value).ok_or(ValidationFailure::InvalidValue)?;

    let required = required_attachments(value);
    if draft.attachments.len() < required {
        return Err(ValidationFailure::NotEnoughAttachments {
            required,
            actual: draft.attachments.len(),
            high_value: value >= HIGH_VALUE_THRESHOLD,
        });
    }

    Ok(ValidatedRequest {
        document_type,
        supplier: supplier.to_string(),
        supplier_tax_id: supplier_tax_id.to_string(),
        project_id: project.id,
        project_name: project.name.clone(),
        cost_center,
        sub_project: non_blank(draft.sub_project),
        glosa: glosa.to_string(),
        value,
        detail: non_blank(draft.detail),
        attachments: draft.attachments,
    })
}
