//! Requester endpoints: submit a purchase-order request and list one's own

use axum::{
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use deskflow_common::{
    auth::AuthContext,
    db::models::{AttachmentMeta, DocumentType, PurchaseOrder},
    errors::{AppError, Result},
    orders::{
        validation::screen_files, PendingFile, PurchaseOrderDraft, RequestQuery, Requester,
        SubmissionReceipt,
    },
};

/// Multipart part name carrying files
const FILE_FIELD: &str = "archivos";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Raw multipart form, before project lookup
#[derive(Debug, Default)]
pub struct SubmissionForm {
    pub document_type: Option<String>,
    pub supplier: String,
    pub supplier_tax_id: String,
    pub project_id: Option<String>,
    pub sub_project: Option<String>,
    pub glosa: String,
    pub value: String,
    pub detail: Option<String>,
    pub files: Vec<PendingFile>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub receipt: SubmissionReceipt,
    /// Files dropped for exceeding the size limit
    pub warnings: Vec<String>,
}

/// Request as returned by list endpoints
#[derive(Debug, Serialize)]
pub struct PurchaseOrderResponse {
    pub id: Uuid,
    pub correlative: i64,
    pub company: String,
    pub document_type: String,
    pub document_type_label: String,
    pub supplier: String,
    pub supplier_tax_id: String,
    pub project_id: Uuid,
    pub project_name: String,
    pub sub_project: Option<String>,
    pub cost_center: String,
    pub glosa: String,
    pub detail: Option<String>,
    pub value: Decimal,
    pub attachments: Vec<AttachmentMeta>,
    pub status: String,
    pub erp_reference: Option<String>,
    pub requester_email: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<PurchaseOrder> for PurchaseOrderResponse {
    fn from(record: PurchaseOrder) -> Self {
        let attachments = record.attachment_list();
        let document_type_label = record.document_type_label();

        Self {
            id: record.id,
            correlative: record.correlative,
            company: record.company,
            document_type: record.document_type,
            document_type_label,
            supplier: record.supplier,
            supplier_tax_id: record.supplier_tax_id,
            project_id: record.project_id,
            project_name: record.project_name,
            sub_project: record.sub_project,
            cost_center: record.cost_center,
            glosa: record.glosa,
            detail: record.detail,
            value: record.value,
            attachments,
            status: record.status,
            erp_reference: record.erp_reference,
            requester_email: record.requester_email,
            created_at: record.created_at,
        }
    }
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::InvalidFormat {
        message: e.body_text(),
    }
}

/// The form preselects a factura; an unrecognized value is left unselected
fn document_type(raw: Option<&str>) -> Option<DocumentType> {
    match raw {
        Some(raw) => raw.trim().parse().ok(),
        None => Some(DocumentType::default()),
    }
}

fn optional(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Collect text fields and file parts; unknown fields are ignored
pub async fn read_form(mut multipart: Multipart) -> Result<SubmissionForm> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == FILE_FIELD {
            let file_name = field.file_name().unwrap_or("archivo").to_string();
            let content_type = field.content_type().unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
            let bytes = field.bytes().await.map_err(multipart_error)?;

            // Browsers send an empty part when no file is chosen
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            form.files.push(PendingFile::new(file_name, content_type, bytes));
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "tipo" => form.document_type = optional(value),
            "proveedor" => form.supplier = value,
            "rut" => form.supplier_tax_id = value,
            "proyecto_id" => form.project_id = optional(value),
            "subproyecto" => form.sub_project = optional(value),
            "glosa" => form.glosa = value,
            "valor" => form.value = value,
            "detalle" => form.detail = optional(value),
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// Submit a new purchase-order request
pub async fn submit(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> std::result::Result<(StatusCode, Json<SubmitResponse>), Response> {
    let form = read_form(multipart).await.map_err(IntoResponse::into_response)?;

    let (files, rejected) = screen_files(form.files, state.config.storage.max_file_bytes);

    // An unknown or malformed id reads as "no project selected"
    let project = match form.project_id.as_deref().and_then(|id| Uuid::parse_str(id.trim()).ok()) {
        Some(id) => state
            .repository()
            .find_project_by_id(id)
            .await
            .map_err(IntoResponse::into_response)?,
        None => None,
    };

    let draft = PurchaseOrderDraft {
        document_type: document_type(form.document_type.as_deref()),
        supplier: form.supplier,
        supplier_tax_id: form.supplier_tax_id,
        project,
        sub_project: form.sub_project,
        glosa: form.glosa,
        value: form.value,
        detail: form.detail,
        attachments: files,
    };

    let requester = Requester {
        id: auth.user_id,
        email: auth.email.clone(),
        company: auth.company.clone(),
    };

    tracing::info!(
        request_id = %auth.request_id,
        user_id = %auth.user_id,
        company = %auth.company,
        files = draft.attachments.len(),
        rejected = rejected.len(),
        "Purchase-order submission received"
    );

    let receipt = state
        .orchestrator
        .submit(&requester, draft)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            receipt,
            warnings: rejected.iter().map(ToString::to_string).collect(),
        }),
    ))
}

/// The caller's own requests
pub async fn list_own(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<RequestQuery>,
) -> Result<Json<Vec<PurchaseOrderResponse>>> {
    let records = state
        .repository()
        .list_purchase_orders_for_requester(auth.user_id)
        .await?;

    let records = query.apply(records);
    Ok(Json(records.into_iter().map(PurchaseOrderResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::Request;

    const BOUNDARY: &str = "deskflow-boundary";

    fn text_part(name: &str, value: &str) -> String {
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        )
    }

    fn file_part(name: &str, file_name: &str, content_type: &str, content: &str) -> String {
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n{}\r\n",
            BOUNDARY, name, file_name, content_type, content
        )
    }

    async fn multipart(body: String) -> Multipart {
        let request = Request::post("/v1/purchase-orders")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();

        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_read_form_collects_fields_and_files() {
        let body = [
            text_part("tipo", "factura"),
            text_part("proveedor", "ACME"),
            text_part("rut", "76.123.456-7"),
            text_part("proyecto_id", "6f1c3f1e-4a8e-4f5b-9a8c-2a8d7f0b1c2d"),
            text_part("subproyecto", ""),
            text_part("glosa", "Arriendo"),
            text_part("valor", "500000"),
            text_part("otro", "ignorado"),
            file_part("archivos", "cotizacion.pdf", "application/pdf", "%PDF"),
            file_part("archivos", "foto.png", "image/png", "PNG"),
            format!("--{}--\r\n", BOUNDARY),
        ]
        .concat();

        let form = read_form(multipart(body).await).await.unwrap();

        assert_eq!(form.document_type.as_deref(), Some("factura"));
        assert_eq!(form.supplier, "ACME");
        assert_eq!(form.value, "500000");
        assert_eq!(form.sub_project, None);
        assert_eq!(form.files.len(), 2);
        assert_eq!(form.files[0].name, "cotizacion.pdf");
        assert_eq!(form.files[0].content_type, "application/pdf");
        assert_eq!(form.files[1].size(), 3);
    }

    #[tokio::test]
    async fn test_read_form_skips_empty_file_part() {
        let body = [
            text_part("proveedor", "ACME"),
            file_part("archivos", "", "application/octet-stream", ""),
            format!("--{}--\r\n", BOUNDARY),
        ]
        .concat();

        let form = read_form(multipart(body).await).await.unwrap();
        assert!(form.files.is_empty());
    }

    #[test]
    fn test_missing_document_type_defaults_to_factura() {
        assert_eq!(document_type(None), Some(DocumentType::Factura));
        assert_eq!(document_type(Some("boleta_honorarios")), Some(DocumentType::BoletaHonorarios));
        assert_eq!(document_type(Some("recibo")), None);
    }

    #[test]
    fn test_response_exposes_attachments_and_label() {
        let record = PurchaseOrder {
            id: Uuid::nil(),
            correlative: 4,
            company: "FCH".to_string(),
            document_type: "boleta_honorarios".to_string(),
            supplier: "ACME".to_string(),
            supplier_tax_id: "1-9".to_string(),
            project_id: Uuid::nil(),
            project_name: "Teatro".to_string(),
            sub_project: None,
            cost_center: "CC-1".to_string(),
            glosa: "g".to_string(),
            detail: None,
            value: Decimal::from(1000),
            attachments: serde_json::json!([{ "nombre": "a.pdf", "path": "u/r/1_0.pdf", "size": 10, "type": "application/pdf" }]),
            status: "enviada".to_string(),
            erp_reference: None,
            requester_id: Uuid::nil(),
            requester_email: "ana@fch.cl".to_string(),
            created_at: chrono::Utc::now().into(),
        };

        let response = PurchaseOrderResponse::from(record);
        assert_eq!(response.document_type_label, "Boleta de Honorarios");
        assert_eq!(response.attachments.len(), 1);
        assert_eq!(response.attachments[0].name, "a.pdf");
    }
}
