//! Administration endpoints
//!
//! Every handler here requires the administration role.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use super::purchase_orders::PurchaseOrderResponse;
use crate::AppState;
use deskflow_common::{
    auth::AuthContext,
    db::{
        models::{CompanyEmailConfig, RequestStatus},
        PurchaseOrderUpdate,
    },
    errors::{AppError, Result},
    orders::RequestQuery,
};

/// Status and ERP reference edits. An empty `sol_netsuite` clears it.
#[derive(Debug, Deserialize)]
pub struct UpdatePurchaseOrderRequest {
    #[serde(rename = "estado")]
    pub status: Option<RequestStatus>,

    #[serde(rename = "sol_netsuite")]
    pub erp_reference: Option<String>,
}

impl UpdatePurchaseOrderRequest {
    fn into_update(self) -> Result<PurchaseOrderUpdate> {
        if self.status.is_none() && self.erp_reference.is_none() {
            return Err(AppError::Validation {
                message: "Nothing to update: provide estado and/or sol_netsuite".to_string(),
                field: None,
            });
        }

        Ok(PurchaseOrderUpdate {
            status: self.status,
            erp_reference: self.erp_reference.map(|r| {
                let r = r.trim().to_string();
                if r.is_empty() { None } else { Some(r) }
            }),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertEmailConfigRequest {
    /// Subject prefix
    #[serde(default, rename = "etiqueta")]
    #[validate(length(max = 50))]
    pub label: Option<String>,

    #[serde(rename = "destinatarios")]
    #[validate(length(max = 50))]
    pub recipients: Vec<String>,
}

impl UpsertEmailConfigRequest {
    /// Trimmed recipient list; every entry must be a valid address
    fn checked_recipients(&self) -> Result<Vec<String>> {
        self.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: None,
        })?;

        self.recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(|r| {
                if r.validate_email() {
                    Ok(r.to_string())
                } else {
                    Err(AppError::Validation {
                        message: format!("Invalid email address: {}", r),
                        field: Some("destinatarios".to_string()),
                    })
                }
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct EmailConfigResponse {
    #[serde(rename = "empresa")]
    pub company: String,
    #[serde(rename = "etiqueta")]
    pub label: Option<String>,
    #[serde(rename = "destinatarios")]
    pub recipients: Vec<String>,
    pub updated_at: String,
}

impl From<CompanyEmailConfig> for EmailConfigResponse {
    fn from(config: CompanyEmailConfig) -> Self {
        Self {
            recipients: config.recipient_list(),
            company: config.company,
            label: config.label,
            updated_at: config.updated_at.to_rfc3339(),
        }
    }
}

/// All requests, filtered and sorted by the query string
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<RequestQuery>,
) -> Result<Json<Vec<PurchaseOrderResponse>>> {
    auth.require_admin()?;

    let records = state.repository().list_all_purchase_orders().await?;
    let records = query.apply(records);

    Ok(Json(records.into_iter().map(PurchaseOrderResponse::from).collect()))
}

/// Set status and/or ERP reference. Any status may follow any other.
pub async fn update_purchase_order(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePurchaseOrderRequest>,
) -> Result<Json<PurchaseOrderResponse>> {
    auth.require_admin()?;
    let update = request.into_update()?;

    let record = state.repository().update_purchase_order(id, update).await?;

    tracing::info!(
        record_id = %record.id,
        correlative = record.correlative,
        status = %record.status,
        erp_reference = ?record.erp_reference,
        admin = %auth.email,
        "Purchase order updated"
    );

    Ok(Json(record.into()))
}

pub async fn list_email_configs(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<EmailConfigResponse>>> {
    auth.require_admin()?;

    let configs = state.repository().list_email_configs().await?;
    Ok(Json(configs.into_iter().map(EmailConfigResponse::from).collect()))
}

/// Replace a company's notification recipients
pub async fn upsert_email_config(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(company): Path<String>,
    Json(request): Json<UpsertEmailConfigRequest>,
) -> Result<Json<EmailConfigResponse>> {
    auth.require_admin()?;
    let recipients = request.checked_recipients()?;
    let label = request.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());

    let config = state
        .repository()
        .upsert_email_config(&company, label, recipients)
        .await?;

    tracing::info!(company = %company, admin = %auth.email, "Email configuration updated");

    Ok(Json(config.into()))
}
