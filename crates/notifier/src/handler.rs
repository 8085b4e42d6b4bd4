//! `POST /api/enviar-email-oc`
//!
//! Renders the purchase-order notification from a client-supplied payload and
//! sends it to the requester plus the default recipient list. Responses use a
//! flat `{ "error": "..." }` body on failure.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use deskflow_common::{
    config::NotificationConfig,
    errors::AppError,
    mail::{EmailAttachment, Mailer, OutgoingEmail},
    metrics,
    orders::notification::{format_timestamp, render, resolve_recipients, AttachmentLink, NotificationData},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct NotifierState {
    /// `None` when mail credentials are missing
    pub mailer: Option<Arc<dyn Mailer>>,
    pub http: reqwest::Client,
    pub notifications: Arc<NotificationConfig>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Credenciales de correo no configuradas en el servidor")]
    MissingCredentials,

    #[error("{0}")]
    InvalidPayload(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("{0}")]
    Send(AppError),
}

impl NotifyError {
    fn status(&self) -> StatusCode {
        match self {
            NotifyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            NotifyError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            NotifyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            NotifyError::MissingCredentials | NotifyError::Send(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Notification failed");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotificationRequest {
    #[serde(rename = "idCorrelativo")]
    pub correlative: i64,

    /// Document type label
    #[serde(rename = "tipo")]
    pub document_type: String,

    #[serde(rename = "proveedor")]
    pub supplier: String,

    #[serde(rename = "rut")]
    pub supplier_tax_id: String,

    #[serde(rename = "proyectoNombre")]
    pub project_name: String,

    #[serde(default, rename = "subproyecto")]
    pub sub_project: Option<String>,

    #[serde(rename = "ceco")]
    pub cost_center: String,

    pub glosa: String,

    #[serde(rename = "valor")]
    pub value: Decimal,

    #[serde(default, rename = "detalle")]
    pub detail: Option<String>,

    #[serde(default, rename = "archivosAdjuntos")]
    pub attachments: Vec<AttachmentLink>,

    #[serde(rename = "usuarioEmail")]
    #[validate(email)]
    pub requester_email: String,

    /// Company flag; informational
    #[serde(default, rename = "empresa")]
    pub company: Option<String>,
}

impl NotificationRequest {
    fn into_data(self, submitted_at: String) -> NotificationData {
        NotificationData {
            correlative: self.correlative,
            document_type: self.document_type,
            supplier: self.supplier,
            supplier_tax_id: self.supplier_tax_id,
            project_name: self.project_name,
            sub_project: self.sub_project,
            cost_center: self.cost_center,
            glosa: self.glosa,
            value: self.value,
            detail: self.detail,
            attachments: self.attachments,
            requester_email: self.requester_email,
            submitted_at,
            label: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub success: bool,
    pub message_id: String,
    pub recipients: Vec<String>,
}

/// Send the purchase-order notification
pub async fn send_notification(
    State(state): State<NotifierState>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> Result<Json<NotificationResponse>, NotifyError> {
    let mailer = state.mailer.clone().ok_or(NotifyError::MissingCredentials)?;

    let Json(request) = payload.map_err(|e| NotifyError::InvalidPayload(e.body_text()))?;
    request
        .validate()
        .map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;

    let config = &state.notifications;
    let attachments = if config.attach_files {
        download_attachments(&state.http, &request.attachments, config.max_download_bytes).await
    } else {
        Vec::new()
    };

    let recipients = resolve_recipients(&request.requester_email, None, &config.default_recipients);
    let correlative = request.correlative;
    let company = request.company.clone();

    let data = request.into_data(format_timestamp(Utc::now(), config.utc_offset_minutes));
    let rendered = render(&data);

    let email = OutgoingEmail {
        to: recipients.clone(),
        subject: rendered.subject,
        html_body: rendered.html_body,
        attachments,
    };
    let attached = email.attachments.len();

    let sent = mailer.send(email).await;
    metrics::record_email(mailer.provider(), sent.is_ok());
    let message_id = sent.map_err(NotifyError::Send)?;

    tracing::info!(
        correlative,
        company = ?company,
        message_id = %message_id,
        recipients = recipients.len(),
        attachments = attached,
        "Notification sent"
    );

    Ok(Json(NotificationResponse {
        success: true,
        message_id,
        recipients,
    }))
}

/// Any method other than POST or OPTIONS
pub async fn method_not_allowed() -> NotifyError {
    NotifyError::MethodNotAllowed
}

/// Download linked files, in order, within a total byte budget.
///
/// Failures are logged and skipped; the email is sent with whatever was fetched.
pub async fn download_attachments(
    client: &reqwest::Client,
    links: &[AttachmentLink],
    max_total_bytes: u64,
) -> Vec<EmailAttachment> {
    let mut remaining = max_total_bytes;
    let mut attachments = Vec::new();

    for link in links {
        let Some(url) = link.url.as_deref() else {
            continue;
        };

        match fetch(client, url, remaining).await {
            Ok((content_type, content)) => {
                remaining = remaining.saturating_sub(content.len() as u64);
                tracing::debug!(file_name = %link.name, size = content.len(), "Attachment downloaded");
                attachments.push(EmailAttachment {
                    filename: link.name.clone(),
                    content_type,
                    content,
                });
            }
            Err(e) => {
                tracing::warn!(file_name = %link.name, error = %e, "Skipping attachment");
            }
        }
    }

    attachments
}

async fn fetch(client: &reqwest::Client, url: &str, limit: u64) -> deskflow_common::Result<(String, Vec<u8>)> {
    let response = client.get(url).send().await?.error_for_status()?;

    if let Some(size) = response.content_length().filter(|len| *len > limit) {
        return Err(AppError::PayloadTooLarge { size, limit });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let bytes = response.bytes().await?;
    if bytes.len() as u64 > limit {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len() as u64,
            limit,
        });
    }

    Ok((content_type, bytes.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn link(name: &str, url: Option<String>) -> AttachmentLink {
        AttachmentLink {
            name: name.to_string(),
            url,
        }
    }

    #[test]
    fn test_payload_wire_names() {
        let request: NotificationRequest = serde_json::from_value(serde_json::json!({
            "idCorrelativo": 42,
            "tipo": "Factura",
            "proveedor": "ACME",
            "rut": "76.123.456-7",
            "proyectoNombre": "Teatro",
            "ceco": "CC-1",
            "glosa": "Arriendo",
            "valor": 2000000,
            "archivosAdjuntos": [{ "nombre": "a.pdf", "url": "https://x.test/a.pdf" }],
            "usuarioEmail": "ana@fch.cl"
        }))
        .unwrap();

        assert_eq!(request.correlative, 42);
        assert_eq!(request.value, Decimal::from(2_000_000));
        assert_eq!(request.sub_project, None);
        assert_eq!(request.attachments[0].url.as_deref(), Some("https://x.test/a.pdf"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(NotifyError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(NotifyError::MissingCredentials.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(NotifyError::InvalidPayload("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_skips_failures_and_respects_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8; 10], "application/pdf"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/big.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 100], "application/zip"))
            .mount(&server)
            .await;

        let links = vec![
            link("a.pdf", Some(format!("{}/a.pdf", server.uri()))),
            link("sin-url.pdf", None),
            link("missing.pdf", Some(format!("{}/missing.pdf", server.uri()))),
            link("big.zip", Some(format!("{}/big.zip", server.uri()))),
        ];

        let attachments = download_attachments(&reqwest::Client::new(), &links, 50).await;

        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "a.pdf");
        assert_eq!(attachments[0].content_type, "application/pdf");
        assert_eq!(attachments[0].content.len(), 10);
    }
}
