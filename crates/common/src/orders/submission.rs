//! Submission orchestrator
//!
//! Drives a request through validation, record creation, attachment upload,
//! record patch and notification. Each step runs only after the previous one
//! succeeded. Nothing is rolled back: a failure after the insert leaves the
//! record (and any stored objects) in place and reports how far it got.

use super::notification::NotificationComposer;
use super::upload::AttachmentUploader;
use super::validation::{validate, PurchaseOrderDraft, ValidationFailure};
use crate::db::models::{AttachmentMeta, CompanyEmailConfig, PurchaseOrder};
use crate::db::{NewPurchaseOrder, Repository};
use crate::errors::{AppError, Result};
use crate::mail::{Mailer, OutgoingEmail};
use crate::metrics;
use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// Persistence needed by a submission
#[async_trait]
pub trait PurchaseOrderStore: Send + Sync {
    /// Insert the base record and assign its correlative
    async fn insert_purchase_order(&self, new: NewPurchaseOrder) -> Result<PurchaseOrder>;

    /// Replace the attachment list of a record
    async fn patch_attachments(&self, id: Uuid, attachments: &[AttachmentMeta]) -> Result<()>;

    /// Recipient configuration for a company, if any
    async fn email_config(&self, company: &str) -> Result<Option<CompanyEmailConfig>>;
}

#[async_trait]
impl PurchaseOrderStore for Repository {
    async fn insert_purchase_order(&self, new: NewPurchaseOrder) -> Result<PurchaseOrder> {
        self.create_purchase_order(new).await
    }

    async fn patch_attachments(&self, id: Uuid, attachments: &[AttachmentMeta]) -> Result<()> {
        self.set_attachments(id, attachments).await
    }

    async fn email_config(&self, company: &str) -> Result<Option<CompanyEmailConfig>> {
        self.find_email_config(company).await
    }
}

/// Pipeline progress, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Validated,
    RecordCreated,
    AttachmentsUploaded,
    RecordPatched,
    Notified,
    Complete,
}

impl SubmissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStage::Validated => "validated",
            SubmissionStage::RecordCreated => "record_created",
            SubmissionStage::AttachmentsUploaded => "attachments_uploaded",
            SubmissionStage::RecordPatched => "record_patched",
            SubmissionStage::Notified => "notified",
            SubmissionStage::Complete => "complete",
        }
    }
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated user submitting a request
#[derive(Debug, Clone)]
pub struct Requester {
    pub id: Uuid,
    pub email: String,
    pub company: String,
}

/// Record created before a later step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersistedRecord {
    pub id: Uuid,
    pub correlative: i64,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Rejected before any I/O
    #[error("{0}")]
    Invalid(ValidationFailure),

    #[error("Error al crear la solicitud: {source}")]
    CreateRecord { source: AppError },

    #[error("Error al procesar la solicitud: {source}")]
    UploadAttachments { record: PersistedRecord, source: AppError },

    #[error("Error al procesar la solicitud: {source}")]
    PatchRecord { record: PersistedRecord, source: AppError },

    #[error("La solicitud #{} fue creada pero no se pudo enviar la notificación: {source}", .record.correlative)]
    Notify { record: PersistedRecord, source: AppError },
}

impl SubmissionError {
    /// Last stage completed before the failure; `None` when validation failed
    pub fn stage_reached(&self) -> Option<SubmissionStage> {
        match self {
            SubmissionError::Invalid(_) => None,
            SubmissionError::CreateRecord { .. } => Some(SubmissionStage::Validated),
            SubmissionError::UploadAttachments { .. } => Some(SubmissionStage::RecordCreated),
            SubmissionError::PatchRecord { .. } => Some(SubmissionStage::AttachmentsUploaded),
            SubmissionError::Notify { .. } => Some(SubmissionStage::RecordPatched),
        }
    }

    /// The record left behind, if one was created
    pub fn record(&self) -> Option<PersistedRecord> {
        match self {
            SubmissionError::Invalid(_) | SubmissionError::CreateRecord { .. } => None,
            SubmissionError::UploadAttachments { record, .. }
            | SubmissionError::PatchRecord { record, .. }
            | SubmissionError::Notify { record, .. } => Some(*record),
        }
    }

    fn metric_stage(&self) -> &'static str {
        match self.stage_reached() {
            Some(stage) => stage.as_str(),
            None => "validation",
        }
    }
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        let details = serde_json::json!({
            "stage": self.metric_stage(),
            "record_id": self.record().map(|r| r.id),
            "correlative": self.record().map(|r| r.correlative),
        });
        let message = self.to_string();

        let error = match self {
            SubmissionError::Invalid(failure) => return AppError::from(failure).into_response(),
            SubmissionError::CreateRecord { source }
            | SubmissionError::UploadAttachments { source, .. }
            | SubmissionError::PatchRecord { source, .. } => source,
            // The record exists; report the failed dispatch with the stage-aware message
            SubmissionError::Notify { .. } => AppError::Mail { message },
        };

        error.to_response(Some(details))
    }
}

/// Outcome of a successful submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub id: Uuid,
    pub correlative: i64,
    pub status: String,
    pub attachments: Vec<AttachmentMeta>,
    pub recipients: Vec<String>,
    pub message_id: String,
    pub stage: SubmissionStage,
}

/// Runs the submission pipeline against its collaborators
#[derive(Clone)]
pub struct SubmissionOrchestrator {
    store: Arc<dyn PurchaseOrderStore>,
    uploader: AttachmentUploader,
    composer: NotificationComposer,
    mailer: Option<Arc<dyn Mailer>>,
}

impl SubmissionOrchestrator {
    /// `mailer` is `None` when mail credentials are not configured; such
    /// submissions fail at the notification step.
    pub fn new(
        store: Arc<dyn PurchaseOrderStore>,
        uploader: AttachmentUploader,
        composer: NotificationComposer,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            store,
            uploader,
            composer,
            mailer,
        }
    }

    /// Validate and submit a request
    pub async fn submit(
        &self,
        requester: &Requester,
        draft: PurchaseOrderDraft,
    ) -> std::result::Result<SubmissionReceipt, SubmissionError> {
        let start = Instant::now();
        let result = self.run(requester, draft).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(receipt) => {
                metrics::record_submission(elapsed, "success", SubmissionStage::Complete.as_str());
                tracing::info!(
                    record_id = %receipt.id,
                    correlative = receipt.correlative,
                    stage = %SubmissionStage::Complete,
                    duration_ms = (elapsed * 1000.0) as u64,
                    "Submission complete"
                );
            }
            Err(e) => {
                metrics::record_submission(elapsed, "failure", e.metric_stage());
                tracing::warn!(
                    record_id = ?e.record().map(|r| r.id),
                    stage = e.metric_stage(),
                    error = %e,
                    "Submission failed"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        requester: &Requester,
        draft: PurchaseOrderDraft,
    ) -> std::result::Result<SubmissionReceipt, SubmissionError> {
        let validated = validate(draft).map_err(SubmissionError::Invalid)?;
        let submitted_at = Utc::now();
        tracing::debug!(stage = %SubmissionStage::Validated, files = validated.attachments.len(), "Request validated");

        let record = self
            .store
            .insert_purchase_order(validated.to_new_record(requester))
            .await
            .map_err(|source| SubmissionError::CreateRecord { source })?;

        let persisted = PersistedRecord {
            id: record.id,
            correlative: record.correlative,
        };
        tracing::info!(
            record_id = %record.id,
            correlative = record.correlative,
            stage = %SubmissionStage::RecordCreated,
            "Record created"
        );

        let attachments = self
            .uploader
            .upload_all(
                requester.id,
                record.id,
                submitted_at.timestamp_millis(),
                &validated.attachments,
            )
            .await
            .map_err(|source| SubmissionError::UploadAttachments { record: persisted, source })?;
        tracing::info!(
            record_id = %record.id,
            stage = %SubmissionStage::AttachmentsUploaded,
            count = attachments.len(),
            "Attachments uploaded"
        );

        self.store
            .patch_attachments(record.id, &attachments)
            .await
            .map_err(|source| SubmissionError::PatchRecord { record: persisted, source })?;
        tracing::info!(record_id = %record.id, stage = %SubmissionStage::RecordPatched, "Record patched");

        let (recipients, message_id) = self
            .notify(&record, &attachments, &requester.company, submitted_at)
            .await
            .map_err(|source| SubmissionError::Notify { record: persisted, source })?;
        tracing::info!(
            record_id = %record.id,
            stage = %SubmissionStage::Notified,
            message_id = %message_id,
            recipients = recipients.len(),
            "Notification sent"
        );

        Ok(SubmissionReceipt {
            id: record.id,
            correlative: record.correlative,
            status: record.status,
            attachments,
            recipients,
            message_id,
            stage: SubmissionStage::Complete,
        })
    }

    async fn notify(
        &self,
        record: &PurchaseOrder,
        attachments: &[AttachmentMeta],
        company: &str,
        submitted_at: chrono::DateTime<Utc>,
    ) -> Result<(Vec<String>, String)> {
        let mailer = self.mailer.as_ref().ok_or_else(|| AppError::Configuration {
            message: "mail credentials are not configured".to_string(),
        })?;

        let config = self.store.email_config(company).await?;
        let notification = self
            .composer
            .compose(record, attachments, config.as_ref(), submitted_at)
            .await;

        let email = OutgoingEmail {
            to: notification.recipients.clone(),
            subject: notification.subject,
            html_body: notification.html_body,
            attachments: Vec::new(),
        };

        let sent = mailer.send(email).await;
        metrics::record_email(mailer.provider(), sent.is_ok());

        Ok((notification.recipients, sent?))
    }
}
