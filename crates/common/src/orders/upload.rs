//! Attachment upload
//!
//! Files are stored under `{requester}/{record}/{timestamp}_{index}.{ext}`.
//! The timestamp is shared by every file of a submission and the index is
//! the file's position in the selection, so keys never collide within one
//! submission.

use super::PendingFile;
use crate::db::models::AttachmentMeta;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::storage::ObjectStore;
use futures::{future::BoxFuture, stream, FutureExt, StreamExt, TryStreamExt};
use std::sync::Arc;
use uuid::Uuid;

const FALLBACK_EXTENSION: &str = "bin";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Extension taken after the last dot, restricted to ASCII alphanumerics
pub fn file_extension(file_name: &str) -> String {
    let raw = file_name.rsplit('.').next().unwrap_or_default();
    let ext: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();

    if ext.is_empty() {
        FALLBACK_EXTENSION.to_string()
    } else {
        ext
    }
}

/// Storage key for the `index`-th file of a submission
pub fn storage_key(
    requester_id: Uuid,
    record_id: Uuid,
    submitted_at_ms: i64,
    index: usize,
    file_name: &str,
) -> String {
    format!(
        "{}/{}/{}_{}.{}",
        requester_id,
        record_id,
        submitted_at_ms,
        index,
        file_extension(file_name)
    )
}

/// Uploads a submission's files to object storage
#[derive(Clone)]
pub struct AttachmentUploader {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
}

impl AttachmentUploader {
    pub fn new(store: Arc<dyn ObjectStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload every file and return their metadata in selection order.
    ///
    /// Stops at the first failure. Objects stored before the failure are
    /// left in place.
    pub async fn upload_all(
        &self,
        requester_id: Uuid,
        record_id: Uuid,
        submitted_at_ms: i64,
        files: &[PendingFile],
    ) -> Result<Vec<AttachmentMeta>> {
        // Owned, boxed futures keep the returned future `Send`
        let uploads: Vec<BoxFuture<'static, Result<AttachmentMeta>>> = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let key = storage_key(requester_id, record_id, submitted_at_ms, index, &file.name);
                upload_one(Arc::clone(&self.store), key, file.clone()).boxed()
            })
            .collect();

        stream::iter(uploads)
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

async fn upload_one(store: Arc<dyn ObjectStore>, key: String, file: PendingFile) -> Result<AttachmentMeta> {
    let content_type = if file.content_type.trim().is_empty() {
        FALLBACK_CONTENT_TYPE
    } else {
        file.content_type.as_str()
    };

    match store.upload(&key, content_type, file.bytes.clone()).await {
        Ok(path) => {
            metrics::record_upload(file.size(), true);
            tracing::debug!(file_name = %file.name, path = %path, size = file.size(), "Attachment uploaded");

            Ok(AttachmentMeta {
                name: file.name.clone(),
                path,
                size: file.size(),
                content_type: content_type.to_string(),
            })
        }
        Err(e) => {
            metrics::record_upload(file.size(), false);
            tracing::warn!(file_name = %file.name, path = %key, error = %e, "Attachment upload failed");

            Err(AppError::Upload {
                file_name: file.name,
                message: e.to_string(),
            })
        }
    }
}
