//! Purchase-order request workflow
//!
//! 1. Screen selected files and validate the form
//! 2. Create the base record
//! 3. Upload attachments under a record-scoped path
//! 4. Patch the record with attachment metadata
//! 5. Compose and dispatch the notification email

pub mod notification;
pub mod query;
pub mod submission;
pub mod upload;
pub mod validation;

pub use notification::{Notification, NotificationComposer, NotificationData};
pub use query::{RequestQuery, SortDirection, SortKey};
pub use submission::{
    PurchaseOrderStore, Requester, SubmissionError, SubmissionOrchestrator, SubmissionReceipt,
    SubmissionStage,
};
pub use upload::AttachmentUploader;
pub use validation::{PurchaseOrderDraft, ValidatedRequest, ValidationFailure};

use axum::body::Bytes;
use rust_decimal::Decimal;

/// Per-file size limit (10 MiB)
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Value from which the stricter attachment minimum applies (CLP)
pub const HIGH_VALUE_THRESHOLD: Decimal = Decimal::from_parts(1_500_000, 0, 0, false, 0);

/// Attachments required below the threshold
/// Decimal places kept by the `valor` column
pub const VALUE_SCALE: u32 = 2;

/// Largest amount the `valor` column holds (99 999 999 999 999.99)
pub const MAX_VALUE: Decimal = Decimal::from_parts(1_874_919_423, 2_328_306, 0, false, VALUE_SCALE);

pub const MIN_ATTACHMENTS: usize = 1;

/// Attachments required at or above the threshold
pub const MIN_ATTACHMENTS_HIGH_VALUE: usize = 3;

/// A file selected by the requester, held in memory until upload
#[derive(Debug, Clone)]
pub struct PendingFile {
    /// Original file name
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Minimum attachment count for a request of `value`
pub fn required_attachments(value: Decimal) -> usize {
    if value >= HIGH_VALUE_THRESHOLD {
        MIN_ATTACHMENTS_HIGH_VALUE
    } else {
        MIN_ATTACHMENTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_required_attachments_tiers() {
        assert_eq!(required_attachments(dec!(1)), 1);
        assert_eq!(required_attachments(dec!(1499999.99)), 1);
        assert_eq!(required_attachments(dec!(1500000)), 3);
        assert_eq!(required_attachments(dec!(2000000)), 3);
    }

    #[test]
    fn test_threshold_constant() {
        assert_eq!(HIGH_VALUE_THRESHOLD, dec!(1500000));
        assert_eq!(MAX_VALUE, dec!(99999999999999.99));
    }
}
