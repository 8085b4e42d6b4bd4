//! DeskFlow Common Library
//!
//! Shared code for the DeskFlow services including:
//! - Purchase-order request domain (validation, upload, notification, submission)
//! - Database models and repository patterns
//! - Object storage and mail clients
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod mail;
pub mod metrics;
pub mod orders;
pub mod storage;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::Repository;
pub use mail::Mailer;
pub use storage::ObjectStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Storage bucket holding purchase-order attachments
pub const DEFAULT_ATTACHMENT_BUCKET: &str = "oc-adjuntos";

/// Validity of attachment download links (7 days)
pub const SIGNED_URL_TTL_SECS: u64 = 604_800;
