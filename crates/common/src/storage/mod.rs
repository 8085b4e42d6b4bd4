//! Object storage abstraction
//!
//! Attachments are written under a bucket and later read through
//! time-limited signed URLs. The production backend is the storage API of
//! the managed platform (Supabase-compatible REST).

mod supabase;

pub use supabase::SupabaseStorage;

use crate::errors::Result;
use async_trait::async_trait;
use axum::body::Bytes;

/// Trait for attachment storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path` and return the stored path
    async fn upload(&self, path: &str, content_type: &str, bytes: Bytes) -> Result<String>;

    /// Create a download URL for `path` valid for `expires_in_secs`
    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String>;
}
