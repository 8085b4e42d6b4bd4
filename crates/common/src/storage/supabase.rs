//! Storage client for the platform's object storage REST API

use super::ObjectStore;
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseStorage {
    /// Create a client for `bucket` at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        })
    }

    /// Build from configuration; URL and service key are required
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| AppError::Configuration {
            message: "storage.url is not set".to_string(),
        })?;
        let key = config.service_key.as_deref().ok_or_else(|| AppError::Configuration {
            message: "storage.service_key is not set".to_string(),
        })?;

        Self::new(url, key, config.bucket.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn sign_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/sign/{}/{}", self.base_url, self.bucket, path)
    }

    async fn error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("API error {}: {}", status, body)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(&self, path: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        let response = self.client
            .post(self.object_url(path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Upload request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::Storage {
                message: Self::error_body(response).await,
            });
        }

        tracing::debug!(bucket = %self.bucket, path = %path, "Object stored");
        Ok(path.to_string())
    }

    async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        let response = self.client
            .post(self.sign_url(path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&SignRequest { expires_in: expires_in_secs })
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Sign request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::Storage {
                message: Self::error_body(response).await,
            });
        }

        let signed: SignResponse = response.json().await.map_err(|e| AppError::Storage {
            message: format!("Failed to parse sign response: {}", e),
        })?;

        // The API answers with a path relative to /storage/v1
        if signed.signed_url.starts_with("http") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SupabaseStorage {
        SupabaseStorage::new(server.uri(), "service-key", "oc-adjuntos", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_upload_posts_to_bucket_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/oc-adjuntos/u1/r1/100_0.pdf"))
            .and(header("apikey", "service-key"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Key": "oc-adjuntos/u1/r1/100_0.pdf"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stored = client(&server)
            .upload("u1/r1/100_0.pdf", "application/pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap();

        assert_eq!(stored, "u1/r1/100_0.pdf");
    }

    #[tokio::test]
    async fn test_upload_error_status_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bucket not found"))
            .mount(&server)
            .await;

        let err = client(&server)
            .upload("u1/r1/100_0.pdf", "application/pdf", Bytes::from_static(b"x"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Storage { ref message } if message.contains("Bucket not found")));
    }

    #[tokio::test]
    async fn test_signed_url_is_absolute() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/sign/oc-adjuntos/u1/r1/100_0.pdf"))
            .and(body_json(serde_json::json!({ "expiresIn": 604800 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signedURL": "/object/sign/oc-adjuntos/u1/r1/100_0.pdf?token=abc"
            })))
            .mount(&server)
            .await;

        let url = client(&server)
            .signed_url("u1/r1/100_0.pdf", 604_800)
            .await
            .unwrap();

        assert_eq!(
            url,
            format!("{}/storage/v1/object/sign/oc-adjuntos/u1/r1/100_0.pdf?token=abc", server.uri())
        );
    }
}
