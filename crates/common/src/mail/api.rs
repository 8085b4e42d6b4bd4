//! Transactional email API transport (Resend-compatible `POST /emails`)

use super::{Mailer, OutgoingEmail};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct ApiMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ApiAttachment>,
}

#[derive(Serialize)]
struct ApiAttachment {
    filename: String,
    /// Base64 file content
    content: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl ApiMailer {
    pub fn new(base_url: &str, api_key: &str, from: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            from: from.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Mailer for ApiMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<String> {
        let url = format!("{}/emails", self.base_url);

        let attachments = email.attachments
            .into_iter()
            .map(|a| ApiAttachment {
                filename: a.filename,
                content: STANDARD.encode(a.content),
            })
            .collect();

        let request = SendRequest {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html_body,
            attachments,
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Mail {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Mail {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: SendResponse = response.json().await.map_err(|e| AppError::Mail {
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(result.id)
    }

    fn provider(&self) -> &'static str {
        "api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::EmailAttachment;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: vec!["ana@fch.cl".to_string()],
            subject: "Nueva Solicitud OC #3 - ACME ($500.000)".to_string(),
            html_body: "<p>ok</p>".to_string(),
            attachments: vec![EmailAttachment {
                filename: "a.txt".to_string(),
                content_type: "text/plain".to_string(),
                content: b"hola".to_vec(),
            }],
        }
    }

    #[tokio::test]
    async fn test_send_returns_provider_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "msg_123" })))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = ApiMailer::new(&server.uri(), "re_key", "DeskFlow FCH <oc@fch.cl>", Duration::from_secs(5)).unwrap();
        let id = mailer.send(email()).await.unwrap();
        assert_eq!(id, "msg_123");

        let requests: Vec<Request> = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["to"], serde_json::json!(["ana@fch.cl"]));
        assert_eq!(body["attachments"][0]["content"], "aG9sYQ==");
    }

    #[tokio::test]
    async fn test_api_error_is_mail_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid from"))
            .mount(&server)
            .await;

        let mailer = ApiMailer::new(&server.uri(), "re_key", "oc@fch.cl", Duration::from_secs(5)).unwrap();
        let err = mailer.send(email()).await.unwrap_err();
        assert!(matches!(err, AppError::Mail { ref message } if message.contains("422")));
    }
}
