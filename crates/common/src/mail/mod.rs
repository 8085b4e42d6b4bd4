//! Outgoing mail abstraction
//!
//! Provides a unified interface for the two supported transports:
//! - SMTP relay with account credentials
//! - Transactional email HTTP API with an API key

mod api;
mod smtp;

pub use api::ApiMailer;
pub use smtp::SmtpMailer;

use crate::config::{MailConfig, MailProvider};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// File attached to an outgoing email
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// A rendered email ready for dispatch
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<EmailAttachment>,
}

/// Trait for mail dispatch
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the email and return the provider's message id
    async fn send(&self, email: OutgoingEmail) -> Result<String>;

    /// Transport name for logs and metrics
    fn provider(&self) -> &'static str;
}

/// Build the configured mailer.
///
/// Missing credentials are a configuration error; callers must not attempt
/// a partial send in that case.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    let from = config.sender_mailbox().ok_or_else(|| AppError::Configuration {
        message: "mail sender address is not configured".to_string(),
    })?;

    match config.provider {
        MailProvider::Smtp => {
            let (username, password) = match (
                non_empty(config.smtp_username.as_deref()),
                non_empty(config.smtp_password.as_deref()),
            ) {
                (Some(u), Some(p)) => (u, p),
                _ => {
                    return Err(AppError::Configuration {
                        message: "SMTP credentials are not configured".to_string(),
                    })
                }
            };

            let mailer = SmtpMailer::new(&config.smtp_host, config.smtp_port, username, password, &from)?;
            Ok(Arc::new(mailer))
        }
        MailProvider::Api => {
            let api_key = non_empty(config.api_key.as_deref()).ok_or_else(|| AppError::Configuration {
                message: "mail API key is not configured".to_string(),
            })?;

            let mailer = ApiMailer::new(
                &config.api_base,
                api_key,
                &from,
                std::time::Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Arc::new(mailer))
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_smtp_credentials() {
        let mut config = MailConfig::default();
        config.smtp_username = Some("oc@fch.cl".to_string());

        let err = build_mailer(&config).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = MailConfig::default();
        config.provider = MailProvider::Api;
        config.from_address = Some("noreply@fch.cl".to_string());
        config.api_key = Some("   ".to_string());

        assert!(build_mailer(&config).is_err());
    }

    #[test]
    fn test_api_mailer_built_with_key() {
        let mut config = MailConfig::default();
        config.provider = MailProvider::Api;
        config.from_address = Some("noreply@fch.cl".to_string());
        config.api_key = Some("re_123".to_string());

        let mailer = build_mailer(&config).unwrap();
        assert_eq!(mailer.provider(), "api");
    }
}
