//! SMTP relay transport

use super::{Mailer, OutgoingEmail};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use uuid::Uuid;

/// Implicit-TLS submission port; other ports use STARTTLS
const SMTPS_PORT: u16 = 465;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a relay transport. No connection is opened until the first send.
    pub fn new(host: &str, port: u16, username: &str, password: &str, from: &str) -> Result<Self> {
        let from: Mailbox = from.parse()?;

        let builder = if port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };

        let transport = builder
            .port(port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        Ok(Self { transport, from })
    }

    /// Assemble the MIME message: HTML body, then one part per attachment
    fn build_message(&self, email: OutgoingEmail, message_id: &str) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject)
            .message_id(Some(message_id.to_string()));

        for recipient in &email.to {
            builder = builder.to(recipient.parse()?);
        }

        let html = SinglePart::html(email.html_body);

        if email.attachments.is_empty() {
            return builder.singlepart(html).map_err(Into::into);
        }

        let mut parts = MultiPart::mixed().singlepart(html);
        for attachment in email.attachments {
            let content_type = match ContentType::parse(&attachment.content_type) {
                Ok(content_type) => content_type,
                Err(_) => ContentType::parse("application/octet-stream").map_err(|e| AppError::Mail {
                    message: e.to_string(),
                })?,
            };

            parts = parts.singlepart(
                Attachment::new(attachment.filename).body(attachment.content, content_type),
            );
        }

        builder.multipart(parts).map_err(Into::into)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<String> {
        let domain = self.from.email.domain().to_string();
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

        let message = self.build_message(email, &message_id)?;
        self.transport.send(message).await?;

        Ok(message_id)
    }

    fn provider(&self) -> &'static str {
        "smtp"
    }
}
