//! Notification composer
//!
//! Signing is the only step that performs I/O. Rendering and recipient
//! resolution are pure, so the same template serves both the submission
//! pipeline and the standalone notification endpoint.

use crate::db::models::{AttachmentMeta, CompanyEmailConfig, PurchaseOrder};
use crate::storage::ObjectStore;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use futures::future::join_all;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y, %H:%M:%S";

/// Attachment as shown in the email: a link when signing succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentLink {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Everything the template needs
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationData {
    pub correlative: i64,
    /// Document type label
    pub document_type: String,
    pub supplier: String,
    pub supplier_tax_id: String,
    pub project_name: String,
    pub sub_project: Option<String>,
    pub cost_center: String,
    pub glosa: String,
    pub value: Decimal,
    /// Trusted markup, inserted unescaped
    pub detail: Option<String>,
    pub attachments: Vec<AttachmentLink>,
    pub requester_email: String,
    /// Preformatted local timestamp
    pub submitted_at: String,
    /// Subject prefix from the company configuration
    pub label: Option<String>,
}

impl NotificationData {
    /// Template data for a stored record
    pub fn from_record(
        record: &PurchaseOrder,
        attachments: Vec<AttachmentLink>,
        submitted_at: String,
        label: Option<String>,
    ) -> Self {
        Self {
            correlative: record.correlative,
            document_type: record.document_type_label(),
            supplier: record.supplier.clone(),
            supplier_tax_id: record.supplier_tax_id.clone(),
            project_name: record.project_name.clone(),
            sub_project: record.sub_project.clone(),
            cost_center: record.cost_center.clone(),
            glosa: record.glosa.clone(),
            value: record.value,
            detail: record.detail.clone(),
            attachments,
            requester_email: record.requester_email.clone(),
            submitted_at,
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub subject: String,
    pub html_body: String,
}

/// A composed notification ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub html_body: String,
    pub recipients: Vec<String>,
}

/// Sign a download link for each attachment, preserving order.
///
/// A failed signature leaves the link empty; it never fails the batch.
pub async fn sign_links(
    store: &dyn ObjectStore,
    attachments: &[AttachmentMeta],
    ttl_secs: u64,
) -> Vec<AttachmentLink> {
    let signatures = attachments.iter().map(|attachment| async move {
        let url = match store.signed_url(&attachment.path, ttl_secs).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(path = %attachment.path, error = %e, "Failed to sign attachment link");
                None
            }
        };

        AttachmentLink {
            name: attachment.name.clone(),
            url,
        }
    });

    join_all(signatures).await
}

/// Chilean peso amount: `$` prefix, `.` thousands separator, no decimals
pub fn format_clp(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// `dd-mm-YYYY, HH:MM:SS` at the given offset from UTC
pub fn format_timestamp(at: DateTime<Utc>, utc_offset_minutes: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());

    at.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string()
}

/// Escape text for an HTML text or attribute context
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Requester first, then the configured list (or `fallback` when there is
/// none). Blank entries are skipped and duplicates are dropped
/// case-insensitively; the first spelling wins.
pub fn resolve_recipients(requester: &str, configured: Option<&[String]>, fallback: &[String]) -> Vec<String> {
    let list = configured.unwrap_or(fallback);

    let mut seen = HashSet::new();
    let mut recipients = Vec::with_capacity(list.len() + 1);

    for address in std::iter::once(requester).chain(list.iter().map(String::as_str)) {
        let address = address.trim();
        if address.is_empty() {
            continue;
        }
        if seen.insert(address.to_lowercase()) {
            recipients.push(address.to_string());
        }
    }

    recipients
}

pub fn subject(data: &NotificationData) -> String {
    let base = format!(
        "Nueva Solicitud OC #{} - {} ({})",
        data.correlative,
        data.supplier,
        format_clp(data.value)
    );

    match data.label.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(label) => format!("[{}] {}", label, base),
        None => base,
    }
}

fn field(out: &mut String, label: &str, value: &str) {
    let _ = write!(
        out,
        r#"<div class="field"><span class="label">{}:</span><span class="value">{}</span></div>"#,
        label,
        escape_html(value)
    );
}

/// Render subject and HTML body
pub fn render(data: &NotificationData) -> RenderedNotification {
    let mut body = String::with_capacity(4096);

    body.push_str(concat!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><style>",
        "body{font-family:Arial,sans-serif;line-height:1.6;color:#333}",
        ".container{max-width:600px;margin:0 auto;padding:20px}",
        ".header{background:#FF5100;color:#fff;padding:20px;text-align:center;border-radius:8px 8px 0 0}",
        ".content{background:#f9f9f9;padding:30px;border:1px solid #ddd}",
        ".field{margin-bottom:15px}",
        ".label{font-weight:bold;color:#555}",
        ".value{color:#333;margin-left:10px}",
        ".highlight{background:#fff3cd;padding:10px;border-left:4px solid #ffc107;margin:15px 0}",
        ".footer{margin-top:20px;padding:15px;background:#f0f0f0;border-radius:0 0 8px 8px;text-align:center;font-size:12px;color:#666}",
        "</style></head><body><div class=\"container\">",
    ));

    let _ = write!(
        body,
        "<div class=\"header\"><h2>Nueva Solicitud de Orden de Compra #{}</h2></div>",
        data.correlative
    );

    body.push_str("<div class=\"content\">");
    field(&mut body, "Tipo", &data.document_type);
    field(&mut body, "Proveedor", &data.supplier);
    field(&mut body, "RUT", &data.supplier_tax_id);
    field(&mut body, "Proyecto", &data.project_name);
    if let Some(sub_project) = data.sub_project.as_deref().filter(|s| !s.trim().is_empty()) {
        field(&mut body, "Subproyecto", sub_project);
    }
    field(&mut body, "CECO", &data.cost_center);
    field(&mut body, "Glosa", &data.glosa);

    let _ = write!(
        body,
        "<div class=\"highlight\"><div class=\"field\"><span class=\"label\">Valor:</span>\
         <span class=\"value\" style=\"font-size:18px;font-weight:bold\">{}</span></div></div>",
        escape_html(&format_clp(data.value))
    );

    if let Some(detail) = data.detail.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = write!(
            body,
            "<div class=\"field\"><span class=\"label\">Detalle:</span>\
             <div style=\"margin-top:5px;padding:10px;background:#fff;border-radius:4px\">{}</div></div>",
            detail
        );
    }

    if !data.attachments.is_empty() {
        let _ = write!(
            body,
            "<div class=\"field\"><span class=\"label\">Archivos adjuntos ({}):</span><ul>",
            data.attachments.len()
        );
        for attachment in &data.attachments {
            match &attachment.url {
                Some(url) => {
                    let _ = write!(
                        body,
                        "<li><a href=\"{}\">{}</a></li>",
                        escape_html(url),
                        escape_html(&attachment.name)
                    );
                }
                None => {
                    let _ = write!(body, "<li>{}</li>", escape_html(&attachment.name));
                }
            }
        }
        body.push_str("</ul></div>");
    }
    body.push_str("</div>");

    let _ = write!(
        body,
        "<div class=\"footer\"><p>Solicitud enviada por: <strong>{}</strong></p><p>Fecha: {}</p></div>",
        escape_html(&data.requester_email),
        escape_html(&data.submitted_at)
    );
    body.push_str("</div></body></html>");

    RenderedNotification {
        subject: subject(data),
        html_body: body,
    }
}

/// Builds notifications for newly submitted requests
#[derive(Clone)]
pub struct NotificationComposer {
    store: Arc<dyn ObjectStore>,
    link_ttl_secs: u64,
    fallback_recipients: Vec<String>,
    utc_offset_minutes: i32,
}

impl NotificationComposer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        link_ttl_secs: u64,
        fallback_recipients: Vec<String>,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            store,
            link_ttl_secs,
            fallback_recipients,
            utc_offset_minutes,
        }
    }

    /// Sign links, render and resolve recipients for `record`
    pub async fn compose(
        &self,
        record: &PurchaseOrder,
        attachments: &[AttachmentMeta],
        config: Option<&CompanyEmailConfig>,
        submitted_at: DateTime<Utc>,
    ) -> Notification {
        let links = sign_links(self.store.as_ref(), attachments, self.link_ttl_secs).await;

        let configured = config.map(CompanyEmailConfig::recipient_list);
        let label = config.and_then(|c| c.label.clone());

        let data = NotificationData::from_record(
            record,
            links,
            format_timestamp(submitted_at, self.utc_offset_minutes),
            label,
        );
        let rendered = render(&data);

        Notification {
            subject: rendered.subject,
            html_body: rendered.html_body,
            recipients: resolve_recipients(
                &record.requester_email,
                configured.as_deref(),
                &self.fallback_recipients,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AppError, Result};
    use async_trait::async_trait;
    use axum::body::Bytes;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    struct SigningStore;

    #[async_trait]
    impl ObjectStore for SigningStore {
        async fn upload(&self, path: &str, _content_type: &str, _bytes: Bytes) -> Result<String> {
            Ok(path.to_string())
        }

        async fn signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
            if path.contains("broken") {
                return Err(AppError::Storage { message: "not found".to_string() });
            }
            Ok(format!("https://storage.test/{}?ttl={}", path, expires_in_secs))
        }
    }

    fn data() -> NotificationData {
        NotificationData {
            correlative: 12,
            document_type: "Factura".to_string(),
            supplier: "ACME <Ltda>".to_string(),
            supplier_tax_id: "76.123.456-7".to_string(),
            project_name: "Centro Cultural".to_string(),
            sub_project: None,
            cost_center: "CC-101".to_string(),
            glosa: "Arriendo & montaje".to_string(),
            value: dec!(2000000),
            detail: Some("<b>urgente</b>".to_string()),
            attachments: vec![
                AttachmentLink { name: "a.pdf".to_string(), url: Some("https://x.test/a?t=1&u=2".to_string()) },
                AttachmentLink { name: "b.pdf".to_string(), url: None },
            ],
            requester_email: "ana@fch.cl".to_string(),
            submitted_at: "18-10-2026, 11:05:09".to_string(),
            label: None,
        }
    }

    fn meta(name: &str, path: &str) -> AttachmentMeta {
        AttachmentMeta {
            name: name.to_string(),
            path: path.to_string(),
            size: 1,
            content_type: "application/pdf".to_string(),
        }
    }

    #[test]
    fn test_format_clp() {
        assert_eq!(format_clp(dec!(2000000)), "$2.000.000");
        assert_eq!(format_clp(dec!(500000)), "$500.000");
        assert_eq!(format_clp(dec!(999)), "$999");
        assert_eq!(format_clp(dec!(1000)), "$1.000");
        assert_eq!(format_clp(dec!(0)), "$0");
        assert_eq!(format_clp(dec!(1234.5)), "$1.235");
        assert_eq!(format_clp(dec!(1234.49)), "$1.234");
        assert_eq!(format_clp(dec!(-1500)), "-$1.500");
    }

    #[test]
    fn test_format_timestamp_uses_offset() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 14, 5, 9).unwrap();
        assert_eq!(format_timestamp(at, -180), "18-10-2026, 11:05:09");
        assert_eq!(format_timestamp(at, 0), "18-10-2026, 14:05:09");
    }

    #[test]
    fn test_subject() {
        assert_eq!(subject(&data()), "Nueva Solicitud OC #12 - ACME <Ltda> ($2.000.000)");

        let mut labelled = data();
        labelled.label = Some("FCH".to_string());
        assert_eq!(subject(&labelled), "[FCH] Nueva Solicitud OC #12 - ACME <Ltda> ($2.000.000)");
    }

    #[test]
    fn test_render_escapes_fields_but_not_detail() {
        let rendered = render(&data());
        let html = &rendered.html_body;

        assert!(html.contains("ACME &lt;Ltda&gt;"));
        assert!(html.contains("Arriendo &amp; montaje"));
        assert!(html.contains("<b>urgente</b>"));
        assert!(html.contains("$2.000.000"));
        assert!(html.contains(r#"<a href="https://x.test/a?t=1&amp;u=2">a.pdf</a>"#));
        assert!(html.contains("<li>b.pdf</li>"));
        assert!(!html.contains("Subproyecto"));
        assert!(html.contains("18-10-2026, 11:05:09"));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(render(&data()), render(&data()));
    }

    #[test]
    fn test_resolve_recipients_dedups_case_insensitively() {
        let configured = vec![
            " Ana@FCH.cl ".to_string(),
            "emilio.lopez@fch.cl".to_string(),
            "".to_string(),
            "EMILIO.LOPEZ@fch.cl".to_string(),
        ];
        let recipients = resolve_recipients("ana@fch.cl", Some(&configured), &[]);
        assert_eq!(recipients, vec!["ana@fch.cl", "emilio.lopez@fch.cl"]);
    }

    #[test]
    fn test_resolve_recipients_fallback_only_without_config() {
        let fallback = vec!["fabiola.gonzalez@fch.cl".to_string()];

        let recipients = resolve_recipients("ana@fch.cl", None, &fallback);
        assert_eq!(recipients, vec!["ana@fch.cl", "fabiola.gonzalez@fch.cl"]);

        let recipients = resolve_recipients("ana@fch.cl", Some(&[]), &fallback);
        assert_eq!(recipients, vec!["ana@fch.cl"]);
    }

    fn record() -> PurchaseOrder {
        PurchaseOrder {
            id: uuid::Uuid::from_u128(3),
            correlative: 12,
            company: "FCH".to_string(),
            document_type: "factura".to_string(),
            supplier: "ACME".to_string(),
            supplier_tax_id: "76.123.456-7".to_string(),
            project_id: uuid::Uuid::from_u128(9),
            project_name: "Centro Cultural".to_string(),
            sub_project: Some("Sala 2".to_string()),
            cost_center: "CC-101".to_string(),
            glosa: "Arriendo".to_string(),
            detail: None,
            value: dec!(2000000),
            attachments: serde_json::json!([]),
            status: "enviada".to_string(),
            erp_reference: None,
            requester_id: uuid::Uuid::from_u128(1),
            requester_email: "ana@fch.cl".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 10, 18, 14, 5, 9).unwrap().into(),
        }
    }

    #[tokio::test]
    async fn test_compose_is_deterministic() {
        let composer = NotificationComposer::new(
            Arc::new(SigningStore),
            604_800,
            vec!["compras@fch.cl".to_string()],
            -180,
        );
        let attachments = vec![meta("a.pdf", "u/r/1_0.pdf"), meta("b.pdf", "u/r/1_1.pdf")];
        let config = CompanyEmailConfig {
            company: "FCH".to_string(),
            label: Some("FCH".to_string()),
            recipients: serde_json::json!(["jefa@fch.cl", "ANA@fch.cl"]),
            updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap().into(),
        };
        let submitted_at = Utc.with_ymd_and_hms(2026, 10, 18, 14, 5, 9).unwrap();

        let first = composer.compose(&record(), &attachments, Some(&config), submitted_at).await;
        let second = composer.compose(&record(), &attachments, Some(&config), submitted_at).await;

        assert_eq!(first, second);
        assert_eq!(first.subject, "[FCH] Nueva Solicitud OC #12 - ACME ($2.000.000)");
        assert_eq!(first.recipients, vec!["ana@fch.cl", "jefa@fch.cl"]);
        assert!(first.html_body.contains("https://storage.test/u/r/1_1.pdf?ttl=604800"));
        assert!(first.html_body.contains("18-10-2026, 11:05:09"));
    }

    #[tokio::test]
    async fn test_sign_links_keeps_order_and_tolerates_failure() {
        let attachments = vec![meta("a.pdf", "u/r/1_0.pdf"), meta("b.pdf", "u/r/broken"), meta("c.pdf", "u/r/1_2.pdf")];

        let links = sign_links(&SigningStore, &attachments, 604_800).await;

        assert_eq!(links.len(), 3);
        assert_eq!(links[0].url.as_deref(), Some("https://storage.test/u/r/1_0.pdf?ttl=604800"));
        assert_eq!(links[1], AttachmentLink { name: "b.pdf".to_string(), url: None });
        assert_eq!(links[2].name, "c.pdf");
    }
}
