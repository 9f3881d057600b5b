//! Email notifier: renders alerts and summaries and hands them to a mail transport

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::EmailConfig;
use crate::io::{EmailMessage, MailTransport};
use crate::notifier::Notifier;
use crate::status::{UrlState, UrlStatus};
use crate::store::StatusSummary;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const SIGNATURE: &str = "--\npingwatch uptime monitor\n";

/// Email alert sender
pub struct EmailNotifier {
    recipients: Vec<String>,
    transport: Arc<dyn MailTransport>,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("recipients", &self.recipients)
            .finish()
    }
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, transport: Arc<dyn MailTransport>) -> Self {
        tracing::debug!(
            "Created EmailNotifier for {} recipients",
            config.to_emails.len()
        );

        Self {
            recipients: config.to_emails.clone(),
            transport,
        }
    }

    async fn deliver(&self, kind: &str, about: &str, message: EmailMessage) -> crate::Result<()> {
        self.transport.send(&message).await?;
        tracing::info!(
            "Sent {} email for {} to {}",
            kind,
            about,
            self.recipients.join(", ")
        );
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_down_alert(&self, status: &UrlStatus) -> crate::Result<()> {
        let message = down_alert_message(status, &self.recipients);
        self.deliver("DOWN alert", &status.url, message).await
    }

    async fn send_recovery_alert(&self, status: &UrlStatus) -> crate::Result<()> {
        let message = recovery_alert_message(status, &self.recipients);
        self.deliver("RECOVERY alert", &status.url, message).await
    }

    async fn send_summary(&self, statuses: &[UrlStatus]) -> crate::Result<()> {
        let message = summary_message(statuses, Utc::now(), &self.recipients);
        self.deliver("summary", "all URLs", message).await
    }

    async fn test_connection(&self) -> crate::Result<()> {
        self.transport.test_connection().await
    }
}

/// Render the email announcing that a URL went down
pub fn down_alert_message(status: &UrlStatus, recipients: &[String]) -> EmailMessage {
    let when = status.last_state_change.format(TIME_FORMAT).to_string();
    let error = status.last_error_message.as_deref().unwrap_or("Unknown");

    let body_text = format!(
        "Site down\n\n\
         URL: {url}\n\
         Status: DOWN\n\
         Time: {when}\n\
         Consecutive failures: {consecutive}\n\
         Total failures: {total}\n\
         Last error: {error}\n\n\
         The site stopped responding as expected. A recovery notice follows once it is back.\n\n\
         {SIGNATURE}",
        url = status.url,
        consecutive = status.consecutive_failures,
        total = status.total_failures,
    );

    let body_html = html_page(
        "#c62828",
        "Site down",
        &[
            ("URL", link(&status.url)),
            ("Status", "<strong>DOWN</strong>".to_string()),
            ("Time", when),
            (
                "Consecutive failures",
                status.consecutive_failures.to_string(),
            ),
            ("Total failures", status.total_failures.to_string()),
            ("Last error", escape_html(error)),
        ],
        "The site stopped responding as expected. A recovery notice follows once it is back.",
    );

    EmailMessage {
        subject: format!("ALERT: Site down - {}", status.url),
        body_text,
        body_html: Some(body_html),
        recipients: recipients.to_vec(),
    }
}

/// Render the email announcing that a URL recovered
pub fn recovery_alert_message(status: &UrlStatus, recipients: &[String]) -> EmailMessage {
    let when = status.last_state_change.format(TIME_FORMAT).to_string();
    let uptime = status
        .uptime_percentage()
        .map(|p| format!("{:.2}%", p))
        .unwrap_or_else(|| "N/A".to_string());

    let body_text = format!(
        "Site recovered\n\n\
         URL: {url}\n\
         Status: UP\n\
         Recovery time: {when}\n\
         Consecutive successes: {consecutive}\n\
         Lifetime availability: {uptime}\n\n\
         The site is responding as expected again.\n\n\
         {SIGNATURE}",
        url = status.url,
        consecutive = status.consecutive_successes,
    );

    let body_html = html_page(
        "#2e7d32",
        "Site recovered",
        &[
            ("URL", link(&status.url)),
            ("Status", "<strong>UP</strong>".to_string()),
            ("Recovery time", when),
            (
                "Consecutive successes",
                status.consecutive_successes.to_string(),
            ),
            ("Lifetime availability", uptime),
        ],
        "The site is responding as expected again.",
    );

    EmailMessage {
        subject: format!("RECOVERED: Site back online - {}", status.url),
        body_text,
        body_html: Some(body_html),
        recipients: recipients.to_vec(),
    }
}

/// Render the summary report over every known URL
pub fn summary_message(
    statuses: &[UrlStatus],
    generated_at: DateTime<Utc>,
    recipients: &[String],
) -> EmailMessage {
    let summary = StatusSummary::from_statuses(statuses);
    let generated = generated_at.format(TIME_FORMAT).to_string();
    let down: Vec<&UrlStatus> = statuses
        .iter()
        .filter(|s| s.state == UrlState::Down)
        .collect();
    let up: Vec<&UrlStatus> = statuses
        .iter()
        .filter(|s| s.state == UrlState::Up)
        .collect();

    let mut body_text = format!(
        "Summary report\nGenerated: {generated}\n\n\
         Overview:\n\
         - Total URLs: {}\n\
         - Up: {}\n\
         - Down: {}\n\
         - Unknown: {}\n\n\
         Down URLs:\n",
        summary.total, summary.up, summary.down, summary.unknown
    );
    if down.is_empty() {
        body_text.push_str("- None\n");
    }
    for status in &down {
        body_text.push_str(&format!(
            "- {} (failures: {}, last error: {})\n",
            status.url,
            status.consecutive_failures,
            status.last_error_message.as_deref().unwrap_or("Unknown")
        ));
    }
    body_text.push_str("\nUp URLs:\n");
    if up.is_empty() {
        body_text.push_str("- None\n");
    }
    for status in &up {
        body_text.push_str(&format!(
            "- {} (avg response: {})\n",
            status.url,
            format_average(status)
        ));
    }
    body_text.push('\n');
    body_text.push_str(SIGNATURE);

    let down_rows: String = down
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{}</td><td>DOWN</td><td>{}</td><td>{}</td></tr>",
                link(&s.url),
                s.consecutive_failures,
                escape_html(s.last_error_message.as_deref().unwrap_or("Unknown"))
            )
        })
        .collect();
    let up_rows: String = up
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{}</td><td>UP</td><td>{}</td><td>{}</td></tr>",
                link(&s.url),
                s.consecutive_successes,
                format_average(s)
            )
        })
        .collect();

    let body_html = format!(
        "<html><body style=\"font-family: sans-serif;\">\
         <h2>Summary report</h2><p>Generated: {generated}</p>\
         <p>Total: {} &middot; Up: {} &middot; Down: {} &middot; Unknown: {}</p>\
         <h3>Down ({})</h3><table border=\"1\" cellpadding=\"6\">\
         <tr><th>URL</th><th>Status</th><th>Failures</th><th>Last error</th></tr>{}</table>\
         <h3>Up ({})</h3><table border=\"1\" cellpadding=\"6\">\
         <tr><th>URL</th><th>Status</th><th>Successes</th><th>Avg response</th></tr>{}</table>\
         <p style=\"color: #666;\">pingwatch uptime monitor</p></body></html>",
        summary.total,
        summary.up,
        summary.down,
        summary.unknown,
        down.len(),
        down_rows,
        up.len(),
        up_rows
    );

    EmailMessage {
        subject: format!("pingwatch summary - {} URLs monitored", summary.total),
        body_text,
        body_html: Some(body_html),
        recipients: recipients.to_vec(),
    }
}

fn format_average(status: &UrlStatus) -> String {
    status
        .average_response_time
        .map(|secs| format!("{:.3}s", secs))
        .unwrap_or_else(|| "N/A".to_string())
}

fn html_page(color: &str, heading: &str, rows: &[(&str, String)], note: &str) -> String {
    let rows: String = rows
        .iter()
        .map(|(label, value)| {
            format!(
                "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
                label, value
            )
        })
        .collect();
    format!(
        "<html><body style=\"font-family: sans-serif;\">\
         <h2 style=\"color: {color};\">{heading}</h2>\
         <table border=\"1\" cellpadding=\"6\">{rows}</table>\
         <p>{note}</p>\
         <p style=\"color: #666;\">pingwatch uptime monitor</p></body></html>"
    )
}

fn link(url: &str) -> String {
    let escaped = escape_html(url);
    format!("<a href=\"{escaped}\">{escaped}</a>")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
