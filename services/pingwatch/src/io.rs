//! HTTP and SMTP client abstractions for testability

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::PingwatchError;

const USER_AGENT: &str = concat!("pingwatch/", env!("CARGO_PKG_VERSION"));
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a GET request, giving up after `timeout`
    async fn get(&self, url: &str, timeout: Duration) -> crate::Result<HttpResponse>;
}

/// Production HTTP client using reqwest
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| PingwatchError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, timeout: Duration) -> crate::Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PingwatchError::Timeout(timeout.as_secs())
                } else if e.is_connect() {
                    PingwatchError::Connection(e.to_string())
                } else {
                    PingwatchError::Http(format!("GET {} failed: {}", url, e))
                }
            })?;

        let status = response.status().as_u16();
        tracing::debug!("GET {} -> {}", url, status);
        Ok(HttpResponse { status })
    }
}

/// A rendered email ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub body_text: String,
    pub body_html: Option<String>,
    pub recipients: Vec<String>,
}

/// Abstraction over mail delivery for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MailTransport: Send + Sync {
    /// Deliver a message to all of its recipients
    async fn send(&self, message: &EmailMessage) -> crate::Result<()>;

    /// Check that the server is reachable and accepts our credentials
    async fn test_connection(&self) -> crate::Result<()>;
}

/// Production mail transport speaking SMTP through lettre
pub struct SmtpMailTransport {
    server: String,
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailTransport")
            .field("server", &self.server)
            .field("from", &self.from.to_string())
            .finish()
    }
}

impl SmtpMailTransport {
    pub fn new(config: &EmailConfig) -> crate::Result<Self> {
        let from: Mailbox = config.from_email.parse().map_err(|e| {
            PingwatchError::Config(format!(
                "Invalid from address {}: {}",
                config.from_email, e
            ))
        })?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server).map_err(
                |e| PingwatchError::Notifier(format!("SMTP relay {}: {}", config.smtp_server, e)),
            )?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        tracing::debug!(
            "Created SMTP transport for {}:{} (tls={})",
            config.smtp_server,
            config.smtp_port,
            config.use_tls
        );

        Ok(Self {
            server: format!("{}:{}", config.smtp_server, config.smtp_port),
            from,
            transport,
        })
    }

    fn build_message(&self, message: &EmailMessage) -> crate::Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone());
        for recipient in &message.recipients {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                PingwatchError::Notifier(format!("Invalid recipient {}: {}", recipient, e))
            })?;
            builder = builder.to(mailbox);
        }

        let built = match &message.body_html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.body_text.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body_text.clone()),
        };
        built.map_err(|e| PingwatchError::Notifier(format!("Building email: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: &EmailMessage) -> crate::Result<()> {
        let email = self.build_message(message)?;
        tracing::debug!(
            "Sending '{}' to {} recipients via {}",
            message.subject,
            message.recipients.len(),
            self.server
        );
        self.transport
            .send(email)
            .await
            .map_err(|e| PingwatchError::Notifier(format!("SMTP send via {}: {}", self.server, e)))?;
        Ok(())
    }

    async fn test_connection(&self) -> crate::Result<()> {
        tracing::info!("Testing SMTP connection to {}", self.server);
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(PingwatchError::Notifier(format!(
                "SMTP server {} did not accept the connection",
                self.server
            ))),
            Err(e) => Err(PingwatchError::Notifier(format!(
                "SMTP connection to {} failed: {}",
                self.server, e
            ))),
        }
    }
}
