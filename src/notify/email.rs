//! Email alert channel using lettre.

use async_trait::async_trait;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;

use super::{AlertChannel, NotifierError};
use crate::config::EmailConfig;
use crate::db::Target;

/// Sends plain-text alert emails over SMTP.
pub struct EmailChannel {
    config: EmailConfig,
    timeout: Duration,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    /// Fails if any configured address does not parse. `timeout` bounds each
    /// SMTP command.
    pub fn new(config: EmailConfig, timeout: Duration) -> Result<Self, NotifierError> {
        let from = parse_mailbox(&config.from_address)?;
        let to = config
            .to_addresses
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        if to.is_empty() {
            return Err(NotifierError::Email("no recipients configured".to_string()));
        }

        Ok(Self {
            config,
            timeout,
            from,
            to,
        })
    }

    fn build_message(&self, alert_type: &str, message: &str, target: &Target) -> Result<Message, NotifierError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(alert_type, target))
            .header(header::ContentType::TEXT_PLAIN);

        for to in &self.to {
            builder = builder.to(to.clone());
        }

        builder
            .body(body(message, target))
            .map_err(|e| NotifierError::Email(e.to_string()))
    }

    fn transport(&self) -> Result<SmtpTransport, NotifierError> {
        let builder = if self.config.starttls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
        } else {
            Ok(SmtpTransport::builder_dangerous(&self.config.smtp_host))
        }
        .map_err(|e| NotifierError::Email(e.to_string()))?;

        let mut builder = builder
            .port(self.config.smtp_port)
            .timeout(Some(self.timeout));
        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    async fn send(&self, alert_type: &str, message: &str, target: &Target) -> Result<(), NotifierError> {
        let email = self.build_message(alert_type, message, target)?;
        let transport = self.transport()?;

        // SMTP transport is blocking
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| NotifierError::Email(e.to_string()))?
            .map_err(|e| NotifierError::Email(e.to_string()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifierError> {
    addr.parse()
        .map_err(|e| NotifierError::Email(format!("invalid address {:?}: {}", addr, e)))
}

fn subject(alert_type: &str, target: &Target) -> String {
    format!("[ALERT] {} issue with {}", alert_type.to_uppercase(), target.url)
}

fn body(message: &str, target: &Target) -> String {
    format!("Target: {}\n\n{}", target.url, message)
}
