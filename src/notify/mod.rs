//! Alert delivery.
//!
//! The check engine only sees [`Notifier`]. Locally, alerts fan out to the
//! configured channels (email, webhook); alternatively they are forwarded to a
//! remote notification service.

mod email;
mod remote;
mod webhook;

pub use email::*;
pub use remote::*;
pub use webhook::*;

use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use thiserror::Error;

use crate::config::NotifySettings;
use crate::db::Target;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("email delivery failed: {0}")]
    Email(String),
    #[error("webhook delivery failed: {0}")]
    Webhook(String),
    #[error("notification service failed: {0}")]
    Remote(String),
    #[error("{} channel(s) failed: {}", .0.len(), .0.join("; "))]
    Channels(Vec<String>),
}

/// Best-effort alert delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert_type: &str, message: &str, target: &Target) -> Result<(), NotifierError>;
}

/// A single delivery channel.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send(&self, alert_type: &str, message: &str, target: &Target) -> Result<(), NotifierError>;

    /// Channel name for logging.
    fn name(&self) -> &str;
}

/// Sends every alert through all channels.
///
/// All channels are attempted even when one fails; the call fails if any did.
#[derive(Default)]
pub struct ChannelNotifier {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&mut self, channel: Box<dyn AlertChannel>) {
        self.channels.push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Build the local channels described by the settings.
    pub fn from_settings(settings: &NotifySettings) -> Result<Self, NotifierError> {
        let mut notifier = Self::new();

        if let Some(email) = &settings.email {
            notifier.add_channel(Box::new(EmailChannel::new(email.clone(), settings.timeout)?));
        }
        if let Some(webhook) = &settings.webhook {
            notifier.add_channel(Box::new(WebhookChannel::new(webhook.clone(), settings.timeout)?));
        }

        Ok(notifier)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, alert_type: &str, message: &str, target: &Target) -> Result<(), NotifierError> {
        if self.channels.is_empty() {
            tracing::warn!("No alert channels configured, dropping {} alert for {}: {}", alert_type, target.url, message);
            return Ok(());
        }

        let sends = self.channels.iter().map(|channel| async move {
            let result = channel.send(alert_type, message, target).await;
            match &result {
                Ok(()) => tracing::info!("Alert sent via {} for {}", channel.name(), target.url),
                Err(e) => tracing::error!("Failed to send alert via {} for {}: {}", channel.name(), target.url, e),
            }
            result
        });

        let failures: Vec<String> = join_all(sends)
            .await
            .into_iter()
            .filter_map(Result::err)
            .map(|e| e.to_string())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Channels(failures))
        }
    }
}

/// The notifier the check engine should use for the given settings.
pub fn notifier_from_settings(settings: &NotifySettings) -> Result<Arc<dyn Notifier>, NotifierError> {
    if let Some(url) = &settings.remote_url {
        tracing::info!("Forwarding alerts to notification service at {}", url);
        return Ok(Arc::new(RemoteNotifier::new(url, settings.timeout)?));
    }

    let notifier = ChannelNotifier::from_settings(settings)?;
    tracing::info!("Alert channels configured: {}", notifier.channel_count());
    Ok(Arc::new(notifier))
}
