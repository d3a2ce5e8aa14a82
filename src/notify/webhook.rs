//! Generic webhook alert channel.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

use super::{AlertChannel, NotifierError};
use crate::config::WebhookConfig;
use crate::db::Target;

/// POSTs alerts as JSON to a configured URL.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig, timeout: Duration) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Webhook(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn payload(&self, alert_type: &str, message: &str, target: &Target) -> serde_json::Value {
        json!({
            "type": alert_type,
            "message": message,
            "target": {
                "id": target.id,
                "url": target.url,
            },
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    async fn send(&self, alert_type: &str, message: &str, target: &Target) -> Result<(), NotifierError> {
        let mut request = self
            .client
            .post(&self.config.url)
            .json(&self.payload(alert_type, message, target));

        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::Webhook(format!("status {}: {}", status, body)));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
