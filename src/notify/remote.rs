//! Forwarding to a remote notification service (`POST /alert`).

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{Notifier, NotifierError};
use crate::db::Target;

#[derive(Serialize)]
struct AlertRequest<'a> {
    #[serde(rename = "type")]
    alert_type: &'a str,
    message: &'a str,
    target: &'a Target,
}

/// Hands alerts to a notification service that owns the channels.
pub struct RemoteNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl RemoteNotifier {
    /// `base_url` is the service root; alerts go to `{base_url}/alert`.
    /// A request that has not completed within `timeout` fails.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Remote(e.to_string()))?;

        Ok(Self {
            endpoint: format!("{}/alert", base_url.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl Notifier for RemoteNotifier {
    async fn notify(&self, alert_type: &str, message: &str, target: &Target) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AlertRequest {
                alert_type,
                message,
                target,
            })
            .send()
            .await
            .map_err(|e| NotifierError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Remote(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        Ok(())
    }
}
