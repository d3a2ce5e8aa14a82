//! HTTP probe implementation.

use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};

use super::{HttpProbe, HttpResult, ProbeError};

/// Issues a GET against a target and records status code and latency.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Network {
                target: "client".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for HttpProber {
    async fn probe(&self, url: &str) -> Result<HttpResult, ProbeError> {
        let network_error = |e: reqwest::Error| ProbeError::Network {
            target: url.to_string(),
            cause: if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            },
        };

        let start = Instant::now();

        let response = self.client.get(url).send().await.map_err(network_error)?;
        let status_code = response.status().as_u16();

        // Read the full body to measure complete transfer time
        let _body = response.bytes().await.map_err(network_error)?;

        Ok(HttpResult {
            status_code,
            latency: start.elapsed(),
            checked_at: Utc::now(),
        })
    }
}
