//! Probe module for target checks.
//!
//! Supports HTTP reachability, TLS certificate expiry and WHOIS domain
//! expiry probes.

mod http;
mod tls;
mod whois;

pub use http::*;
pub use tls::*;
pub use whois::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProbeSettings;

const SECONDS_PER_DAY: i64 = 86_400;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("network error for {target}: {cause}")]
    Network { target: String, cause: String },
    #[error("TLS error for {host}: {cause}")]
    Tls { host: String, cause: String },
    #[error("WHOIS lookup for {domain} failed: {cause}")]
    Whois { domain: String, cause: String },
    #[error("invalid target url: {0}")]
    InvalidTarget(String),
}

/// Result of a successful HTTP probe. Any status code counts as success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResult {
    pub status_code: u16,
    pub latency: Duration,
    pub checked_at: DateTime<Utc>,
}

/// Expiry of a certificate or domain registration.
///
/// `days_to_expiry` is present exactly when `expires_at` is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiryResult {
    expires_at: Option<DateTime<Utc>>,
    days_to_expiry: Option<i64>,
    checked_at: DateTime<Utc>,
}

pub type TlsResult = ExpiryResult;
pub type DomainResult = ExpiryResult;

impl ExpiryResult {
    pub fn new(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            expires_at,
            days_to_expiry: expires_at.map(|at| days_between(now, at)),
            checked_at: now,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn days_to_expiry(&self) -> Option<i64> {
        self.days_to_expiry
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }
}

/// Whole days from `now` until `at`, rounded down. Negative once `at` has passed.
pub fn days_between(now: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (at - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Scheme and host of a target URL, extracted once per check cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    pub url: String,
    pub scheme: String,
    pub host: String,
}

impl TargetAddress {
    pub fn parse(url: &str) -> Result<Self, ProbeError> {
        let parsed = Url::parse(url).map_err(|_| ProbeError::InvalidTarget(url.to_string()))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProbeError::InvalidTarget(url.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            scheme: parsed.scheme().to_string(),
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
        })
    }
}

#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<HttpResult, ProbeError>;
}

#[async_trait]
pub trait TlsProbe: Send + Sync {
    async fn probe(&self, host: &str) -> Result<TlsResult, ProbeError>;
}

#[async_trait]
pub trait DomainProbe: Send + Sync {
    async fn probe(&self, domain: &str) -> Result<DomainResult, ProbeError>;
}

/// The three probers run against every target.
#[derive(Clone)]
pub struct Probers {
    pub http: Arc<dyn HttpProbe>,
    pub tls: Arc<dyn TlsProbe>,
    pub domain: Arc<dyn DomainProbe>,
}

impl Probers {
    /// Network-backed probers built from configuration.
    pub fn from_settings(settings: &ProbeSettings) -> Result<Self, ProbeError> {
        Ok(Self {
            http: Arc::new(HttpProber::new(&settings.user_agent, settings.http_timeout)?),
            tls: Arc::new(TlsProber::new(settings.tls_timeout)),
            domain: Arc::new(WhoisProber::new(
                Arc::new(TcpWhoisClient::new(settings.whois_timeout)),
                settings.whois_timeout,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    #[test]
    fn test_days_between_rounds_down() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(days_between(now, now + ChronoDuration::days(14)), 14);
        assert_eq!(days_between(now, now + ChronoDuration::hours(14 * 24 + 23)), 14);
        assert_eq!(days_between(now, now + ChronoDuration::hours(1)), 0);
        assert_eq!(days_between(now, now - ChronoDuration::hours(1)), -1);
        assert_eq!(days_between(now, now - ChronoDuration::days(3)), -3);
    }

    #[test]
    fn test_expiry_result_null_iff_null() {
        let now = Utc::now();
        let unknown = ExpiryResult::new(None, now);
        assert!(unknown.expires_at().is_none());
        assert!(unknown.days_to_expiry().is_none());

        let known = ExpiryResult::new(Some(now + ChronoDuration::days(20)), now);
        assert!(known.expires_at().is_some());
        assert_eq!(known.days_to_expiry(), Some(20));
    }

    #[test]
    fn test_target_address_parse() {
        let addr = TargetAddress::parse("https://www.example.com:8443/health?x=1").unwrap();
        assert_eq!(addr.scheme, "https");
        assert_eq!(addr.host, "www.example.com");

        assert!(matches!(
            TargetAddress::parse("not a url"),
            Err(ProbeError::InvalidTarget(_))
        ));
        assert!(TargetAddress::parse("mailto:ops@example.com").is_err());
    }
}
