//! Alert decision logic.
//!
//! Turns probe results and recent history into alert messages. Nothing here
//! touches the network or the store.

mod status;

pub use status::*;

use serde::Serialize;
use std::fmt;

use crate::config::AlertSettings;
use crate::db::{CheckKind, HistoryEntry, Target};
use crate::probe::{ExpiryResult, HttpResult};

/// Status codes at or above this are errors.
pub const ERROR_STATUS_THRESHOLD: u16 = 400;

/// How many history rows the consecutive-failure rule inspects.
pub const CONSECUTIVE_FAILURE_WINDOW: usize = 2;

/// Alert categories passed on to notifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SslExpiry,
    DomainExpiry,
    HttpStatus,
    ConsecutiveFailures,
    ProbeFailure,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::SslExpiry => "ssl_expiry",
            AlertKind::DomainExpiry => "domain_expiry",
            AlertKind::HttpStatus => "http_status",
            AlertKind::ConsecutiveFailures => "consecutive_failures",
            AlertKind::ProbeFailure => "probe_failure",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An alert decided on but not yet stored or dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAlert {
    pub kind: AlertKind,
    pub message: String,
}

impl PendingAlert {
    fn new(kind: AlertKind, message: String) -> Self {
        Self { kind, message }
    }
}

/// Decides which conditions deserve an alert.
#[derive(Debug, Clone)]
pub struct AlertEvaluator {
    expiry_threshold_days: i64,
    statuses: StatusTable,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(14, StatusTable::default())
    }
}

impl AlertEvaluator {
    pub fn new(expiry_threshold_days: i64, statuses: StatusTable) -> Self {
        Self {
            expiry_threshold_days,
            statuses,
        }
    }

    pub fn from_settings(settings: &AlertSettings) -> Self {
        let statuses = StatusTable::default().with_overrides(
            settings
                .status_descriptions
                .iter()
                .map(|(code, text)| (*code, text.clone())),
        );
        Self::new(settings.expiry_threshold_days, statuses)
    }

    pub fn statuses(&self) -> &StatusTable {
        &self.statuses
    }

    /// Certificate expiring within the threshold.
    pub fn evaluate_tls(&self, target: &Target, result: &ExpiryResult) -> Option<PendingAlert> {
        let days = self.expiring_within_threshold(result)?;
        Some(PendingAlert::new(
            AlertKind::SslExpiry,
            format!("SSL certificate for {} expires in {} days.", target.url, days),
        ))
    }

    /// Domain registration expiring within the threshold. Unknown expiry never alerts.
    pub fn evaluate_domain(&self, target: &Target, result: &ExpiryResult) -> Option<PendingAlert> {
        let days = self.expiring_within_threshold(result)?;
        Some(PendingAlert::new(
            AlertKind::DomainExpiry,
            format!("Domain registration for {} expires in {} days.", target.url, days),
        ))
    }

    /// Error status on the current HTTP check.
    pub fn evaluate_http(&self, target: &Target, result: &HttpResult) -> Option<PendingAlert> {
        if !is_error_status(result.status_code) {
            return None;
        }

        Some(PendingAlert::new(
            AlertKind::HttpStatus,
            format!(
                "Target {} returned {} ({}).",
                target.url,
                result.status_code,
                self.statuses.describe(result.status_code)
            ),
        ))
    }

    /// Both of the two most recent history rows are errors.
    ///
    /// `recent` must be ordered most recent first and already include the
    /// current check.
    pub fn evaluate_consecutive(&self, target: &Target, recent: &[HistoryEntry]) -> Option<PendingAlert> {
        let window = recent.get(..CONSECUTIVE_FAILURE_WINDOW)?;
        if recent.len() != CONSECUTIVE_FAILURE_WINDOW
            || !window.iter().all(|e| is_error_status(e.status_code))
        {
            return None;
        }

        Some(PendingAlert::new(
            AlertKind::ConsecutiveFailures,
            format!("Target {} returned errors for two consecutive checks.", target.url),
        ))
    }

    /// A probe or store operation failed for a target.
    pub fn probe_failure(&self, target: &Target, kind: CheckKind, error: &dyn fmt::Display) -> PendingAlert {
        PendingAlert::new(
            AlertKind::ProbeFailure,
            format!("Failed {} check for {}: {}", kind, target.url, error),
        )
    }

    fn expiring_within_threshold(&self, result: &ExpiryResult) -> Option<i64> {
        result
            .days_to_expiry()
            .filter(|days| *days <= self.expiry_threshold_days)
    }
}

pub fn is_error_status(status_code: u16) -> bool {
    status_code >= ERROR_STATUS_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use std::time::Duration;

    fn target() -> Target {
        Target::new(1, "https://x.com")
    }

    fn expiring_in(days: i64) -> ExpiryResult {
        let now = Utc::now();
        ExpiryResult::new(Some(now + ChronoDuration::days(days) + ChronoDuration::minutes(1)), now)
    }

    fn http(status_code: u16) -> HttpResult {
        HttpResult {
            status_code,
            latency: Duration::from_millis(120),
            checked_at: Utc::now(),
        }
    }

    fn history(codes: &[u16]) -> Vec<HistoryEntry> {
        codes
            .iter()
            .map(|code| HistoryEntry {
                target_id: 1,
                status_code: *code,
                latency_ms: 10,
                checked_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_tls_threshold_is_inclusive() {
        let evaluator = AlertEvaluator::default();

        let alert = evaluator.evaluate_tls(&target(), &expiring_in(14)).unwrap();
        assert_eq!(alert.kind, AlertKind::SslExpiry);
        assert_eq!(alert.message, "SSL certificate for https://x.com expires in 14 days.");

        assert!(evaluator.evaluate_tls(&target(), &expiring_in(15)).is_none());
    }

    #[test]
    fn test_tls_already_expired_reports_negative_days() {
        let evaluator = AlertEvaluator::default();
        let now = Utc::now();
        let expired = ExpiryResult::new(Some(now - ChronoDuration::hours(36)), now);

        let alert = evaluator.evaluate_tls(&target(), &expired).unwrap();
        assert_eq!(alert.message, "SSL certificate for https://x.com expires in -2 days.");
    }

    #[test]
    fn test_domain_threshold_and_unknown_expiry() {
        let evaluator = AlertEvaluator::default();

        let alert = evaluator.evaluate_domain(&target(), &expiring_in(3)).unwrap();
        assert_eq!(alert.kind, AlertKind::DomainExpiry);
        assert_eq!(alert.message, "Domain registration for https://x.com expires in 3 days.");

        let unknown = ExpiryResult::new(None, Utc::now());
        assert!(evaluator.evaluate_domain(&target(), &unknown).is_none());
        assert!(evaluator.evaluate_tls(&target(), &unknown).is_none());
    }

    #[test]
    fn test_configured_threshold() {
        let evaluator = AlertEvaluator::new(30, StatusTable::default());
        assert!(evaluator.evaluate_tls(&target(), &expiring_in(29)).is_some());
        assert!(evaluator.evaluate_tls(&target(), &expiring_in(31)).is_none());
    }

    #[test]
    fn test_http_status_messages() {
        let evaluator = AlertEvaluator::default();

        assert!(evaluator.evaluate_http(&target(), &http(200)).is_none());
        assert!(evaluator.evaluate_http(&target(), &http(302)).is_none());

        let not_found = evaluator.evaluate_http(&target(), &http(404)).unwrap();
        assert_eq!(not_found.kind, AlertKind::HttpStatus);
        assert_eq!(not_found.message, "Target https://x.com returned 404 (Not Found).");

        let unknown = evaluator.evaluate_http(&target(), &http(999)).unwrap();
        assert_eq!(unknown.message, "Target https://x.com returned 999 (Unknown Status).");

        let boundary = evaluator.evaluate_http(&target(), &http(400)).unwrap();
        assert_eq!(boundary.message, "Target https://x.com returned 400 (Bad Request).");
    }

    #[test]
    fn test_status_overrides_from_settings() {
        let settings = AlertSettings {
            expiry_threshold_days: 14,
            status_descriptions: HashMap::from([(429, "Too Many Requests".to_string())]),
        };
        let evaluator = AlertEvaluator::from_settings(&settings);

        let alert = evaluator.evaluate_http(&target(), &http(429)).unwrap();
        assert_eq!(alert.message, "Target https://x.com returned 429 (Too Many Requests).");
        assert_eq!(evaluator.statuses().describe(503), "Service Unavailable");
    }

    #[test]
    fn test_consecutive_failures() {
        let evaluator = AlertEvaluator::default();

        let alert = evaluator
            .evaluate_consecutive(&target(), &history(&[500, 503]))
            .unwrap();
        assert_eq!(alert.kind, AlertKind::ConsecutiveFailures);
        assert_eq!(alert.message, "Target https://x.com returned errors for two consecutive checks.");

        assert!(evaluator.evaluate_consecutive(&target(), &history(&[500])).is_none());
        assert!(evaluator.evaluate_consecutive(&target(), &history(&[500, 200])).is_none());
        assert!(evaluator.evaluate_consecutive(&target(), &history(&[200, 500])).is_none());
        assert!(evaluator.evaluate_consecutive(&target(), &[]).is_none());
    }

    #[test]
    fn test_consecutive_requires_exactly_two_rows() {
        let evaluator = AlertEvaluator::default();
        assert!(evaluator
            .evaluate_consecutive(&target(), &history(&[500, 500, 500]))
            .is_none());
    }

    #[test]
    fn test_probe_failure_message() {
        let evaluator = AlertEvaluator::default();
        let alert = evaluator.probe_failure(&target(), CheckKind::Ssl, &"handshake failed");
        assert_eq!(alert.kind, AlertKind::ProbeFailure);
        assert_eq!(alert.message, "Failed SSL check for https://x.com: handshake failed");

        let alert = evaluator.probe_failure(&target(), CheckKind::Domain, &"registry unreachable");
        assert_eq!(alert.message, "Failed domain check for https://x.com: registry unreachable");
    }
}
