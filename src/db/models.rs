//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored web target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub url: String,
}

impl Target {
    pub fn new(id: i64, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }
}

/// The check kinds run against every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Http,
    Ssl,
    Domain,
}

impl CheckKind {
    /// Value stored in the `check_kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Http => "http",
            CheckKind::Ssl => "ssl",
            CheckKind::Domain => "domain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(CheckKind::Http),
            "ssl" => Some(CheckKind::Ssl),
            "domain" => Some(CheckKind::Domain),
            _ => None,
        }
    }
}

/// Rendered the way alert messages name a check.
impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckKind::Http => "HTTP",
            CheckKind::Ssl => "SSL",
            CheckKind::Domain => "domain",
        })
    }
}

/// One HTTP check result in the append-only history log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub target_id: i64,
    pub status_code: u16,
    pub latency_ms: i64,
    pub checked_at: DateTime<Utc>,
}

/// Latest known SSL or domain state of a target. One row per (target, kind).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestCheck {
    pub target_id: i64,
    pub kind: CheckKind,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_to_expiry: Option<i64>,
    pub checked_at: DateTime<Utc>,
}

/// A persisted alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: i64,
    pub target_id: i64,
    pub alert_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
