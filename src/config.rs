//! Configuration module for Sitewatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Client signature sent with every HTTP probe.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "sitewatch.db")
    pub db_path: String,
    /// Seconds between check cycles (default: 300)
    pub check_interval: Duration,
    /// Targets checked in parallel within one cycle (default: 4)
    pub concurrency: usize,
    pub probes: ProbeSettings,
    pub alerts: AlertSettings,
    pub notify: NotifySettings,
}

/// Timeouts and client identity used by the probers.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub http_timeout: Duration,
    pub tls_timeout: Duration,
    pub whois_timeout: Duration,
    pub user_agent: String,
}

/// Alert evaluation settings.
#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Alert when a certificate or domain expires within this many days (inclusive).
    pub expiry_threshold_days: i64,
    /// Extra status descriptions merged over the built-in table.
    pub status_descriptions: HashMap<u16, String>,
}

/// Where alerts get delivered.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    /// Remote notification service base URL. When set, local channels are bypassed.
    pub remote_url: Option<String>,
    /// Upper bound on a single delivery attempt per channel.
    pub timeout: Duration,
    pub email: Option<EmailConfig>,
    pub webhook: Option<WebhookConfig>,
}

/// SMTP settings for the email channel.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub starttls: bool,
    pub from_address: String,
    pub to_addresses: Vec<String>,
}

/// Settings for the generic webhook channel.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "sitewatch.db".to_string(),
            check_interval: Duration::from_secs(300),
            concurrency: 4,
            probes: ProbeSettings::default(),
            alerts: AlertSettings::default(),
            notify: NotifySettings::default(),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            tls_timeout: Duration::from_secs(10),
            whois_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            expiry_threshold_days: 14,
            status_descriptions: HashMap::new(),
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            remote_url: None,
            timeout: Duration::from_secs(10),
            email: None,
            webhook: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Every variable is prefixed with `SITEWATCH_`. Values that fail to
    /// parse are ignored and the default is kept.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let var = |name: &str| lookup(&format!("SITEWATCH_{}", name)).filter(|v| !v.trim().is_empty());

        if let Some(port) = var("HTTP_PORT").and_then(|v| v.parse().ok()) {
            cfg.http_port = port;
        }
        if let Some(db_path) = var("DB_PATH") {
            cfg.db_path = db_path;
        }
        if let Some(secs) = var("CHECK_INTERVAL_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.check_interval = Duration::from_secs(secs);
            }
        }
        if let Some(n) = var("CONCURRENCY").and_then(|v| v.parse::<usize>().ok()) {
            cfg.concurrency = n.max(1);
        }

        if let Some(secs) = var("HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            cfg.probes.http_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = var("TLS_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            cfg.probes.tls_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = var("WHOIS_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            cfg.probes.whois_timeout = Duration::from_secs(secs);
        }
        if let Some(ua) = var("USER_AGENT") {
            cfg.probes.user_agent = ua;
        }

        if let Some(days) = var("EXPIRY_THRESHOLD_DAYS").and_then(|v| v.parse().ok()) {
            cfg.alerts.expiry_threshold_days = days;
        }
        if let Some(raw) = var("STATUS_DESCRIPTIONS") {
            cfg.alerts.status_descriptions = parse_pairs(&raw)
                .into_iter()
                .filter_map(|(code, text)| code.parse().ok().map(|c| (c, text)))
                .collect();
        }

        cfg.notify.remote_url = var("NOTIFY_URL");
        if let Some(secs) = var("NOTIFY_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            if secs > 0 {
                cfg.notify.timeout = Duration::from_secs(secs);
            }
        }

        let recipients = var("MAIL_TO").map(|v| split_list(&v)).unwrap_or_default();
        if let Some(smtp_host) = var("SMTP_HOST") {
            if recipients.is_empty() {
                tracing::warn!("SITEWATCH_SMTP_HOST is set but SITEWATCH_MAIL_TO is empty; email disabled");
            } else {
                cfg.notify.email = Some(EmailConfig {
                    smtp_host,
                    smtp_port: var("SMTP_PORT").and_then(|v| v.parse().ok()).unwrap_or(587),
                    username: var("SMTP_USER").unwrap_or_default(),
                    password: var("SMTP_PASS").unwrap_or_default(),
                    starttls: var("SMTP_STARTTLS").map(|v| parse_bool(&v)).unwrap_or(true),
                    from_address: var("MAIL_FROM")
                        .unwrap_or_else(|| "\"MonitorBot\" <alerts@monitor.com>".to_string()),
                    to_addresses: recipients,
                });
            }
        }

        if let Some(url) = var("WEBHOOK_URL") {
            cfg.notify.webhook = Some(WebhookConfig {
                url,
                headers: var("WEBHOOK_HEADERS")
                    .map(|v| parse_pairs(&v).into_iter().collect())
                    .unwrap_or_default(),
            });
        }

        cfg
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `key=value,key=value` lists. Entries without `=` are skipped.
fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    split_list(raw)
        .into_iter()
        .filter_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
