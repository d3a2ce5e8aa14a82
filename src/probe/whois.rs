//! WHOIS domain expiry probe using raw port-43 queries.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{DomainProbe, DomainResult, ExpiryResult, ProbeError};

const IANA_SERVER: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// Second-level labels that sit under a ccTLD as a public suffix (`co.uk`).
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "net", "org", "gov", "edu", "ac"];

/// Line prefixes registries use to answer for an unregistered domain.
const NOT_FOUND_MARKERS: &[&str] = &[
    "no match for",
    "not found",
    "domain not found",
    "no data found",
    "no entries found",
    "no object found",
    "the queried object does not exist",
    "status: free",
    "status: available",
];

/// Registration data relevant to expiry checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhoisRecord {
    /// `None` when the registry withholds the expiration date.
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Looks up domain registration data.
#[async_trait]
pub trait WhoisClient: Send + Sync {
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord, ProbeError>;
}

/// Domain expiry prober backed by a [`WhoisClient`].
pub struct WhoisProber {
    client: Arc<dyn WhoisClient>,
    timeout: Duration,
}

impl WhoisProber {
    pub fn new(client: Arc<dyn WhoisClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl DomainProbe for WhoisProber {
    async fn probe(&self, domain: &str) -> Result<DomainResult, ProbeError> {
        let domain = registrable_domain(domain);

        let record = timeout(self.timeout, self.client.lookup(&domain))
            .await
            .map_err(|_| ProbeError::Whois {
                domain: domain.clone(),
                cause: format!("lookup timed out after {:?}", self.timeout),
            })??;

        Ok(ExpiryResult::new(record.expiration_date, Utc::now()))
    }
}

/// WHOIS client speaking the port-43 protocol.
///
/// Finds the TLD's server through IANA, then follows at most one registrar
/// referral.
pub struct TcpWhoisClient {
    root_server: String,
    port: u16,
    timeout: Duration,
}

impl TcpWhoisClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            root_server: IANA_SERVER.to_string(),
            port: WHOIS_PORT,
            timeout,
        }
    }

    #[cfg(test)]
    fn with_root(root_server: &str, port: u16, timeout: Duration) -> Self {
        Self {
            root_server: root_server.to_string(),
            port,
            timeout,
        }
    }

    async fn query(&self, server: &str, query: &str) -> Result<String, String> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, self.port))
                .await
                .map_err(|e| format!("failed to connect to {}: {}", server, e))?;

            stream
                .write_all(format!("{}\r\n", query).as_bytes())
                .await
                .map_err(|e| format!("failed to send query to {}: {}", server, e))?;

            let mut buf = Vec::with_capacity(4096);
            (&mut stream)
                .take(MAX_RESPONSE_BYTES as u64)
                .read_to_end(&mut buf)
                .await
                .map_err(|e| format!("failed to read from {}: {}", server, e))?;

            Ok::<_, String>(String::from_utf8_lossy(&buf).into_owned())
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| format!("{} did not answer within {:?}", server, self.timeout))?
    }
}

#[async_trait]
impl WhoisClient for TcpWhoisClient {
    async fn lookup(&self, domain: &str) -> Result<WhoisRecord, ProbeError> {
        let whois_error = |cause: String| ProbeError::Whois {
            domain: domain.to_string(),
            cause,
        };

        let tld = domain
            .rsplit('.')
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| whois_error("domain has no TLD".to_string()))?;

        let iana = self.query(&self.root_server, tld).await.map_err(whois_error)?;
        let server = referral_server(&iana)
            .ok_or_else(|| whois_error(format!("no WHOIS server known for .{}", tld)))?;

        tracing::debug!("WHOIS: querying {} for {}", server, domain);
        let mut response = self.query(&server, domain).await.map_err(whois_error)?;
        check_response(&response).map_err(whois_error)?;

        // Thin registries only point at the registrar's server
        if let Some(registrar) = registrar_server(&response).filter(|r| !r.eq_ignore_ascii_case(&server)) {
            match self.query(&registrar, domain).await {
                Ok(detail) if parse_expiration(&detail).is_some() => {
                    response = detail;
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("WHOIS: registrar referral to {} failed: {}", registrar, e),
            }
        }

        Ok(WhoisRecord {
            expiration_date: parse_expiration(&response),
        })
    }
}

/// Reduce a hostname to the domain a registry knows about.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();

    let keep = match labels.as_slice() {
        [.., second, tld] if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(second) => 3,
        _ => 2,
    };

    labels[labels.len().saturating_sub(keep)..].join(".")
}

fn referral_server(iana_response: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?im)^[ \t]*(?:refer|whois)[ \t]*:[ \t]*(\S+)[ \t\r]*$").expect("valid regex"));
    re.captures(iana_response).map(|c| c[1].to_string())
}

fn registrar_server(response: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*registrar whois server[ \t]*:[ \t]*(?:whois://)?([^\s/]+)/?[ \t\r]*$").expect("valid regex")
    });
    re.captures(response).map(|c| c[1].to_string())
}

fn check_response(response: &str) -> Result<(), String> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err("empty WHOIS response".to_string());
    }

    if parse_expiration(trimmed).is_some() {
        return Ok(());
    }

    // Only whole answers count; notices quoting these phrases mid-sentence do not
    for line in trimmed.lines() {
        let line = line.trim().to_ascii_lowercase();
        if let Some(marker) = NOT_FOUND_MARKERS.iter().find(|m| line.starts_with(*m)) {
            return Err(format!("domain not found ({})", marker));
        }
    }
    Ok(())
}

/// Extract the expiration date from a WHOIS response.
pub fn parse_expiration(response: &str) -> Option<DateTime<Utc>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t]*(?:registry expiry date|registrar registration expiration date|expiration date|expiry date|expiration time|expires on|expires|expire|paid-till|renewal date)[ \t]*:[ \t]*(\S.*?)[ \t\r]*$",
        )
        .expect("valid regex")
    });

    re.captures_iter(response)
        .find_map(|c| parse_whois_date(&c[1]))
}

fn parse_whois_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let cleaned = raw.trim_end_matches(" UTC").trim_end_matches(" GMT").trim_end_matches('Z');
    let datetime_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
        "%d.%m.%Y %H:%M:%S",
    ];
    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cleaned, fmt) {
            return Some(dt.and_utc());
        }
    }

    let date_formats = ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d-%b-%Y", "%d.%m.%Y", "%d/%m/%Y"];
    for fmt in &date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(cleaned, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}
