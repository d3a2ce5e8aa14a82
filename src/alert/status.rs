//! HTTP status descriptions used in alert messages.

use std::collections::HashMap;

pub const UNKNOWN_STATUS: &str = "Unknown Status";

const DEFAULT_DESCRIPTIONS: &[(u16, &str)] = &[
    (200, "OK"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (408, "Request Timeout"),
    (500, "Internal Server Error"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
];

/// Maps status codes to human-readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTable {
    descriptions: HashMap<u16, String>,
}

impl Default for StatusTable {
    fn default() -> Self {
        Self {
            descriptions: DEFAULT_DESCRIPTIONS
                .iter()
                .map(|(code, text)| (*code, text.to_string()))
                .collect(),
        }
    }
}

impl StatusTable {
    /// Add entries, replacing existing descriptions for the same code.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (u16, String)>,
    {
        self.descriptions.extend(overrides);
        self
    }

    pub fn describe(&self, status_code: u16) -> &str {
        self.descriptions
            .get(&status_code)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_STATUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = StatusTable::default();
        assert_eq!(table.describe(200), "OK");
        assert_eq!(table.describe(504), "Gateway Timeout");
        assert_eq!(table.describe(418), UNKNOWN_STATUS);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let table = StatusTable::default().with_overrides([(404, "Gone Fishing".to_string())]);
        assert_eq!(table.describe(404), "Gone Fishing");
        assert_eq!(table.describe(500), "Internal Server Error");
    }
}
