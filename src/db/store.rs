//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("store lock poisoned")]
    Lock,
    #[error("Not found")]
    NotFound,
}

/// Storage operations the check engine depends on.
///
/// Implementations must make `upsert_latest` and `append_history` atomic;
/// targets are checked concurrently.
pub trait ResultStore: Send + Sync {
    fn list_targets(&self) -> Result<Vec<Target>, DbError>;

    fn append_history(&self, entry: &HistoryEntry) -> Result<(), DbError>;

    /// Most recent entries first.
    fn recent_history(&self, target_id: i64, limit: usize) -> Result<Vec<HistoryEntry>, DbError>;

    /// Insert or overwrite the single row for `(check.target_id, check.kind)`.
    fn upsert_latest(&self, check: &LatestCheck) -> Result<(), DbError>;

    fn create_alert(&self, target_id: i64, alert_type: &str, message: &str) -> Result<Alert, DbError>;
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Run embedded migrations.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn()?;
        embedded::migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Lock)
    }

    // --- Targets ---

    /// Add a new target and return it with its ID.
    pub fn add_target(&self, url: &str) -> Result<Target, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO targets (url, created_at) VALUES (?1, ?2)",
            params![url, fmt_time(Utc::now())],
        )?;
        Ok(Target::new(conn.last_insert_rowid(), url))
    }

    /// Get a target by ID.
    pub fn get_target(&self, id: i64) -> Result<Target, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, url FROM targets WHERE id = ?1",
            params![id],
            |row| Ok(Target::new(row.get(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Delete a target together with its history, latest checks and alerts.
    pub fn delete_target(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM history WHERE target_id = ?1", params![id])?;
        tx.execute("DELETE FROM latest_checks WHERE target_id = ?1", params![id])?;
        tx.execute("DELETE FROM alerts WHERE target_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM targets WHERE id = ?1", params![id])?;
        tx.commit()?;

        if removed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // --- Checks ---

    /// Latest SSL / domain rows for a target.
    pub fn latest_checks(&self, target_id: i64) -> Result<Vec<LatestCheck>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target_id, check_kind, expires_at, days_to_expiry, checked_at
             FROM latest_checks WHERE target_id = ?1 ORDER BY check_kind",
        )?;

        let checks = stmt
            .query_map(params![target_id], |row| {
                let kind: String = row.get(1)?;
                let expires_at: Option<String> = row.get(2)?;
                Ok(LatestCheck {
                    target_id: row.get(0)?,
                    kind: CheckKind::parse(&kind).unwrap_or(CheckKind::Ssl),
                    expires_at: expires_at.as_deref().and_then(parse_db_time),
                    days_to_expiry: row.get(3)?,
                    checked_at: time_column(row, 4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(checks)
    }

    // --- Alerts ---

    /// List alerts, newest first, optionally for one target.
    pub fn list_alerts(&self, target_id: Option<i64>, limit: usize) -> Result<Vec<Alert>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, target_id, alert_type, message, created_at FROM alerts
             WHERE (?1 IS NULL OR target_id = ?1)
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;

        let alerts = stmt
            .query_map(params![target_id, limit as i64], |row| {
                Ok(Alert {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    alert_type: row.get(2)?,
                    message: row.get(3)?,
                    created_at: time_column(row, 4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(alerts)
    }
}

impl ResultStore for Store {
    fn list_targets(&self) -> Result<Vec<Target>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, url FROM targets ORDER BY id")?;
        let targets = stmt
            .query_map([], |row| Ok(Target::new(row.get(0)?, row.get::<_, String>(1)?)))?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(targets)
    }

    fn append_history(&self, entry: &HistoryEntry) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO history (target_id, status_code, latency_ms, checked_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.target_id,
                entry.status_code,
                entry.latency_ms,
                fmt_time(entry.checked_at),
            ],
        )?;
        Ok(())
    }

    fn recent_history(&self, target_id: i64, limit: usize) -> Result<Vec<HistoryEntry>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target_id, status_code, latency_ms, checked_at FROM history
             WHERE target_id = ?1 ORDER BY checked_at DESC, id DESC LIMIT ?2",
        )?;

        let entries = stmt
            .query_map(params![target_id, limit as i64], |row| {
                Ok(HistoryEntry {
                    target_id: row.get(0)?,
                    status_code: row.get(1)?,
                    latency_ms: row.get(2)?,
                    checked_at: time_column(row, 3)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(entries)
    }

    fn upsert_latest(&self, check: &LatestCheck) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO latest_checks (target_id, check_kind, expires_at, days_to_expiry, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(target_id, check_kind) DO UPDATE SET
             expires_at=excluded.expires_at, days_to_expiry=excluded.days_to_expiry, checked_at=excluded.checked_at",
            params![
                check.target_id,
                check.kind.as_str(),
                check.expires_at.map(fmt_time),
                check.days_to_expiry,
                fmt_time(check.checked_at),
            ],
        )?;
        Ok(())
    }

    fn create_alert(&self, target_id: i64, alert_type: &str, message: &str) -> Result<Alert, DbError> {
        let created_at = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alerts (target_id, alert_type, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![target_id, alert_type, message, fmt_time(created_at)],
        )?;

        Ok(Alert {
            id: conn.last_insert_rowid(),
            target_id,
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            created_at,
        })
    }
}

fn fmt_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn time_column(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_db_time(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {}", s).into(),
        )
    })
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    fn entry(target_id: i64, status_code: u16, checked_at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            target_id,
            status_code,
            latency_ms: 42,
            checked_at,
        }
    }

    #[test]
    fn test_target_crud() {
        let (_tmp, store) = store();

        let target = store.add_target("https://example.com").unwrap();
        assert!(target.id > 0);

        let fetched = store.get_target(target.id).unwrap();
        assert_eq!(fetched.url, "https://example.com");
        assert_eq!(store.list_targets().unwrap(), vec![fetched]);

        store.create_alert(target.id, "http_status", "boom").unwrap();
        store.delete_target(target.id).unwrap();
        assert!(matches!(store.get_target(target.id), Err(DbError::NotFound)));
        assert!(store.list_alerts(Some(target.id), 10).unwrap().is_empty());
        assert!(matches!(store.delete_target(target.id), Err(DbError::NotFound)));
    }

    #[test]
    fn test_duplicate_target_url_rejected() {
        let (_tmp, store) = store();
        store.add_target("https://example.com").unwrap();
        assert!(store.add_target("https://example.com").is_err());
    }

    #[test]
    fn test_recent_history_most_recent_first() {
        let (_tmp, store) = store();
        let target = store.add_target("https://example.com").unwrap();
        let other = store.add_target("https://other.com").unwrap();
        let now = Utc::now();

        store.append_history(&entry(target.id, 200, now - Duration::minutes(10))).unwrap();
        store.append_history(&entry(target.id, 500, now - Duration::minutes(5))).unwrap();
        store.append_history(&entry(target.id, 503, now)).unwrap();
        store.append_history(&entry(other.id, 404, now)).unwrap();

        let recent = store.recent_history(target.id, 2).unwrap();
        let codes: Vec<u16> = recent.iter().map(|e| e.status_code).collect();
        assert_eq!(codes, vec![503, 500]);
        assert_eq!(store.recent_history(target.id, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_upsert_latest_keeps_one_row_per_kind() {
        let (_tmp, store) = store();
        let target = store.add_target("https://example.com").unwrap();
        let now = Utc::now();

        for days in [30, 20] {
            store
                .upsert_latest(&LatestCheck {
                    target_id: target.id,
                    kind: CheckKind::Ssl,
                    expires_at: Some(now + Duration::days(days)),
                    days_to_expiry: Some(days),
                    checked_at: now,
                })
                .unwrap();
        }
        store
            .upsert_latest(&LatestCheck {
                target_id: target.id,
                kind: CheckKind::Domain,
                expires_at: None,
                days_to_expiry: None,
                checked_at: now,
            })
            .unwrap();

        let checks = store.latest_checks(target.id).unwrap();
        assert_eq!(checks.len(), 2);
        let ssl = checks.iter().find(|c| c.kind == CheckKind::Ssl).unwrap();
        assert_eq!(ssl.days_to_expiry, Some(20));
        let domain = checks.iter().find(|c| c.kind == CheckKind::Domain).unwrap();
        assert!(domain.expires_at.is_none());
        assert!(domain.days_to_expiry.is_none());
    }

    #[test]
    fn test_alerts_listed_newest_first() {
        let (_tmp, store) = store();
        let a = store.add_target("https://a.com").unwrap();
        let b = store.add_target("https://b.com").unwrap();

        store.create_alert(a.id, "http_status", "first").unwrap();
        store.create_alert(b.id, "ssl_expiry", "second").unwrap();
        store.create_alert(a.id, "probe_failure", "third").unwrap();

        let all = store.list_alerts(None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "third");

        let only_a = store.list_alerts(Some(a.id), 10).unwrap();
        assert_eq!(only_a.len(), 2);
        assert!(only_a.iter().all(|alert| alert.target_id == a.id));
    }

    #[test]
    fn test_parse_db_time_formats() {
        assert!(parse_db_time("2024-01-02 03:04:05.123456789").is_some());
        assert!(parse_db_time("2024-01-02 03:04:05").is_some());
        assert!(parse_db_time("2024-01-02T03:04:05Z").is_some());
        assert!(parse_db_time("garbage").is_none());
    }
}
