//! SQLite-backed sink
//!
//! Writes one row per event, and keeps a `scan_runs` row in step with the
//! status transitions and stats snapshots of the scan.

use crate::output::traits::{
    DiscoveredUrl, ExtractedForm, FingerprintRecord, ScanSink, SinkError, SinkResult,
    StatusReporter,
};
use crate::state::{CrawlStats, ScanStatus};
use crate::ReconError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scan_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_url TEXT NOT NULL,
    config_hash TEXT,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    urls_discovered INTEGER NOT NULL DEFAULT 0,
    urls_crawled INTEGER NOT NULL DEFAULT 0,
    forms_found INTEGER NOT NULL DEFAULT 0,
    technologies_detected INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS discovered_urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scan_runs(id),
    url TEXT NOT NULL,
    parent_url TEXT,
    method TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    content_type TEXT,
    content_length INTEGER,
    response_time_ms INTEGER NOT NULL,
    page_title TEXT,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_discovered_urls_scan ON discovered_urls(scan_id);

CREATE TABLE IF NOT EXISTS forms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scan_runs(id),
    url_ref TEXT NOT NULL,
    action TEXT NOT NULL,
    method TEXT NOT NULL,
    fields TEXT NOT NULL,
    csrf_tokens TEXT NOT NULL,
    authentication_required INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fingerprints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id INTEGER NOT NULL REFERENCES scan_runs(id),
    url_ref TEXT NOT NULL,
    server_software TEXT,
    programming_language TEXT,
    framework TEXT,
    cms TEXT,
    javascript_libraries TEXT NOT NULL,
    security_headers TEXT NOT NULL
);
"#;

/// Sink and status reporter writing to a SQLite database
pub struct SqliteSink {
    conn: Mutex<Connection>,
    scan_id: i64,
}

impl SqliteSink {
    /// Opens (or creates) the database and registers a new pending scan
    pub fn open(path: &Path, target_url: &str, config_hash: Option<&str>) -> Result<Self, ReconError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::init(conn, target_url, config_hash)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory(target_url: &str) -> Result<Self, ReconError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init(conn, target_url, None)
    }

    fn init(conn: Connection, target_url: &str, config_hash: Option<&str>) -> Result<Self, ReconError> {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.execute(
            "INSERT INTO scan_runs (target_url, config_hash, status, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                target_url,
                config_hash,
                ScanStatus::Pending.to_db_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        let scan_id = conn.last_insert_rowid();

        Ok(Self {
            conn: Mutex::new(conn),
            scan_id,
        })
    }

    pub fn scan_id(&self) -> i64 {
        self.scan_id
    }

    fn lock(&self) -> SinkResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SinkError::Lock)
    }

    /// Current status of this scan's run row
    pub fn run_status(&self) -> SinkResult<Option<ScanStatus>> {
        let conn = self.lock()?;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM scan_runs WHERE id = ?1",
                params![self.scan_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.as_deref().and_then(ScanStatus::from_db_string))
    }

    /// Number of rows this scan wrote to `table`
    pub fn count_rows(&self, table: &str) -> SinkResult<u64> {
        let sql = match table {
            "discovered_urls" => "SELECT COUNT(*) FROM discovered_urls WHERE scan_id = ?1",
            "forms" => "SELECT COUNT(*) FROM forms WHERE scan_id = ?1",
            "fingerprints" => "SELECT COUNT(*) FROM fingerprints WHERE scan_id = ?1",
            other => return Err(SinkError::Storage(format!("Unknown table: {}", other))),
        };
        let conn = self.lock()?;
        let count: i64 = conn.query_row(sql, params![self.scan_id], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn update_status(&self, status: ScanStatus) -> SinkResult<()> {
        let conn = self.lock()?;
        if status.is_terminal() {
            conn.execute(
                "UPDATE scan_runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
                params![status.to_db_string(), Utc::now().to_rfc3339(), self.scan_id],
            )?;
        } else {
            conn.execute(
                "UPDATE scan_runs SET status = ?1 WHERE id = ?2",
                params![status.to_db_string(), self.scan_id],
            )?;
        }
        Ok(())
    }

    fn update_stats(&self, stats: &CrawlStats) -> SinkResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE scan_runs SET urls_discovered = ?1, urls_crawled = ?2, forms_found = ?3,
                technologies_detected = ?4, errors = ?5 WHERE id = ?6",
            params![
                stats.urls_discovered as i64,
                stats.urls_crawled as i64,
                stats.forms_found as i64,
                stats.technologies_detected as i64,
                stats.errors as i64,
                self.scan_id
            ],
        )?;
        Ok(())
    }
}

impl ScanSink for SqliteSink {
    fn record_discovered_url(&self, event: &DiscoveredUrl) -> SinkResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO discovered_urls (scan_id, url, parent_url, method, status_code, content_type,
                content_length, response_time_ms, page_title, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.scan_id,
                event.url,
                event.parent_url,
                event.method,
                event.status_code,
                event.content_type,
                event.content_length.map(|n| n as i64),
                event.response_time_ms as i64,
                event.page_title,
                event.discovered_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn record_form(&self, event: &ExtractedForm) -> SinkResult<()> {
        let fields = serde_json::to_string(&event.fields)?;
        let csrf_tokens = serde_json::to_string(&event.csrf_tokens)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO forms (scan_id, url_ref, action, method, fields, csrf_tokens, authentication_required)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.scan_id,
                event.url_ref,
                event.action,
                event.method,
                fields,
                csrf_tokens,
                event.authentication_required
            ],
        )?;
        Ok(())
    }

    fn record_fingerprint(&self, event: &FingerprintRecord) -> SinkResult<()> {
        let javascript_libraries = serde_json::to_string(&event.javascript_libraries)?;
        let security_headers = serde_json::to_string(&event.security_headers)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO fingerprints (scan_id, url_ref, server_software, programming_language,
                framework, cms, javascript_libraries, security_headers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.scan_id,
                event.url_ref,
                event.server_software,
                event.programming_language,
                event.framework,
                event.cms,
                javascript_libraries,
                security_headers
            ],
        )?;
        Ok(())
    }
}

impl StatusReporter for SqliteSink {
    fn report_status(&self, status: ScanStatus) {
        if let Err(e) = self.update_status(status) {
            tracing::warn!("Failed to record scan status {}: {}", status, e);
        }
    }

    fn report_stats(&self, stats: &CrawlStats) {
        if let Err(e) = self.update_stats(stats) {
            tracing::warn!("Failed to record scan stats: {}", e);
        }
    }
}
