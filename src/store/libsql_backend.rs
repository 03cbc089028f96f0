//! libSQL backend — async `Ledger` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{ContactStatus, ParsedContact};
use crate::store::migrations;
use crate::store::traits::{Ledger, LedgerEntry};

/// libSQL ledger backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Ledger database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: RFC 3339, UTC, microsecond precision.
fn format_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a unique-index violation to `Constraint`, anything else to `Query`.
fn classify_write_error(context: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{context}: {message}"))
    } else {
        DatabaseError::Query(format!("{context}: {message}"))
    }
}

const ENTRY_COLUMNS: &str = "id, message_id, owner, contact_key, recruiter_name, recruiter_email, company, position, location, status, date_received, downstream_id, created_at";

/// Map a libsql Row to a LedgerEntry.
fn row_to_entry(row: &libsql::Row) -> Result<LedgerEntry, DatabaseError> {
    let text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Serialization(format!("ledger column {idx}: {e}")))
    };

    let status_str = text(9)?;
    let status = status_str.parse::<ContactStatus>().unwrap_or_else(|e| {
        warn!(status = %status_str, error = %e, "Unknown status in ledger row");
        ContactStatus::default()
    });

    Ok(LedgerEntry {
        id: text(0)?,
        message_id: text(1)?,
        owner: text(2)?,
        contact_key: text(3)?,
        recruiter_name: text(4)?,
        recruiter_email: text(5)?,
        company: text(6)?,
        position: text(7)?,
        location: text(8)?,
        status,
        date_received: parse_datetime(&text(10)?),
        downstream_id: row.get::<String>(11).ok(),
        created_at: parse_datetime(&text(12)?),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Ledger for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Message gate ────────────────────────────────────────────────

    async fn has_message(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM ledger_entries WHERE message_id = ?1 LIMIT 1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_message: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("has_message: {e}")))?;
        Ok(row.is_some())
    }

    async fn has_identity(&self, owner: &str, contact_key: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM ledger_entries WHERE owner = ?1 AND contact_key = ?2 LIMIT 1",
                params![owner, contact_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_identity: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("has_identity: {e}")))?;
        Ok(row.is_some())
    }

    async fn record(
        &self,
        message_id: &str,
        owner: &str,
        contact_key: &str,
        contact: &ParsedContact,
        downstream_id: Option<&str>,
    ) -> Result<LedgerEntry, DatabaseError> {
        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            owner: owner.to_string(),
            contact_key: contact_key.to_string(),
            recruiter_name: contact.recruiter_name.clone(),
            recruiter_email: contact.recruiter_email.clone(),
            company: contact.company.clone(),
            position: contact.position.clone(),
            location: contact.location.clone(),
            status: contact.status,
            date_received: contact.date_received,
            downstream_id: downstream_id.map(str::to_string),
            created_at: Utc::now(),
        };

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO ledger_entries ({ENTRY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    entry.id.clone(),
                    message_id,
                    owner,
                    contact_key,
                    entry.recruiter_name.clone(),
                    entry.recruiter_email.clone(),
                    entry.company.clone(),
                    entry.position.clone(),
                    entry.location.clone(),
                    entry.status.as_str(),
                    format_datetime(entry.date_received),
                    opt_text(downstream_id),
                    format_datetime(entry.created_at),
                ],
            )
            .await
            .map_err(|e| classify_write_error("record", e))?;

        debug!(
            message_id,
            contact_key,
            downstream_id = downstream_id.unwrap_or("-"),
            "Ledger entry recorded"
        );
        Ok(entry)
    }

    // ── Reads ───────────────────────────────────────────────────────

    async fn get_entry(&self, message_id: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_entry: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_entry(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_entry: {e}"))),
        }
    }

    async fn list_entries(&self, owner: &str, limit: usize) -> Result<Vec<LedgerEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE owner = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ),
                params![owner, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_entries: {e}")))?;

        let mut entries = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_entry(&row) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping ledger row: {e}"),
            }
        }
        Ok(entries)
    }

    async fn contact_stats(&self, owner: &str) -> Result<BTreeMap<String, i64>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status, COUNT(*) FROM ledger_entries WHERE owner = ?1 GROUP BY status",
                params![owner],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("contact_stats: {e}")))?;

        let mut stats = BTreeMap::new();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| DatabaseError::Serialization(format!("contact_stats: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Serialization(format!("contact_stats: {e}")))?;
            stats.insert(status, count);
        }
        Ok(stats)
    }

    // ── Checkpoints ─────────────────────────────────────────────────

    async fn get_checkpoint(&self, source_key: &str) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT last_processed_at FROM checkpoints WHERE source_key = ?1",
                params![source_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_checkpoint: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Serialization(format!("get_checkpoint: {e}")))?;
                Ok(Some(parse_datetime(&raw)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_checkpoint: {e}"))),
        }
    }

    async fn set_checkpoint(&self, source_key: &str, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO checkpoints (source_key, last_processed_at, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(source_key) DO UPDATE SET
                    last_processed_at = excluded.last_processed_at,
                    updated_at = excluded.updated_at",
                params![source_key, format_datetime(at), format_datetime(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_checkpoint: {e}")))?;

        debug!(source_key, at = %format_datetime(at), "Checkpoint advanced");
        Ok(())
    }
}
