//! `Ledger` trait — the durable record of handled messages and checkpoints.
//!
//! Entries are write-once: a message id that has an entry is never
//! reprocessed, whether or not a downstream record was created for it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::pipeline::types::{ContactStatus, ParsedContact};

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub message_id: String,
    /// Mailbox this contact belongs to.
    pub owner: String,
    pub contact_key: String,
    pub recruiter_name: String,
    pub recruiter_email: String,
    pub company: String,
    pub position: String,
    pub location: String,
    pub status: ContactStatus,
    pub date_received: DateTime<Utc>,
    /// Tracking-store record id; `None` if throttled or if creation failed.
    pub downstream_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Message gate ────────────────────────────────────────────────

    /// True if an entry exists for this message id.
    async fn has_message(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// True if any entry for `owner` carries this contact key.
    async fn has_identity(&self, owner: &str, contact_key: &str) -> Result<bool, DatabaseError>;

    /// Write the entry for a message. A second write for the same message id
    /// fails with `DatabaseError::Constraint` and leaves the first untouched.
    async fn record(
        &self,
        message_id: &str,
        owner: &str,
        contact_key: &str,
        contact: &ParsedContact,
        downstream_id: Option<&str>,
    ) -> Result<LedgerEntry, DatabaseError>;

    // ── Reads ───────────────────────────────────────────────────────

    /// Look up the entry for a message id.
    async fn get_entry(&self, message_id: &str) -> Result<Option<LedgerEntry>, DatabaseError>;

    /// Most recent entries for an owner, newest first.
    async fn list_entries(&self, owner: &str, limit: usize) -> Result<Vec<LedgerEntry>, DatabaseError>;

    /// Entry count per status for an owner.
    async fn contact_stats(&self, owner: &str) -> Result<BTreeMap<String, i64>, DatabaseError>;

    // ── Checkpoints ─────────────────────────────────────────────────

    /// Last-processed timestamp for a source, if it has run before.
    async fn get_checkpoint(&self, source_key: &str) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Store the last-processed timestamp for a source.
    async fn set_checkpoint(&self, source_key: &str, at: DateTime<Utc>) -> Result<(), DatabaseError>;
}
