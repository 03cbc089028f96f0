//! Message sources — where raw recruiter mail comes from.
//!
//! Two shapes are supported:
//! - bulk poll: `ImapSource` returns everything in the watched label since
//!   the checkpoint (0..N messages per fetch)
//! - push: `PushedMessage` wraps one webhook payload and yields it once
//!
//! The orchestrator treats both the same way.

pub mod imap;
pub mod mime;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub use imap::{ImapConfig, ImapSource};
pub use webhook::{PushedMessage, WebhookPayload};

/// Transport-agnostic message record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Stable identifier, unique within the source. Never empty. Stored
    /// without angle brackets, see `normalize_id`.
    pub message_id: String,
    /// Raw `From` header, e.g. `Sarah Johnson <sarah@techcorp.com>`.
    pub sender: String,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
    pub received_at: DateTime<Utc>,
    pub in_reply_to: String,
    pub references: String,
    pub thread_topic: String,
}

impl RawMessage {
    /// Canonical form of a `Message-ID` header value: surrounding whitespace
    /// and one pair of angle brackets removed. `None` when nothing is left.
    ///
    /// Every source maps ids through this, so the same mail delivered over
    /// IMAP and over the webhook lands on the same ledger entry.
    pub fn normalize_id(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed)
            .trim();
        (!inner.is_empty()).then(|| inner.to_string())
    }

    /// Deterministic id for messages that arrive without a `Message-ID`.
    ///
    /// Derived from the content so the same message maps to the same id on
    /// every fetch, which keeps the ledger gate effective.
    pub fn synthetic_id(sender: &str, subject: &str, date: &str, body: &str) -> String {
        let material = format!("{sender}\n{subject}\n{date}\n{body}");
        let id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, material.as_bytes());
        format!("synthetic-{id}@recruiter-sync")
    }
}

/// What a fetch should cover.
#[derive(Debug, Clone, Copy)]
pub struct FetchScope {
    /// Lower bound (checkpoint, or now minus the lookback window).
    pub since: DateTime<Utc>,
}

/// A producer of raw messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Stable key the checkpoint for this source is stored under.
    fn source_key(&self) -> String;

    /// Fetch messages in scope. Order is not guaranteed.
    ///
    /// Connection problems surface as `SourceError::Unavailable`.
    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<RawMessage>, SourceError>;

    /// Release any long-lived connection. Called after every run.
    async fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_ids_are_stable() {
        let a = RawMessage::synthetic_id("a@b.com", "Hi", "2026-01-01", "body");
        let b = RawMessage::synthetic_id("a@b.com", "Hi", "2026-01-01", "body");
        let c = RawMessage::synthetic_id("a@b.com", "Hi", "2026-01-02", "body");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("synthetic-"));
        assert_eq!(RawMessage::normalize_id(&a).as_deref(), Some(a.as_str()));
    }

    #[test]
    fn ids_are_normalized_without_brackets() {
        assert_eq!(RawMessage::normalize_id(" <m1@techcorp.com> ").as_deref(), Some("m1@techcorp.com"));
        assert_eq!(RawMessage::normalize_id("m1@techcorp.com").as_deref(), Some("m1@techcorp.com"));
        assert_eq!(RawMessage::normalize_id("<unterminated@x.com").as_deref(), Some("<unterminated@x.com"));
        assert_eq!(RawMessage::normalize_id("<>"), None);
        assert_eq!(RawMessage::normalize_id("   "), None);
    }
}
