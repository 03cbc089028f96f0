//! Push source — one forwarded message delivered by a Mailgun-style webhook.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SourceError;
use crate::source::{FetchScope, MessageSource, RawMessage};

/// Form fields posted by the inbound-mail webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub recipient: String,
    /// Envelope sender (bare address).
    #[serde(default)]
    pub sender: String,
    /// `From` header, usually with a display name.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, rename = "body-plain")]
    pub body_plain: String,
    #[serde(default, rename = "body-html")]
    pub body_html: String,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "Message-Id")]
    pub message_id: String,
    #[serde(default, rename = "In-Reply-To")]
    pub in_reply_to: String,
    #[serde(default, rename = "References")]
    pub references: String,
    #[serde(default, rename = "Thread-Topic")]
    pub thread_topic: String,
}

impl WebhookPayload {
    /// Convert into a `RawMessage`. Fails only when there is no sender at all.
    pub fn into_raw_message(self) -> Result<RawMessage, SourceError> {
        let sender = if self.from.trim().is_empty() {
            self.sender.trim().to_string()
        } else {
            self.from.trim().to_string()
        };
        if sender.is_empty() {
            return Err(SourceError::InvalidPayload("webhook payload has no sender".into()));
        }

        let received_at = self
            .timestamp
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        let message_id = RawMessage::normalize_id(&self.message_id).unwrap_or_else(|| {
            RawMessage::synthetic_id(&sender, &self.subject, &self.timestamp, &self.body_plain)
        });

        Ok(RawMessage {
            message_id,
            sender,
            subject: self.subject.trim().to_string(),
            body_text: self.body_plain,
            body_html: self.body_html,
            received_at,
            in_reply_to: self.in_reply_to.trim().to_string(),
            references: self.references.trim().to_string(),
            thread_topic: self.thread_topic.trim().to_string(),
        })
    }
}

/// Single-shot source: yields its message on the first fetch, nothing after.
pub struct PushedMessage {
    recipient: String,
    message: Mutex<Option<RawMessage>>,
}

impl PushedMessage {
    pub fn new(recipient: impl Into<String>, message: RawMessage) -> Self {
        Self {
            recipient: recipient.into(),
            message: Mutex::new(Some(message)),
        }
    }
}

#[async_trait]
impl MessageSource for PushedMessage {
    fn source_key(&self) -> String {
        format!("webhook:{}", self.recipient.to_lowercase())
    }

    async fn fetch(&self, _scope: &FetchScope) -> Result<Vec<RawMessage>, SourceError> {
        let message = self
            .message
            .lock()
            .map_err(|_| SourceError::Protocol("pushed message lock poisoned".into()))?
            .take();
        Ok(message.into_iter().collect())
    }

    async fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> WebhookPayload {
        WebhookPayload {
            recipient: "Me@Gmail.com".into(),
            sender: "sarah.johnson@techcorp.com".into(),
            from: "Sarah Johnson <sarah.johnson@techcorp.com>".into(),
            subject: " Senior Software Engineer Opportunity ".into(),
            body_plain: "Hi there".into(),
            timestamp: "1767607200".into(),
            message_id: "<m1@techcorp.com>".into(),
            ..Default::default()
        }
    }

    #[test]
    fn payload_maps_to_raw_message() {
        let msg = payload().into_raw_message().unwrap();
        assert_eq!(msg.sender, "Sarah Johnson <sarah.johnson@techcorp.com>");
        assert_eq!(msg.subject, "Senior Software Engineer Opportunity");
        assert_eq!(msg.message_id, "m1@techcorp.com");
        assert_eq!(msg.received_at.timestamp(), 1_767_607_200);
        assert!(msg.in_reply_to.is_empty());
    }

    #[test]
    fn webhook_and_mailbox_agree_on_message_id() {
        let raw = "From: Sarah Johnson <sarah.johnson@techcorp.com>\r\n\
Subject: Senior Software Engineer Opportunity\r\n\
Message-ID: <m1@techcorp.com>\r\n\
\r\n\
Hi there\r\n";
        let from_mailbox = crate::source::mime::parse_rfc822(raw.as_bytes()).unwrap();
        let from_webhook = payload().into_raw_message().unwrap();
        assert_eq!(from_mailbox.message_id, from_webhook.message_id);
    }

    #[test]
    fn envelope_sender_used_when_from_missing() {
        let msg = WebhookPayload {
            from: String::new(),
            ..payload()
        }
        .into_raw_message()
        .unwrap();
        assert_eq!(msg.sender, "sarah.johnson@techcorp.com");
    }

    #[test]
    fn missing_sender_is_rejected() {
        let err = WebhookPayload::default().into_raw_message().unwrap_err();
        assert!(matches!(err, SourceError::InvalidPayload(_)));
    }

    #[test]
    fn missing_message_id_is_synthesized() {
        let a = WebhookPayload {
            message_id: String::new(),
            ..payload()
        };
        let first = a.clone().into_raw_message().unwrap();
        let second = a.into_raw_message().unwrap();
        assert!(!first.message_id.is_empty());
        assert_eq!(first.message_id, second.message_id);
    }

    #[tokio::test]
    async fn pushed_message_yields_once() {
        let source = PushedMessage::new("Me@Gmail.com", payload().into_raw_message().unwrap());
        let scope = FetchScope { since: Utc::now() };
        assert_eq!(source.source_key(), "webhook:me@gmail.com");
        assert_eq!(source.fetch(&scope).await.unwrap().len(), 1);
        assert!(source.fetch(&scope).await.unwrap().is_empty());
    }
}
