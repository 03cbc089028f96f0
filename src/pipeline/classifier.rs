//! Candidate classifier — decides whether a message is fresh external outreach.
//!
//! Two predicates, both must hold:
//! - thread starter: no reply headers, no `Re:`/`Fw:`/`Fwd:` subject prefix
//! - external sender: sender domain differs from the operator's own domain
//!
//! Decisions are recomputed on every run and never cached.

use tracing::debug;

use crate::pipeline::address::SenderAddress;
use crate::pipeline::types::{CandidateDecision, SkipReason};
use crate::source::RawMessage;

const REPLY_PREFIXES: &[&str] = &["re:", "fw:", "fwd:"];

pub struct Classifier {
    /// Lower-cased domain of the monitored mailbox.
    own_domain: Option<String>,
}

impl Classifier {
    pub fn new(own_domain: Option<String>) -> Self {
        Self {
            own_domain: own_domain.map(|d| d.trim().to_lowercase()).filter(|d| !d.is_empty()),
        }
    }

    /// Classify one message. Thread linkage is checked first.
    pub fn classify(&self, message: &RawMessage) -> CandidateDecision {
        let decision = if !is_thread_starter(message) {
            CandidateDecision::Skip(SkipReason::Reply)
        } else if !self.is_external_sender(&message.sender) {
            CandidateDecision::Skip(SkipReason::InternalSender)
        } else {
            CandidateDecision::Candidate
        };

        if let CandidateDecision::Skip(reason) = decision {
            debug!(message_id = %message.message_id, reason = reason.label(), "Not a candidate");
        }
        decision
    }

    /// True unless the sender's domain matches the operator's own domain.
    /// An unparseable sender is assumed external.
    pub fn is_external_sender(&self, sender: &str) -> bool {
        match (SenderAddress::parse(sender).domain(), &self.own_domain) {
            (Some(domain), Some(own)) => domain != *own,
            _ => true,
        }
    }
}

/// False if any thread-linkage header is set or the subject is a reply/forward.
pub fn is_thread_starter(message: &RawMessage) -> bool {
    if !message.in_reply_to.trim().is_empty() || !message.references.trim().is_empty() {
        return false;
    }
    let subject = message.subject.trim().to_lowercase();
    !REPLY_PREFIXES.iter().any(|p| subject.starts_with(p))
}
