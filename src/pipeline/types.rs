//! Shared types for the ingestion pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RECRUITER_NAME: &str = "Unknown Recruiter";
pub const DEFAULT_RECRUITER_EMAIL: &str = "unknown@example.com";
pub const DEFAULT_COMPANY: &str = "Unknown Company";
pub const DEFAULT_POSITION: &str = "Software Position";
pub const DEFAULT_LOCATION: &str = "Remote";

// ── Classification ──────────────────────────────────────────────────

/// Why a message was not treated as a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Part of an existing thread (reply headers or `Re:`/`Fwd:` subject).
    Reply,
    /// Sent from the operator's own domain.
    InternalSender,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::InternalSender => "internal-sender",
        }
    }
}

/// Outcome of the classifier for one message. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDecision {
    Candidate,
    Skip(SkipReason),
}

impl CandidateDecision {
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::Candidate)
    }
}

// ── Parsed contact ──────────────────────────────────────────────────

/// Tracking status assigned to new contacts, fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContactStatus {
    #[default]
    #[serde(rename = "Applied")]
    Applied,
    #[serde(rename = "Recruiter Screen")]
    RecruiterScreen,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "Applied",
            Self::RecruiterScreen => "Recruiter Screen",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = String;

    /// Accepts both the config spelling (`recruiter_screen`) and the
    /// display spelling stored in the ledger (`Recruiter Screen`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "applied" => Ok(Self::Applied),
            "recruiter screen" => Ok(Self::RecruiterScreen),
            other => Err(format!("unknown contact status '{other}'")),
        }
    }
}

/// Structured record extracted from one recruiter message.
///
/// Every field is non-empty; the extractor substitutes defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContact {
    pub recruiter_name: String,
    pub recruiter_email: String,
    pub company: String,
    pub position: String,
    pub location: String,
    pub status: ContactStatus,
    pub date_received: DateTime<Utc>,
}

impl ParsedContact {
    /// The fully-defaulted record.
    pub fn defaults(status: ContactStatus, date_received: DateTime<Utc>) -> Self {
        Self {
            recruiter_name: DEFAULT_RECRUITER_NAME.to_string(),
            recruiter_email: DEFAULT_RECRUITER_EMAIL.to_string(),
            company: DEFAULT_COMPANY.to_string(),
            position: DEFAULT_POSITION.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            status,
            date_received,
        }
    }
}

// ── Policies ────────────────────────────────────────────────────────

/// Which identity the coarse "one entry per employer/recruiter" throttle uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Same company, any recruiter.
    #[default]
    Company,
    /// Same recruiter email address.
    RecruiterEmail,
}

impl DedupPolicy {
    /// Derive the contact key for a parsed record under this policy.
    pub fn contact_key(&self, contact: &ParsedContact) -> String {
        match self {
            Self::Company => contact.company.trim().to_lowercase(),
            Self::RecruiterEmail => contact.recruiter_email.trim().to_lowercase(),
        }
    }
}

impl FromStr for DedupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "company" => Ok(Self::Company),
            "recruiter_email" | "email" => Ok(Self::RecruiterEmail),
            other => Err(format!("unknown dedup policy '{other}'")),
        }
    }
}

/// What to do with a candidate whose tracking-store create failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateFailurePolicy {
    /// Record it with no downstream id; it is never retried.
    #[default]
    Drop,
    /// Leave it unrecorded so the next run tries again.
    Retry,
}

impl FromStr for CreateFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "retry" => Ok(Self::Retry),
            other => Err(format!("unknown create-failure policy '{other}'")),
        }
    }
}

// ── Run outcomes ────────────────────────────────────────────────────

/// Where a single message ended up in the per-run state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Dropped by the classifier; no ledger write.
    NotCandidate(SkipReason),
    /// A ledger entry already exists for the message id.
    AlreadyRecorded,
    /// Identity already known; recorded without a downstream create.
    Throttled,
    /// Created downstream and recorded.
    Created { downstream_id: String },
    /// Downstream create failed. `recorded` is false under the retry policy.
    CreateFailed { recorded: bool },
    /// The message could not be gated or recorded because the ledger failed.
    LedgerFailed,
}

impl MessageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotCandidate(_) => "not_candidate",
            Self::AlreadyRecorded => "already_recorded",
            Self::Throttled => "throttled",
            Self::Created { .. } => "created",
            Self::CreateFailed { .. } => "create_failed",
            Self::LedgerFailed => "ledger_failed",
        }
    }
}

/// Aggregate result of one orchestrator run, returned to the wiring layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub source_key: String,
    /// Messages returned by the source.
    pub fetched: usize,
    /// Candidates that passed the ledger gate this run.
    pub processed: usize,
    /// Records created in the tracking store.
    pub created: usize,
    /// Candidates recorded without a create because their identity was known.
    pub throttled: usize,
    pub errors: Vec<String>,
    /// False only when the source was unavailable or the checkpoint could not advance.
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn new(source_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            source_key: source_key.into(),
            fetched: 0,
            processed: 0,
            created: 0,
            throttled: 0,
            errors: Vec::new(),
            success: true,
            started_at: now,
            finished_at: now,
        }
    }
}
