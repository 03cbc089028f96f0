//! Orchestrator — one sequential ingestion run over a message source.
//!
//! Per message:
//! 1. `Classifier::classify()` — replies and internal mail are dropped, no ledger write
//! 2. `Ledger::has_message()` — already-handled ids are dropped before parsing
//! 3. `Extractor::parse()` — total, never fails
//! 4. `Ledger::has_identity()` — known contacts are recorded without a create
//! 5. `TrackingStore::create()` — exactly one attempt
//! 6. `Ledger::record()`
//!
//! After the batch the source checkpoint advances, whatever happened, and the
//! source is disconnected.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, MAX_LOOKBACK_DAYS};
use crate::error::PipelineError;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::extractor::Extractor;
use crate::pipeline::types::{
    CandidateDecision, ContactStatus, CreateFailurePolicy, DedupPolicy, MessageOutcome, RunResult,
};
use crate::source::{FetchScope, MessageSource, RawMessage};
use crate::store::Ledger;
use crate::tracker::TrackingStore;

/// Settings that shape a run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Mailbox address; ledger entries and identity checks are scoped to it.
    pub owner: String,
    /// Messages from this domain are internal and never candidates.
    pub own_domain: Option<String>,
    /// Window for a source's first run, before it has a checkpoint.
    pub lookback_days: i64,
    pub dedup_policy: DedupPolicy,
    pub create_failure_policy: CreateFailurePolicy,
    pub default_status: ContactStatus,
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            owner: config.mailbox.email.trim().to_lowercase(),
            own_domain: config.mailbox.domain(),
            lookback_days: config.lookback_days.clamp(0, MAX_LOOKBACK_DAYS),
            dedup_policy: config.pipeline.dedup_policy,
            create_failure_policy: config.pipeline.create_failure_policy,
            default_status: config.pipeline.default_status,
        }
    }
}

pub struct Orchestrator {
    ledger: Arc<dyn Ledger>,
    tracker: Arc<dyn TrackingStore>,
    classifier: Classifier,
    extractor: Extractor,
    config: OrchestratorConfig,
    /// Held for the duration of a run. At most one run is in flight.
    run_lock: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        tracker: Arc<dyn TrackingStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ledger,
            tracker,
            classifier: Classifier::new(config.own_domain.clone()),
            extractor: Extractor::new(config.default_status),
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn owner(&self) -> &str {
        &self.config.owner
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// True while a run holds the lock.
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Wait until no run is in flight.
    pub async fn wait_idle(&self) {
        let _guard = self.run_lock.lock().await;
    }

    /// Run once, waiting for any in-flight run to finish first.
    pub async fn run(&self, source: &dyn MessageSource) -> RunResult {
        let _guard = self.run_lock.lock().await;
        self.run_locked(source).await
    }

    /// Run once unless another run is in flight, in which case return `None`.
    pub async fn try_run(&self, source: &dyn MessageSource) -> Option<RunResult> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.run_locked(source).await)
    }

    async fn run_locked(&self, source: &dyn MessageSource) -> RunResult {
        let source_key = source.source_key();
        let mut result = RunResult::new(&source_key);

        let previous = match self.ledger.get_checkpoint(&source_key).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(source_key = %source_key, error = %e, "Failed to read checkpoint, using lookback window");
                None
            }
        };
        let since =
            previous.unwrap_or_else(|| lookback_start(result.started_at, self.config.lookback_days));

        info!(source_key = %source_key, since = %since, "Starting ingestion run");

        match source.fetch(&FetchScope { since }).await {
            Ok(messages) => {
                result.fetched = messages.len();
                let mut attempted = HashSet::new();
                for message in &messages {
                    // One attempt per id per run, even if the batch repeats it
                    if !attempted.insert(message.message_id.as_str()) {
                        debug!(message_id = %message.message_id, "Duplicate id in batch, skipping");
                        continue;
                    }
                    let outcome = self.process_message(message, &mut result).await;
                    debug!(
                        message_id = %message.message_id,
                        outcome = outcome.label(),
                        "Message handled"
                    );
                }
            }
            Err(e) => {
                let err = PipelineError::SourceUnavailable(e);
                error!(source_key = %source_key, error = %err, "Source fetch failed");
                result.errors.push(err.to_string());
                result.success = false;
            }
        }

        let next = next_checkpoint(previous, Utc::now().trunc_subsecs(6));
        if let Err(e) = self.ledger.set_checkpoint(&source_key, next).await {
            let err = PipelineError::CheckpointFailed {
                source_key: source_key.clone(),
                reason: e.to_string(),
            };
            error!(error = %err, "Checkpoint not advanced");
            result.errors.push(err.to_string());
            result.success = false;
        }

        source.disconnect().await;

        result.finished_at = Utc::now();
        info!(
            source_key = %source_key,
            fetched = result.fetched,
            processed = result.processed,
            created = result.created,
            throttled = result.throttled,
            errors = result.errors.len(),
            success = result.success,
            "Ingestion run complete"
        );
        result
    }

    /// Drive one message through the state machine, updating the run tallies.
    async fn process_message(&self, message: &RawMessage, result: &mut RunResult) -> MessageOutcome {
        let message_id = message.message_id.as_str();

        if let CandidateDecision::Skip(reason) = self.classifier.classify(message) {
            return MessageOutcome::NotCandidate(reason);
        }

        match self.ledger.has_message(message_id).await {
            Ok(true) => return MessageOutcome::AlreadyRecorded,
            Ok(false) => {}
            Err(e) => {
                record_error(
                    result,
                    PipelineError::LedgerReadFailed {
                        message_id: message_id.to_string(),
                        reason: e.to_string(),
                    },
                );
                return MessageOutcome::LedgerFailed;
            }
        }
        result.processed += 1;

        let contact = self.extractor.parse(message);
        let contact_key = self.config.dedup_policy.contact_key(&contact);
        let owner = self.config.owner.as_str();

        let known = match self.ledger.has_identity(owner, &contact_key).await {
            Ok(known) => known,
            Err(e) => {
                record_error(
                    result,
                    PipelineError::LedgerReadFailed {
                        message_id: message_id.to_string(),
                        reason: e.to_string(),
                    },
                );
                return MessageOutcome::LedgerFailed;
            }
        };

        if known {
            info!(message_id, contact_key = %contact_key, "Contact already tracked, recording without create");
            if let Err(e) = self.ledger.record(message_id, owner, &contact_key, &contact, None).await {
                record_error(result, ledger_write_failed(message_id, e));
                return MessageOutcome::LedgerFailed;
            }
            result.throttled += 1;
            return MessageOutcome::Throttled;
        }

        match self.tracker.create(&contact).await {
            Some(downstream_id) => {
                result.created += 1;
                if let Err(e) = self
                    .ledger
                    .record(message_id, owner, &contact_key, &contact, Some(&downstream_id))
                    .await
                {
                    record_error(result, ledger_write_failed(message_id, e));
                    return MessageOutcome::LedgerFailed;
                }
                MessageOutcome::Created { downstream_id }
            }
            None => {
                record_error(
                    result,
                    PipelineError::DownstreamCreateFailed {
                        message_id: message_id.to_string(),
                    },
                );
                match self.config.create_failure_policy {
                    CreateFailurePolicy::Retry => MessageOutcome::CreateFailed { recorded: false },
                    CreateFailurePolicy::Drop => {
                        if let Err(e) =
                            self.ledger.record(message_id, owner, &contact_key, &contact, None).await
                        {
                            record_error(result, ledger_write_failed(message_id, e));
                            return MessageOutcome::LedgerFailed;
                        }
                        MessageOutcome::CreateFailed { recorded: true }
                    }
                }
            }
        }
    }
}

fn ledger_write_failed(message_id: &str, e: crate::error::DatabaseError) -> PipelineError {
    PipelineError::LedgerWriteFailed {
        message_id: message_id.to_string(),
        reason: e.to_string(),
    }
}

fn record_error(result: &mut RunResult, err: PipelineError) {
    warn!(error = %err, "Message not fully processed");
    result.errors.push(err.to_string());
}

/// Start of the first-run window. Saturates at the earliest representable
/// instant instead of overflowing.
fn lookback_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days.max(0))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The checkpoint only moves forward: `now`, or one microsecond past the
/// previous value when the clock has not moved on. Stored at microsecond
/// precision, so `now` should already be truncated to micros.
fn next_checkpoint(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}
