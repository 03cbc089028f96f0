//! Recruiter-mail ingestion pipeline.
//!
//! Every message a source returns flows through:
//! 1. `Classifier::classify()` — only thread-starting mail from outside senders
//! 2. `Ledger::has_message()` — each message id is handled at most once
//! 3. `Extractor::parse()` — heuristic rule cascades in `rules`
//! 4. `Ledger::has_identity()` — one tracking entry per employer (or recruiter)
//! 5. `TrackingStore::create()`, then `Ledger::record()`
//!
//! `Orchestrator` runs the loop; `Scheduler` triggers it on an interval.

pub mod address;
pub mod classifier;
pub mod extractor;
pub mod orchestrator;
pub mod rules;
pub mod scheduler;
pub mod types;

pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use scheduler::{Scheduler, SchedulerStatus, spawn_scheduler};
