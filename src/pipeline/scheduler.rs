//! Fixed-interval trigger for the mailbox source.
//!
//! Timer-based loop:
//! 1. tick (the first one fires immediately)
//! 2. `Orchestrator::try_run()` — skipped if a run is already in flight
//! 3. remember the result for `/api/scheduler/status`
//!
//! On shutdown the loop exits, any in-flight run is allowed to finish, and the
//! source connection is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::types::RunResult;
use crate::source::MessageSource;

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// The background loop is active.
    pub running: bool,
    /// A run is executing right now.
    pub run_in_flight: bool,
    pub interval_secs: u64,
    pub source_key: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_result: Option<RunResult>,
    /// Ticks dropped because the previous run was still going.
    pub skipped_ticks: usize,
}

/// Owns the mailbox source and drives the orchestrator against it.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    source: Arc<dyn MessageSource>,
    interval: Duration,
    last_result: RwLock<Option<RunResult>>,
    skipped_ticks: AtomicUsize,
    started: AtomicBool,
    shutdown: AtomicBool,
    stop: Notify,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        source: Arc<dyn MessageSource>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            source,
            interval,
            last_result: RwLock::new(None),
            skipped_ticks: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            stop: Notify::new(),
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// One scheduled tick. Returns `None` when a run was already in flight.
    pub async fn tick(&self) -> Option<RunResult> {
        match self.orchestrator.try_run(self.source.as_ref()).await {
            Some(result) => {
                *self.last_result.write().await = Some(result.clone());
                Some(result)
            }
            None => {
                self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                warn!("Previous run still in progress, skipping this tick");
                None
            }
        }
    }

    /// Manual trigger. Waits for any in-flight run, then runs.
    pub async fn run_now(&self) -> RunResult {
        let result = self.orchestrator.run(self.source.as_ref()).await;
        *self.last_result.write().await = Some(result.clone());
        result
    }

    pub async fn status(&self) -> SchedulerStatus {
        let last_result = self.last_result.read().await.clone();
        SchedulerStatus {
            running: self.started.load(Ordering::Relaxed) && !self.shutdown.load(Ordering::Relaxed),
            run_in_flight: self.orchestrator.is_running(),
            interval_secs: self.interval.as_secs(),
            source_key: self.source.source_key(),
            last_run_at: last_result.as_ref().map(|r| r.finished_at),
            last_result,
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
        }
    }

    /// Stop the loop, let an in-flight run finish, and release the source.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.stop.notify_one();
        self.orchestrator.wait_idle().await;
        self.source.disconnect().await;
        info!("Scheduler stopped");
    }
}

/// Spawn the background loop. The first run starts immediately.
pub fn spawn_scheduler(scheduler: Arc<Scheduler>) -> JoinHandle<()> {
    scheduler.started.store(true, Ordering::Relaxed);

    tokio::spawn(async move {
        info!(
            interval_secs = scheduler.interval.as_secs(),
            source_key = %scheduler.source.source_key(),
            "Scheduler started"
        );

        let mut tick = tokio::time::interval(scheduler.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = scheduler.stop.notified() => {}
            }

            if scheduler.shutdown.load(Ordering::Relaxed) {
                info!("Scheduler loop exiting");
                return;
            }

            scheduler.tick().await;
        }
    })
}
