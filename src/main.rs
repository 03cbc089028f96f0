use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use recruiter_sync::api::{AppState, api_routes};
use recruiter_sync::config::AppConfig;
use recruiter_sync::pipeline::{Orchestrator, OrchestratorConfig, Scheduler, spawn_scheduler};
use recruiter_sync::source::imap::DEFAULT_SEARCH_SLACK_DAYS;
use recruiter_sync::source::{ImapConfig, ImapSource, MessageSource};
use recruiter_sync::store::{Ledger, LibSqlBackend};
use recruiter_sync::tracker::{NotionClient, TrackingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Optional .env; real environment wins
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config);

    eprintln!("📬 recruiter-sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Mailbox: {} <{}> (label: {})",
        config.mailbox.user_name, config.mailbox.email, config.mailbox.label
    );
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!("   Interval: every {}s", config.check_interval.as_secs());
    eprintln!("   API: http://{}:{}", config.http_host, config.http_port);

    let warnings = config.warnings();
    for warning in &warnings {
        tracing::warn!("Config: {warning}");
    }

    // ── Ledger ───────────────────────────────────────────────────────────
    let ledger: Arc<dyn Ledger> = Arc::new(
        LibSqlBackend::new_local(&config.database_path)
            .await
            .with_context(|| {
                format!("Failed to open database at {}", config.database_path.display())
            })?,
    );

    // ── Tracking store ───────────────────────────────────────────────────
    let tracker: Arc<dyn TrackingStore> =
        Arc::new(NotionClient::new(&config.notion).context("Failed to build Notion client")?);
    match tracker.health_check().await {
        Ok(()) => tracing::info!(tracker = tracker.name(), "Tracking store reachable"),
        Err(e) => tracing::warn!(tracker = tracker.name(), error = %e, "Tracking store check failed"),
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&ledger),
        tracker,
        OrchestratorConfig::from_app(&config),
    ));
    // Search back over the lookback window so mail labeled late is still seen
    let source: Arc<dyn MessageSource> = Arc::new(ImapSource::new(ImapConfig {
        search_slack_days: config.lookback_days.max(DEFAULT_SEARCH_SLACK_DAYS),
        ..ImapConfig::from(&config.mailbox)
    }));
    let scheduler = Scheduler::new(orchestrator, source, config.check_interval);
    let scheduler_handle = spawn_scheduler(Arc::clone(&scheduler));

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api_routes(AppState {
        scheduler: Arc::clone(&scheduler),
        config_warnings: Arc::new(warnings),
    });
    let addr = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    // ── Teardown ─────────────────────────────────────────────────────────
    scheduler.shutdown().await;
    if let Err(e) = scheduler_handle.await {
        tracing::warn!(error = %e, "Scheduler task ended abnormally");
    }
    eprintln!("👋 recruiter-sync stopped");
    Ok(())
}

/// stderr plus a daily-rolling file under `LOG_DIR`. The returned guard
/// flushes the file writer on drop.
fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::fs::create_dir_all(&config.log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "recruiter-sync.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        None
    }
}
