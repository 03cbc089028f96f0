//! Error types for recruiter-sync.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Message source errors (mailbox transport, webhook payloads).
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source {source_key} unavailable: {reason}")]
    Unavailable { source_key: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid message payload: {0}")]
    InvalidPayload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tracking-store client errors.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Tracker {tracker} request failed: {reason}")]
    RequestFailed { tracker: String, reason: String },

    #[error("Tracker {tracker} returned HTTP {status}: {body}")]
    Api {
        tracker: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {tracker}: {reason}")]
    InvalidResponse { tracker: String, reason: String },
}

/// Per-run pipeline errors. Their display strings populate `RunResult::errors`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("Tracking store did not create a record for message {message_id}")]
    DownstreamCreateFailed { message_id: String },

    #[error("Ledger write failed for message {message_id}: {reason}")]
    LedgerWriteFailed { message_id: String, reason: String },

    #[error("Ledger read failed for message {message_id}: {reason}")]
    LedgerReadFailed { message_id: String, reason: String },

    #[error("Checkpoint update failed for {source_key}: {reason}")]
    CheckpointFailed { source_key: String, reason: String },
}
