//! Persistence layer — the libSQL-backed ledger and source checkpoints.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Ledger, LedgerEntry};
