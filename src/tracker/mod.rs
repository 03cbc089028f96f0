//! Tracking-store clients — where new recruiter contacts end up.

pub mod notion;

use async_trait::async_trait;

use crate::error::TrackerError;
use crate::pipeline::types::ParsedContact;

pub use notion::NotionClient;

/// A downstream store that gets one record per new contact.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Create a record. Returns the downstream id, or `None` on any failure.
    ///
    /// Exactly one attempt; failures are logged by the implementation.
    async fn create(&self, contact: &ParsedContact) -> Option<String>;

    /// Verify credentials and reachability.
    async fn health_check(&self) -> Result<(), TrackerError>;
}
