//! Collaborators the core consumes but does not own: object storage,
//! rate limiting and alerting.

use {
    super::error::MarketError,
    super::integrity::IntegrityReport,
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::time::Duration,
};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket deliverable keys are resolved against.
    fn bucket(&self) -> &str;

    async fn issue_temporary_download_url(
        &self,
        object_path: &str,
        ttl: Duration,
    ) -> Result<String, MarketError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_at - now).num_seconds().max(1) as u64
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str, limit: u32, window: Duration) -> RateLimitDecision;
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, report: &IntegrityReport);
}
