use async_trait::async_trait;

use crate::app_error::AppResult;

/// Invalidate-on-write hook into the platform's caching layer, keyed by
/// logical table name. Invoked after every mutating write; webhook handlers
/// await it before acknowledging the delivery.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, table: &str) -> AppResult<()>;
}
