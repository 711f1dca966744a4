//! Redis-backed cache invalidation.
//!
//! The platform caches read queries under versioned keys; bumping the version
//! counter for a table invalidates every cached query that touched it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::cache::CacheInvalidator,
    infra::error::InfraError,
};

pub struct RedisCacheInvalidator {
    manager: ConnectionManager,
}

impl RedisCacheInvalidator {
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheInvalidator for RedisCacheInvalidator {
    async fn invalidate(&self, table: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let key = format!("cache:version:{table}");
        let _: i64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Cache invalidation failed: {e}")))?;
        Ok(())
    }
}
