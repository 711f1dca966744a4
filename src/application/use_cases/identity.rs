//! Bidirectional customer-id ↔ provider-customer-id mapping.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::cache::CacheInvalidator,
    domain::entities::identity_mapping::IdentityMapping,
};

#[async_trait]
pub trait IdentityMappingRepo: Send + Sync {
    async fn get_by_customer_id(&self, customer_id: Uuid) -> AppResult<Option<IdentityMapping>>;

    async fn get_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> AppResult<Option<IdentityMapping>>;

    /// Insert-or-correct keyed by external customer id.
    async fn upsert(
        &self,
        external_customer_id: &str,
        customer_id: Uuid,
    ) -> AppResult<IdentityMapping>;
}

pub struct IdentityMapper {
    mappings: Arc<dyn IdentityMappingRepo>,
    cache: Arc<dyn CacheInvalidator>,
}

impl IdentityMapper {
    pub fn new(mappings: Arc<dyn IdentityMappingRepo>, cache: Arc<dyn CacheInvalidator>) -> Self {
        Self { mappings, cache }
    }

    pub async fn find_by_customer_id(&self, customer_id: Uuid) -> AppResult<IdentityMapping> {
        self.mappings
            .get_by_customer_id(customer_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn find_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> AppResult<IdentityMapping> {
        self.mappings
            .get_by_external_customer_id(external_customer_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Idempotent insert-or-correct. A mapping pointing at a different
    /// customer is overwritten (last write wins, no conflict detection).
    pub async fn upsert(
        &self,
        external_customer_id: &str,
        customer_id: Uuid,
    ) -> AppResult<IdentityMapping> {
        if let Some(existing) = self
            .mappings
            .get_by_external_customer_id(external_customer_id)
            .await?
        {
            if existing.customer_id != customer_id {
                warn!(
                    external_customer_id,
                    previous_customer_id = %existing.customer_id,
                    new_customer_id = %customer_id,
                    "Identity mapping overwritten with a different customer"
                );
            }
        }

        let mapping = self
            .mappings
            .upsert(external_customer_id, customer_id)
            .await?;
        self.cache.invalidate("identity_mappings").await?;
        Ok(mapping)
    }
}
