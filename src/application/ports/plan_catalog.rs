use async_trait::async_trait;
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::plan::Plan};

/// Read-only lookup into the plan catalog. Catalog CRUD is owned by another
/// slice of the platform; this service resolves plans by id during checkout
/// and by external price id during subscription sync.
#[async_trait]
pub trait PlanCatalogPort: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>>;

    async fn get_by_external_price_id(&self, external_price_id: &str) -> AppResult<Option<Plan>>;
}
