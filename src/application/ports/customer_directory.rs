use async_trait::async_trait;
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::customer::Customer};

/// Read-only lookup into the customer directory owned by the
/// customer-management slice.
#[async_trait]
pub trait CustomerDirectoryPort: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Customer>>;

    async fn get_by_email(&self, email: &str) -> AppResult<Option<Customer>>;
}
