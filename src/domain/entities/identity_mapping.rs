use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// 1:1 correspondence between a local customer and the provider's customer.
/// Created on the first successful checkout-completion event.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityMapping {
    pub customer_id: Uuid,
    pub external_customer_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
