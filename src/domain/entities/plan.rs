use serde::Serialize;
use uuid::Uuid;

/// Subscription plan from the catalog. The catalog's own CRUD lives
/// elsewhere; this service only resolves plans by id (checkout) or by
/// external price id (subscription sync).
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub trial_period_days: i32,
    pub external_price_id: String,
}
