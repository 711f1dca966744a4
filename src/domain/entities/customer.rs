use serde::Serialize;
use uuid::Uuid;

/// Customer record owned by the customer-management slice; this service
/// only reads it (by id from auth, by email for provider customer creation).
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}
