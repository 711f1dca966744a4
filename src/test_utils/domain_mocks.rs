//! In-memory doubles for the identity mapping repository and the read-only
//! catalog/directory ports.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::ports::{
        cache::CacheInvalidator, customer_directory::CustomerDirectoryPort,
        plan_catalog::PlanCatalogPort,
    },
    application::use_cases::identity::IdentityMappingRepo,
    domain::entities::{customer::Customer, identity_mapping::IdentityMapping, plan::Plan},
};

// ============================================================================
// InMemoryIdentityMappingRepo
// ============================================================================

/// Mappings keyed by external customer id, mirroring the unique constraints
/// on both columns of the real table.
#[derive(Default)]
pub struct InMemoryIdentityMappingRepo {
    rows: Mutex<HashMap<String, IdentityMapping>>,
}

impl InMemoryIdentityMappingRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a mapping without going through the use case.
    pub fn insert(&self, external_customer_id: &str, customer_id: Uuid) {
        let now = Utc::now();
        self.rows.lock().unwrap().insert(
            external_customer_id.to_string(),
            IdentityMapping {
                customer_id,
                external_customer_id: external_customer_id.to_string(),
                created_at: Some(now),
                updated_at: Some(now),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentityMappingRepo for InMemoryIdentityMappingRepo {
    async fn get_by_customer_id(&self, customer_id: Uuid) -> AppResult<Option<IdentityMapping>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|m| m.customer_id == customer_id)
            .cloned())
    }

    async fn get_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> AppResult<Option<IdentityMapping>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(external_customer_id)
            .cloned())
    }

    async fn upsert(
        &self,
        external_customer_id: &str,
        customer_id: Uuid,
    ) -> AppResult<IdentityMapping> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();

        // The unique constraint on customer_id evicts a stale mapping that
        // points at the same customer from a different external id.
        rows.retain(|external, m| {
            external == external_customer_id || m.customer_id != customer_id
        });

        let created_at = rows
            .get(external_customer_id)
            .and_then(|m| m.created_at)
            .or(Some(now));
        let mapping = IdentityMapping {
            customer_id,
            external_customer_id: external_customer_id.to_string(),
            created_at,
            updated_at: Some(now),
        };
        rows.insert(external_customer_id.to_string(), mapping.clone());
        Ok(mapping)
    }
}

// ============================================================================
// InMemoryPlanCatalog
// ============================================================================

#[derive(Default)]
pub struct InMemoryPlanCatalog {
    plans: Vec<Plan>,
}

impl InMemoryPlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<Plan>) -> Self {
        Self { plans }
    }
}

#[async_trait]
impl PlanCatalogPort for InMemoryPlanCatalog {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Plan>> {
        Ok(self.plans.iter().find(|p| p.id == id).cloned())
    }

    async fn get_by_external_price_id(&self, external_price_id: &str) -> AppResult<Option<Plan>> {
        Ok(self
            .plans
            .iter()
            .find(|p| p.external_price_id == external_price_id)
            .cloned())
    }
}

// ============================================================================
// InMemoryCustomerDirectory
// ============================================================================

#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    customers: Vec<Customer>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customers(customers: Vec<Customer>) -> Self {
        Self { customers }
    }
}

#[async_trait]
impl CustomerDirectoryPort for InMemoryCustomerDirectory {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Customer>> {
        Ok(self.customers.iter().find(|c| c.id == id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        Ok(self.customers.iter().find(|c| c.email == email).cloned())
    }
}

// ============================================================================
// Cache invalidation
// ============================================================================

pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate(&self, _table: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Records every invalidated table name, for asserting cache hygiene.
#[derive(Default)]
pub struct RecordingCacheInvalidator {
    tables: Mutex<Vec<String>>,
}

impl RecordingCacheInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.tables.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingCacheInvalidator {
    async fn invalidate(&self, table: &str) -> AppResult<()> {
        self.tables.lock().unwrap().push(table.to_string());
        Ok(())
    }
}
