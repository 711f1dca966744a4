use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::identity::IdentityMappingRepo,
    domain::entities::identity_mapping::IdentityMapping,
};

fn row_to_mapping(row: &sqlx::postgres::PgRow) -> IdentityMapping {
    IdentityMapping {
        customer_id: row.get("customer_id"),
        external_customer_id: row.get("external_customer_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = "customer_id, external_customer_id, created_at, updated_at";

#[async_trait]
impl IdentityMappingRepo for PostgresPersistence {
    async fn get_by_customer_id(&self, customer_id: Uuid) -> AppResult<Option<IdentityMapping>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM identity_mappings WHERE customer_id = $1",
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_mapping))
    }

    async fn get_by_external_customer_id(
        &self,
        external_customer_id: &str,
    ) -> AppResult<Option<IdentityMapping>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM identity_mappings WHERE external_customer_id = $1",
            SELECT_COLS
        ))
        .bind(external_customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_mapping))
    }

    async fn upsert(
        &self,
        external_customer_id: &str,
        customer_id: Uuid,
    ) -> AppResult<IdentityMapping> {
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        // Both columns are unique. A stale mapping for the same customer
        // under a different external id must go first or the insert below
        // trips the customer_id constraint.
        sqlx::query(
            "DELETE FROM identity_mappings WHERE customer_id = $1 AND external_customer_id <> $2",
        )
        .bind(customer_id)
        .bind(external_customer_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO identity_mappings (customer_id, external_customer_id)
            VALUES ($1, $2)
            ON CONFLICT (external_customer_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                updated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(customer_id)
        .bind(external_customer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(row_to_mapping(&row))
    }
}
