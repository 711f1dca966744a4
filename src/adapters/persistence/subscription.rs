use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::Postgres;
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription_sync::{
        PaginatedSubscriptions, SubscriptionListFilters, SubscriptionRepo,
        UpsertSubscriptionInput,
    },
    domain::entities::subscription::{Subscription, SubscriptionStatus},
};

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        external_subscription_id: row.get("external_subscription_id"),
        plan_id: row.get("plan_id"),
        customer_id: row.get("customer_id"),
        status: row.get("status"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        trial_start: row.get("trial_start"),
        trial_end: row.get("trial_end"),
        cancel_at: row.get("cancel_at"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        canceled_at: row.get("canceled_at"),
        paid_at: row.get("paid_at"),
        latest_invoice_id: row.get("latest_invoice_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, external_subscription_id, plan_id, customer_id, status,
    current_period_start, current_period_end, trial_start, trial_end,
    cancel_at, cancel_at_period_end, canceled_at, paid_at, latest_invoice_id,
    created_at, updated_at
"#;

/// Pushes subscription filter conditions to a QueryBuilder.
/// Caller must ensure the builder already has base WHERE conditions.
fn push_subscription_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    filters: &SubscriptionListFilters,
) {
    if let Some(status) = &filters.status {
        builder.push(" AND status = ").push_bind(*status);
    }
    if let Some(plan_id) = &filters.plan_id {
        builder.push(" AND plan_id = ").push_bind(*plan_id);
    }
    if let Some(date_from) = &filters.date_from {
        builder.push(" AND created_at >= ").push_bind(*date_from);
    }
    if let Some(date_to) = &filters.date_to {
        builder.push(" AND created_at <= ").push_bind(*date_to);
    }
}

#[async_trait]
impl SubscriptionRepo for PostgresPersistence {
    async fn get_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE external_subscription_id = $1",
            SELECT_COLS
        ))
        .bind(external_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn find_current_by_customer(
        &self,
        customer_id: Uuid,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE customer_id = $1 AND status NOT IN ('canceled', 'incomplete_expired')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn upsert_by_external_id(
        &self,
        input: &UpsertSubscriptionInput,
    ) -> AppResult<Subscription> {
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO subscriptions (
                id, external_subscription_id, plan_id, customer_id, status,
                current_period_start, current_period_end, trial_start, trial_end,
                cancel_at, cancel_at_period_end, canceled_at, latest_invoice_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (external_subscription_id) DO UPDATE SET
                plan_id = EXCLUDED.plan_id,
                customer_id = EXCLUDED.customer_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                trial_start = EXCLUDED.trial_start,
                trial_end = EXCLUDED.trial_end,
                cancel_at = EXCLUDED.cancel_at,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                canceled_at = EXCLUDED.canceled_at,
                latest_invoice_id = COALESCE(EXCLUDED.latest_invoice_id, subscriptions.latest_invoice_id),
                updated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(&input.external_subscription_id)
        .bind(input.plan_id)
        .bind(input.customer_id)
        .bind(input.status)
        .bind(input.current_period_start)
        .bind(input.current_period_end)
        .bind(input.trial_start)
        .bind(input.trial_end)
        .bind(input.cancel_at)
        .bind(input.cancel_at_period_end)
        .bind(input.canceled_at)
        .bind(&input.latest_invoice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_subscription(&row))
    }

    async fn update_status(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE subscriptions SET
                status = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE external_subscription_id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(external_subscription_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn mark_paid(
        &self,
        external_subscription_id: &str,
        paid_at: DateTime<Utc>,
        latest_invoice_id: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions SET
                paid_at = $2,
                latest_invoice_id = COALESCE($3, latest_invoice_id),
                updated_at = CURRENT_TIMESTAMP
            WHERE external_subscription_id = $1
            "#,
        )
        .bind(external_subscription_id)
        .bind(paid_at)
        .bind(latest_invoice_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn delete_by_external_id(&self, external_subscription_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE external_subscription_id = $1")
            .bind(external_subscription_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        filters: &SubscriptionListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedSubscriptions> {
        let offset = (page - 1) * per_page;

        // Count query
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM subscriptions WHERE customer_id = ");
        count_builder.push_bind(customer_id);
        push_subscription_filters(&mut count_builder, filters);

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;

        // Data query
        let mut data_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM subscriptions WHERE customer_id = ",
            SELECT_COLS
        ));
        data_builder.push_bind(customer_id);
        push_subscription_filters(&mut data_builder, filters);
        data_builder.push(" ORDER BY created_at DESC");
        data_builder.push(" LIMIT ").push_bind(per_page);
        data_builder.push(" OFFSET ").push_bind(offset);

        let rows = data_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        let subscriptions: Vec<Subscription> = rows.iter().map(row_to_subscription).collect();
        let total_pages = ((total as f64) / (per_page as f64)).ceil() as i32;

        Ok(PaginatedSubscriptions {
            subscriptions,
            total,
            page,
            per_page,
            total_pages,
        })
    }
}
