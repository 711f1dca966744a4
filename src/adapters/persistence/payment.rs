use async_trait::async_trait;
use sqlx::postgres::Postgres;
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::payment_record::{
        PaginatedPayments, PaymentListFilters, PaymentRepo, UpsertPaymentInput,
    },
    domain::entities::payment::Payment,
};

fn row_to_payment(row: &sqlx::postgres::PgRow) -> Payment {
    Payment {
        id: row.get("id"),
        external_payment_intent_id: row.get("external_payment_intent_id"),
        external_invoice_id: row.get("external_invoice_id"),
        customer_id: row.get("customer_id"),
        subscription_id: row.get("subscription_id"),
        amount_cents: row.get("amount_cents"),
        currency: row.get("currency"),
        status: row.get("status"),
        paid_at: row.get("paid_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, external_payment_intent_id, external_invoice_id, customer_id,
    subscription_id, amount_cents, currency, status, paid_at,
    created_at, updated_at
"#;

/// Pushes payment filter conditions to a QueryBuilder.
/// Caller must ensure the builder already has base WHERE conditions.
fn push_payment_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &PaymentListFilters) {
    if let Some(status) = &filters.status {
        builder.push(" AND status = ").push_bind(*status);
    }
    if let Some(date_from) = &filters.date_from {
        builder.push(" AND created_at >= ").push_bind(*date_from);
    }
    if let Some(date_to) = &filters.date_to {
        builder.push(" AND created_at <= ").push_bind(*date_to);
    }
}

#[async_trait]
impl PaymentRepo for PostgresPersistence {
    async fn get_by_intent_id(
        &self,
        external_payment_intent_id: &str,
    ) -> AppResult<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payments WHERE external_payment_intent_id = $1",
            SELECT_COLS
        ))
        .bind(external_payment_intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_payment))
    }

    async fn upsert_by_intent_id(&self, input: &UpsertPaymentInput) -> AppResult<Payment> {
        let id = Uuid::new_v4();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (
                id, external_payment_intent_id, external_invoice_id, customer_id,
                subscription_id, amount_cents, currency, status, paid_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (external_payment_intent_id) DO UPDATE SET
                external_invoice_id = COALESCE(EXCLUDED.external_invoice_id, payments.external_invoice_id),
                customer_id = EXCLUDED.customer_id,
                subscription_id = COALESCE(EXCLUDED.subscription_id, payments.subscription_id),
                amount_cents = EXCLUDED.amount_cents,
                currency = EXCLUDED.currency,
                status = EXCLUDED.status,
                paid_at = COALESCE(EXCLUDED.paid_at, payments.paid_at),
                updated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(&input.external_payment_intent_id)
        .bind(&input.external_invoice_id)
        .bind(input.customer_id)
        .bind(input.subscription_id)
        .bind(input.amount_cents)
        .bind(&input.currency)
        .bind(input.status)
        .bind(input.paid_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_payment(&row))
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        filters: &PaymentListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedPayments> {
        let offset = (page - 1) * per_page;

        // Count query
        let mut count_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM payments WHERE customer_id = ");
        count_builder.push_bind(customer_id);
        push_payment_filters(&mut count_builder, filters);

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;

        // Data query
        let mut data_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM payments WHERE customer_id = ",
            SELECT_COLS
        ));
        data_builder.push_bind(customer_id);
        push_payment_filters(&mut data_builder, filters);
        data_builder.push(" ORDER BY paid_at DESC NULLS LAST, created_at DESC");
        data_builder.push(" LIMIT ").push_bind(per_page);
        data_builder.push(" OFFSET ").push_bind(offset);

        let rows = data_builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        let payments: Vec<Payment> = rows.iter().map(row_to_payment).collect();
        let total_pages = ((total as f64) / (per_page as f64)).ceil() as i32;

        Ok(PaginatedPayments {
            payments,
            total,
            page,
            per_page,
            total_pages,
        })
    }
}
