use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::ports::customer_directory::CustomerDirectoryPort,
    domain::entities::customer::Customer,
};

fn row_to_customer(row: &sqlx::postgres::PgRow) -> Customer {
    Customer {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
    }
}

const SELECT_COLS: &str = "id, email, name";

#[async_trait]
impl CustomerDirectoryPort for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM customers WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_customer))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM customers WHERE email = $1",
            SELECT_COLS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_customer))
    }
}
