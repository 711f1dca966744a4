pub mod payments;
pub mod webhooks;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().nest("/payments", payments::router().merge(webhooks::router()))
}
