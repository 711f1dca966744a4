//! Provider webhook endpoint.
//!
//! Returning an error status makes the provider redeliver; an acknowledged
//! event is gone for good, so handlers only acknowledge what they have fully
//! applied or deliberately skipped.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks", post(handle_webhook))
}

/// POST /payments/webhooks
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::SignatureInvalid)?;

    app_state.webhooks.dispatch(&body, signature).await?;
    Ok(Json(serde_json::json!({ "received": true })))
}
