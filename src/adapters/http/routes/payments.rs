//! Customer-facing checkout and billing-history endpoints.

use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, auth::AuthenticatedCustomer},
    app_error::{AppError, AppResult},
    application::use_cases::{
        payment_record::PaymentListFilters, subscription_sync::SubscriptionListFilters,
    },
    domain::entities::{payment::PaymentStatus, subscription::SubscriptionStatus},
};

const DEFAULT_PER_PAGE: i32 = 20;
const MAX_PER_PAGE: i32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(start_checkout))
        .route("/session/{session_id}", get(get_checkout_session))
        .route("/histories", get(list_payment_histories))
        .route("/subscriptions/histories", get(list_subscription_histories))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    plan_id: Uuid,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    page: Option<i32>,
    per_page: Option<i32>,
    status: Option<String>,
    plan_id: Option<Uuid>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    fn page(&self) -> i32 {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> i32 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }
}

/// POST /payments/checkout
async fn start_checkout(
    State(app_state): State<AppState>,
    AuthenticatedCustomer(customer_id): AuthenticatedCustomer,
    Json(body): Json<CheckoutRequest>,
) -> AppResult<impl IntoResponse> {
    let created = app_state
        .checkout
        .start_checkout(customer_id, body.plan_id, &body.success_url, &body.cancel_url)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /payments/session/{session_id}
async fn get_checkout_session(
    State(app_state): State<AppState>,
    AuthenticatedCustomer(customer_id): AuthenticatedCustomer,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = app_state
        .checkout
        .get_checkout_session(customer_id, &session_id)
        .await?;
    Ok(Json(view))
}

/// GET /payments/histories
async fn list_payment_histories(
    State(app_state): State<AppState>,
    AuthenticatedCustomer(customer_id): AuthenticatedCustomer,
    Query(query): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .map(PaymentStatus::from_str)
        .transpose()
        .map_err(AppError::InvalidInput)?;

    let filters = PaymentListFilters {
        status,
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let page = app_state
        .recorder
        .list_history(customer_id, &filters, query.page(), query.per_page())
        .await?;
    Ok(Json(page))
}

/// GET /payments/subscriptions/histories
async fn list_subscription_histories(
    State(app_state): State<AppState>,
    AuthenticatedCustomer(customer_id): AuthenticatedCustomer,
    Query(query): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .map(SubscriptionStatus::from_str)
        .transpose()
        .map_err(AppError::InvalidInput)?;

    let filters = SubscriptionListFilters {
        status,
        plan_id: query.plan_id,
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let page = app_state
        .synchronizer
        .list_history(customer_id, &filters, query.page(), query.per_page())
        .await?;
    Ok(Json(page))
}
