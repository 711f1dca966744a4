//! Records payment rows from provider payment-intent objects.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_provider::{timestamp_to_utc, ProviderPaymentIntent},
        cache::CacheInvalidator,
    },
    application::use_cases::{
        identity::IdentityMapper,
        subscription_sync::{SkipReason, SubscriptionRepo, SyncOutcome},
    },
    domain::entities::{
        payment::{Payment, PaymentStatus},
        subscription::SubscriptionStatus,
    },
};

/// Local payment status derived from the intent status and the subscription
/// status the event is driving towards. Payment events for an activating
/// subscription count as paid even when the intent status string is
/// unrecognized.
pub fn derive_payment_status(
    intent_status: &str,
    target: SubscriptionStatus,
) -> PaymentStatus {
    if intent_status == "succeeded" || target == SubscriptionStatus::Active {
        PaymentStatus::Paid
    } else if target == SubscriptionStatus::Incomplete
        || intent_status == "requires_payment_method"
    {
        PaymentStatus::Failed
    } else {
        PaymentStatus::Pending
    }
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Debug, Clone)]
pub struct UpsertPaymentInput {
    pub external_payment_intent_id: String,
    pub external_invoice_id: Option<String>,
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentListFilters {
    pub status: Option<PaymentStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedPayments {
    pub payments: Vec<Payment>,
    pub total: i64,
    pub page: i32,
    pub per_page: i32,
    pub total_pages: i32,
}

#[async_trait]
pub trait PaymentRepo: Send + Sync {
    async fn get_by_intent_id(
        &self,
        external_payment_intent_id: &str,
    ) -> AppResult<Option<Payment>>;

    /// Insert-or-update keyed by the external payment intent id.
    async fn upsert_by_intent_id(&self, input: &UpsertPaymentInput) -> AppResult<Payment>;

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        filters: &PaymentListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedPayments>;
}

// ============================================================================
// Recorder
// ============================================================================

pub struct PaymentRecorder {
    payments: Arc<dyn PaymentRepo>,
    subscriptions: Arc<dyn SubscriptionRepo>,
    identities: Arc<IdentityMapper>,
    cache: Arc<dyn CacheInvalidator>,
}

impl PaymentRecorder {
    pub fn new(
        payments: Arc<dyn PaymentRepo>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        identities: Arc<IdentityMapper>,
        cache: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            payments,
            subscriptions,
            identities,
            cache,
        }
    }

    /// Upsert the payment row for this intent, keyed by the intent id so a
    /// redelivered event rewrites the same row. `external_customer_id` is the
    /// fallback when the intent itself carries no customer.
    pub async fn record(
        &self,
        intent: &ProviderPaymentIntent,
        target: SubscriptionStatus,
        external_subscription_id: Option<&str>,
        external_customer_id: Option<&str>,
    ) -> AppResult<SyncOutcome<Payment>> {
        let Some(provider_customer) = intent
            .customer
            .as_deref()
            .or(external_customer_id)
        else {
            warn!(
                payment_intent_id = %intent.id,
                "Payment intent carries no customer, skipping payment record"
            );
            return Ok(SyncOutcome::Skipped(SkipReason::UnlinkedIdentity));
        };

        let customer_id = match self
            .identities
            .find_by_external_customer_id(provider_customer)
            .await
        {
            Ok(mapping) => mapping.customer_id,
            Err(AppError::NotFound) => {
                warn!(
                    payment_intent_id = %intent.id,
                    external_customer_id = provider_customer,
                    "No identity mapping for the payment's customer, skipping payment record"
                );
                return Ok(SyncOutcome::Skipped(SkipReason::UnlinkedIdentity));
            }
            Err(e) => return Err(e),
        };

        // Link to the local subscription row when one exists. Payments are
        // still recorded without one.
        let subscription_id = match external_subscription_id {
            Some(external_id) => self
                .subscriptions
                .get_by_external_id(external_id)
                .await?
                .map(|s| s.id),
            None => None,
        };

        let status = derive_payment_status(&intent.status, target);
        let paid_at = match status {
            PaymentStatus::Paid => Some(
                intent
                    .created
                    .and_then(timestamp_to_utc)
                    .unwrap_or_else(Utc::now),
            ),
            _ => None,
        };

        let input = UpsertPaymentInput {
            external_payment_intent_id: intent.id.clone(),
            external_invoice_id: intent.invoice.clone(),
            customer_id,
            subscription_id,
            amount_cents: intent.amount,
            currency: intent.currency.clone(),
            status,
            paid_at,
        };

        let payment = self.payments.upsert_by_intent_id(&input).await?;
        self.cache.invalidate("payments").await?;
        Ok(SyncOutcome::Applied(payment))
    }

    pub async fn list_history(
        &self,
        customer_id: Uuid,
        filters: &PaymentListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedPayments> {
        self.payments
            .list_by_customer(customer_id, filters, page, per_page)
            .await
    }
}
