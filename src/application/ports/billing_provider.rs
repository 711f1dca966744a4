use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::app_error::AppResult;

// ============================================================================
// Provider Wire Types
// ============================================================================

/// Checkout session as returned by the provider's session APIs and carried in
/// `checkout.session.completed` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub status: Option<String>,
}

/// Provider subscription object, carried in `customer.subscription.*` events
/// and returned by subscription retrieval.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub trial_start: Option<i64>,
    pub trial_end: Option<i64>,
    pub cancel_at: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<i64>,
    pub latest_invoice: Option<String>,
    pub items: ProviderSubscriptionItems,
}

impl ProviderSubscription {
    /// First price id from the subscription items. Subscriptions created by
    /// this service always have exactly one item.
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .map(|item| item.price.id.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSubscriptionItems {
    #[serde(default)]
    pub data: Vec<ProviderSubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscriptionItem {
    pub id: String,
    pub price: ProviderPrice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPrice {
    pub id: String,
}

/// Payment-intent object carried in `payment_intent.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPaymentIntent {
    pub id: String,
    pub customer: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub invoice: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created: Option<i64>,
}

/// Invoice object, retrieved when a payment intent references one and carried
/// in `invoice.payment_failed` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderInvoice {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub status: Option<String>,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub currency: String,
}

/// Parameters for creating a checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    /// Existing provider customer id, when an identity mapping exists.
    pub customer: Option<String>,
    /// Customer email, supplied when no provider customer is known yet.
    pub customer_email: Option<String>,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: String,
    pub metadata: HashMap<String, String>,
    pub trial_period_days: Option<i32>,
}

// ============================================================================
// Billing Provider Port
// ============================================================================

/// Abstracts the external payment provider's synchronous APIs. The concrete
/// client is injected into each component; there is no ambient singleton.
#[async_trait]
pub trait BillingProviderPort: Send + Sync {
    /// Create a hosted checkout session for a subscription purchase.
    async fn create_checkout_session(
        &self,
        params: &CreateSessionParams,
    ) -> AppResult<ProviderCheckoutSession>;

    /// Retrieve an existing checkout session by id.
    async fn get_checkout_session(&self, session_id: &str) -> AppResult<ProviderCheckoutSession>;

    /// Retrieve a subscription by id, used for full resyncs.
    async fn get_subscription(&self, subscription_id: &str) -> AppResult<ProviderSubscription>;

    /// Retrieve an invoice by id, used to link payment intents to
    /// subscriptions.
    async fn get_invoice(&self, invoice_id: &str) -> AppResult<ProviderInvoice>;
}

/// Convert a provider Unix timestamp to a UTC datetime.
pub fn timestamp_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}
