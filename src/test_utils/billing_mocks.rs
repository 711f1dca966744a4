//! In-memory billing mocks: subscription and payment repositories plus a
//! scriptable fake provider.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingProviderPort, CreateSessionParams, ProviderCheckoutSession, ProviderInvoice,
        ProviderSubscription,
    },
    application::use_cases::{
        payment_record::{PaginatedPayments, PaymentListFilters, PaymentRepo, UpsertPaymentInput},
        subscription_sync::{
            PaginatedSubscriptions, SubscriptionListFilters, SubscriptionRepo,
            UpsertSubscriptionInput,
        },
    },
    domain::entities::{
        payment::Payment,
        subscription::{Subscription, SubscriptionStatus},
    },
};

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

/// Subscriptions keyed by external subscription id.
#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    rows: Mutex<HashMap<String, Subscription>>,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn get_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(external_subscription_id)
            .cloned())
    }

    async fn find_current_by_customer(
        &self,
        customer_id: Uuid,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.customer_id == customer_id && !s.status.is_terminal())
            .cloned())
    }

    async fn upsert_by_external_id(
        &self,
        input: &UpsertSubscriptionInput,
    ) -> AppResult<Subscription> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();

        let subscription = match rows.get(&input.external_subscription_id) {
            Some(existing) => Subscription {
                id: existing.id,
                external_subscription_id: input.external_subscription_id.clone(),
                plan_id: input.plan_id,
                customer_id: input.customer_id,
                status: input.status,
                current_period_start: input.current_period_start,
                current_period_end: input.current_period_end,
                trial_start: input.trial_start,
                trial_end: input.trial_end,
                cancel_at: input.cancel_at,
                cancel_at_period_end: input.cancel_at_period_end,
                canceled_at: input.canceled_at,
                paid_at: existing.paid_at,
                latest_invoice_id: input
                    .latest_invoice_id
                    .clone()
                    .or_else(|| existing.latest_invoice_id.clone()),
                created_at: existing.created_at,
                updated_at: Some(now),
            },
            None => Subscription {
                id: Uuid::new_v4(),
                external_subscription_id: input.external_subscription_id.clone(),
                plan_id: input.plan_id,
                customer_id: input.customer_id,
                status: input.status,
                current_period_start: input.current_period_start,
                current_period_end: input.current_period_end,
                trial_start: input.trial_start,
                trial_end: input.trial_end,
                cancel_at: input.cancel_at,
                cancel_at_period_end: input.cancel_at_period_end,
                canceled_at: input.canceled_at,
                paid_at: None,
                latest_invoice_id: input.latest_invoice_id.clone(),
                created_at: Some(now),
                updated_at: Some(now),
            },
        };

        rows.insert(
            input.external_subscription_id.clone(),
            subscription.clone(),
        );
        Ok(subscription)
    }

    async fn update_status(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> AppResult<Option<Subscription>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(external_subscription_id).map(|s| {
            s.status = status;
            s.updated_at = Some(Utc::now());
            s.clone()
        }))
    }

    async fn mark_paid(
        &self,
        external_subscription_id: &str,
        paid_at: chrono::DateTime<Utc>,
        latest_invoice_id: Option<&str>,
    ) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(s) = rows.get_mut(external_subscription_id) {
            s.paid_at = Some(paid_at);
            if let Some(invoice_id) = latest_invoice_id {
                s.latest_invoice_id = Some(invoice_id.to_string());
            }
            s.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete_by_external_id(&self, external_subscription_id: &str) -> AppResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .remove(external_subscription_id)
            .is_some())
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        filters: &SubscriptionListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedSubscriptions> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Subscription> = rows
            .values()
            .filter(|s| s.customer_id == customer_id)
            .filter(|s| filters.status.is_none_or(|wanted| s.status == wanted))
            .filter(|s| filters.plan_id.is_none_or(|wanted| s.plan_id == wanted))
            .filter(|s| {
                filters
                    .date_from
                    .is_none_or(|from| s.created_at.is_some_and(|c| c >= from))
            })
            .filter(|s| {
                filters
                    .date_to
                    .is_none_or(|to| s.created_at.is_some_and(|c| c <= to))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let offset = ((page - 1) * per_page).max(0) as usize;
        let subscriptions = matching
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect();

        Ok(PaginatedSubscriptions {
            subscriptions,
            total,
            page,
            per_page,
            total_pages: total_pages(total, per_page),
        })
    }
}

// ============================================================================
// InMemoryPaymentRepo
// ============================================================================

/// Payments keyed by external payment intent id.
#[derive(Default)]
pub struct InMemoryPaymentRepo {
    rows: Mutex<HashMap<String, Payment>>,
}

impl InMemoryPaymentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PaymentRepo for InMemoryPaymentRepo {
    async fn get_by_intent_id(
        &self,
        external_payment_intent_id: &str,
    ) -> AppResult<Option<Payment>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(external_payment_intent_id)
            .cloned())
    }

    async fn upsert_by_intent_id(&self, input: &UpsertPaymentInput) -> AppResult<Payment> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        let (id, created_at) = match rows.get(&input.external_payment_intent_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), Some(now)),
        };

        let payment = Payment {
            id,
            external_payment_intent_id: input.external_payment_intent_id.clone(),
            external_invoice_id: input.external_invoice_id.clone(),
            customer_id: input.customer_id,
            subscription_id: input.subscription_id,
            amount_cents: input.amount_cents,
            currency: input.currency.clone(),
            status: input.status,
            paid_at: input.paid_at,
            created_at,
            updated_at: Some(now),
        };

        rows.insert(input.external_payment_intent_id.clone(), payment.clone());
        Ok(payment)
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        filters: &PaymentListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedPayments> {
        let rows = self.rows.lock().unwrap();
        let mut matching: Vec<Payment> = rows
            .values()
            .filter(|p| p.customer_id == customer_id)
            .filter(|p| filters.status.is_none_or(|wanted| p.status == wanted))
            .filter(|p| {
                filters
                    .date_from
                    .is_none_or(|from| p.created_at.is_some_and(|c| c >= from))
            })
            .filter(|p| {
                filters
                    .date_to
                    .is_none_or(|to| p.created_at.is_some_and(|c| c <= to))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let offset = ((page - 1) * per_page).max(0) as usize;
        let payments = matching
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .collect();

        Ok(PaginatedPayments {
            payments,
            total,
            page,
            per_page,
            total_pages: total_pages(total, per_page),
        })
    }
}

fn total_pages(total: i64, per_page: i32) -> i32 {
    if per_page <= 0 {
        return 0;
    }
    ((total + per_page as i64 - 1) / per_page as i64) as i32
}

// ============================================================================
// FakeBillingProvider
// ============================================================================

/// Scriptable provider double. Retrieval calls read objects registered with
/// the `put_*` methods; session creation records the parameters it was called
/// with and mints a session the way the hosted provider would.
#[derive(Default)]
pub struct FakeBillingProvider {
    sessions: Mutex<HashMap<String, ProviderCheckoutSession>>,
    subscriptions: Mutex<HashMap<String, ProviderSubscription>>,
    invoices: Mutex<HashMap<String, ProviderInvoice>>,
    session_params: Mutex<Vec<CreateSessionParams>>,
    session_counter: Mutex<u32>,
}

impl FakeBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_session(&self, session: ProviderCheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn put_subscription(&self, subscription: ProviderSubscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
    }

    pub fn put_invoice(&self, invoice: ProviderInvoice) {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.id.clone(), invoice);
    }

    /// Parameters of the most recent `create_checkout_session` call.
    pub fn last_session_params(&self) -> Option<CreateSessionParams> {
        self.session_params.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BillingProviderPort for FakeBillingProvider {
    async fn create_checkout_session(
        &self,
        params: &CreateSessionParams,
    ) -> AppResult<ProviderCheckoutSession> {
        self.session_params.lock().unwrap().push(params.clone());

        let n = {
            let mut counter = self.session_counter.lock().unwrap();
            *counter += 1;
            *counter
        };
        let id = format!("cs_test_{n}");
        let session = ProviderCheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.example.com/c/{id}")),
            customer: params.customer.clone(),
            subscription: None,
            client_reference_id: Some(params.client_reference_id.clone()),
            metadata: params.metadata.clone(),
            status: Some("open".to_string()),
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(id, session.clone());
        Ok(session)
    }

    async fn get_checkout_session(&self, session_id: &str) -> AppResult<ProviderCheckoutSession> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<ProviderSubscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<ProviderInvoice> {
        self.invoices
            .lock()
            .unwrap()
            .get(invoice_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }
}
