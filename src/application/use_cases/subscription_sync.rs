//! Upserts and repairs local subscription state from provider subscription
//! objects.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_provider::{timestamp_to_utc, BillingProviderPort, ProviderSubscription},
        cache::CacheInvalidator,
        plan_catalog::PlanCatalogPort,
    },
    application::use_cases::identity::IdentityMapper,
    domain::entities::subscription::{Subscription, SubscriptionStatus},
};

// ============================================================================
// Sync Outcomes
// ============================================================================

/// Why a webhook-driven write was skipped. Skips are acknowledged to the
/// provider, never retried: the conditions behind them do not change on
/// redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// No identity mapping for the provider customer; the event arrived
    /// before checkout completion linked the identities.
    UnlinkedIdentity,
    /// No plan in the catalog matches the subscription's price id.
    MissingPlanMapping,
    /// No local subscription row and the provider resync could not produce
    /// one either.
    MissingSubscription,
}

/// Typed replacement for the log-and-drop pattern: callers decide explicitly
/// whether to acknowledge (`Skipped`) or let a hard error propagate for the
/// provider's retry mechanism.
#[derive(Debug)]
pub enum SyncOutcome<T> {
    Applied(T),
    Skipped(SkipReason),
}

impl<T> SyncOutcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            SyncOutcome::Applied(value) => Some(value),
            SyncOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped(_))
    }
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Debug, Clone)]
pub struct UpsertSubscriptionInput {
    pub external_subscription_id: String,
    pub plan_id: Uuid,
    pub customer_id: Uuid,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub latest_invoice_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionListFilters {
    pub status: Option<SubscriptionStatus>,
    pub plan_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedSubscriptions {
    pub subscriptions: Vec<Subscription>,
    pub total: i64,
    pub page: i32,
    pub per_page: i32,
    pub total_pages: i32,
}

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> AppResult<Option<Subscription>>;

    /// The subscription in a non-terminal status for this customer, if any.
    async fn find_current_by_customer(&self, customer_id: Uuid)
        -> AppResult<Option<Subscription>>;

    /// Insert-or-update keyed by the external subscription id.
    async fn upsert_by_external_id(
        &self,
        input: &UpsertSubscriptionInput,
    ) -> AppResult<Subscription>;

    /// Partial status update. Returns None when no row matches.
    async fn update_status(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> AppResult<Option<Subscription>>;

    /// Stamp a successful payment onto the subscription.
    async fn mark_paid(
        &self,
        external_subscription_id: &str,
        paid_at: DateTime<Utc>,
        latest_invoice_id: Option<&str>,
    ) -> AppResult<()>;

    /// Hard delete. Returns false when no row matched.
    async fn delete_by_external_id(&self, external_subscription_id: &str) -> AppResult<bool>;

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        filters: &SubscriptionListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedSubscriptions>;
}

// ============================================================================
// Synchronizer
// ============================================================================

pub struct SubscriptionSynchronizer {
    subscriptions: Arc<dyn SubscriptionRepo>,
    identities: Arc<IdentityMapper>,
    plans: Arc<dyn PlanCatalogPort>,
    provider: Arc<dyn BillingProviderPort>,
    cache: Arc<dyn CacheInvalidator>,
}

impl SubscriptionSynchronizer {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepo>,
        identities: Arc<IdentityMapper>,
        plans: Arc<dyn PlanCatalogPort>,
        provider: Arc<dyn BillingProviderPort>,
        cache: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            subscriptions,
            identities,
            plans,
            provider,
            cache,
        }
    }

    /// Map a provider subscription object into the local row keyed by its
    /// external id. Missing plan or identity mappings skip the write rather
    /// than persisting a dangling row.
    pub async fn upsert_from_provider(
        &self,
        data: &ProviderSubscription,
    ) -> AppResult<SyncOutcome<Subscription>> {
        let Some(price_id) = data.price_id() else {
            warn!(
                external_subscription_id = %data.id,
                "Subscription event without a price id, skipping sync"
            );
            return Ok(SyncOutcome::Skipped(SkipReason::MissingPlanMapping));
        };

        let Some(plan) = self.plans.get_by_external_price_id(price_id).await? else {
            warn!(
                external_subscription_id = %data.id,
                price_id,
                "No plan matches the subscription's price id, skipping sync"
            );
            return Ok(SyncOutcome::Skipped(SkipReason::MissingPlanMapping));
        };

        let customer_id = match self
            .identities
            .find_by_external_customer_id(&data.customer)
            .await
        {
            Ok(mapping) => mapping.customer_id,
            Err(AppError::NotFound) => {
                warn!(
                    external_subscription_id = %data.id,
                    external_customer_id = %data.customer,
                    "No identity mapping for the subscription's customer, skipping sync"
                );
                return Ok(SyncOutcome::Skipped(SkipReason::UnlinkedIdentity));
            }
            Err(e) => return Err(e),
        };

        let input = UpsertSubscriptionInput {
            external_subscription_id: data.id.clone(),
            plan_id: plan.id,
            customer_id,
            status: SubscriptionStatus::from_provider(&data.status),
            current_period_start: data.current_period_start.and_then(timestamp_to_utc),
            current_period_end: data.current_period_end.and_then(timestamp_to_utc),
            trial_start: data.trial_start.and_then(timestamp_to_utc),
            trial_end: data.trial_end.and_then(timestamp_to_utc),
            cancel_at: data.cancel_at.and_then(timestamp_to_utc),
            cancel_at_period_end: data.cancel_at_period_end,
            canceled_at: data.canceled_at.and_then(timestamp_to_utc),
            latest_invoice_id: data.latest_invoice.clone(),
        };

        let subscription = self.subscriptions.upsert_by_external_id(&input).await?;
        self.cache.invalidate("subscriptions").await?;
        Ok(SyncOutcome::Applied(subscription))
    }

    /// Partial status update. When no local row exists, one full resync from
    /// the provider is attempted before giving up.
    pub async fn update_status_only(
        &self,
        external_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> AppResult<SyncOutcome<Subscription>> {
        if let Some(subscription) = self
            .subscriptions
            .update_status(external_subscription_id, status)
            .await?
        {
            self.cache.invalidate("subscriptions").await?;
            return Ok(SyncOutcome::Applied(subscription));
        }

        debug!(
            external_subscription_id,
            "No local subscription row, resyncing from provider before status update"
        );
        let data = self.provider.get_subscription(external_subscription_id).await?;
        if let SyncOutcome::Skipped(reason) = self.upsert_from_provider(&data).await? {
            return Ok(SyncOutcome::Skipped(reason));
        }

        match self
            .subscriptions
            .update_status(external_subscription_id, status)
            .await?
        {
            Some(subscription) => {
                self.cache.invalidate("subscriptions").await?;
                Ok(SyncOutcome::Applied(subscription))
            }
            None => {
                warn!(
                    external_subscription_id,
                    "Status update still has no local row after resync, giving up"
                );
                Ok(SyncOutcome::Skipped(SkipReason::MissingSubscription))
            }
        }
    }

    pub async fn mark_paid(
        &self,
        external_subscription_id: &str,
        paid_at: DateTime<Utc>,
        latest_invoice_id: Option<&str>,
    ) -> AppResult<()> {
        self.subscriptions
            .mark_paid(external_subscription_id, paid_at, latest_invoice_id)
            .await?;
        self.cache.invalidate("subscriptions").await
    }

    /// Hard delete on the provider's deletion event. No-op when absent.
    pub async fn remove_by_external_id(&self, external_subscription_id: &str) -> AppResult<()> {
        let deleted = self
            .subscriptions
            .delete_by_external_id(external_subscription_id)
            .await?;
        if deleted {
            self.cache.invalidate("subscriptions").await?;
        } else {
            debug!(
                external_subscription_id,
                "Deletion event for an unknown subscription, nothing to remove"
            );
        }
        Ok(())
    }

    /// The predicate backing the one-subscription-per-customer invariant.
    pub async fn find_current_by_customer(
        &self,
        customer_id: Uuid,
    ) -> AppResult<Option<Subscription>> {
        self.subscriptions.find_current_by_customer(customer_id).await
    }

    pub async fn list_history(
        &self,
        customer_id: Uuid,
        filters: &SubscriptionListFilters,
        page: i32,
        per_page: i32,
    ) -> AppResult<PaginatedSubscriptions> {
        self.subscriptions
            .list_by_customer(customer_id, filters, page, per_page)
            .await
    }
}
