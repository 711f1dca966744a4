//! Translates payment-lifecycle events into subscription status changes and
//! payment records.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        timestamp_to_utc, BillingProviderPort, ProviderInvoice, ProviderPaymentIntent,
    },
    application::use_cases::{
        payment_record::PaymentRecorder,
        subscription_sync::{SubscriptionSynchronizer, SyncOutcome},
    },
    domain::entities::subscription::SubscriptionStatus,
};

pub struct StatusResolver {
    provider: Arc<dyn BillingProviderPort>,
    synchronizer: Arc<SubscriptionSynchronizer>,
    recorder: Arc<PaymentRecorder>,
}

impl StatusResolver {
    pub fn new(
        provider: Arc<dyn BillingProviderPort>,
        synchronizer: Arc<SubscriptionSynchronizer>,
        recorder: Arc<PaymentRecorder>,
    ) -> Self {
        Self {
            provider,
            synchronizer,
            recorder,
        }
    }

    /// A succeeded payment activates the linked subscription, stamps it paid,
    /// and records a paid payment row.
    pub async fn on_payment_intent_succeeded(
        &self,
        intent: &ProviderPaymentIntent,
    ) -> AppResult<()> {
        let link = self.resolve_link(intent).await?;

        if let Some(subscription_id) = link.subscription_id.as_deref() {
            // Resync first: activation usually comes with fresh period dates
            // that the payment event itself does not carry.
            match self.provider.get_subscription(subscription_id).await {
                Ok(data) => {
                    self.synchronizer.upsert_from_provider(&data).await?;
                }
                Err(AppError::NotFound) => {
                    debug!(subscription_id, "Provider no longer has the paid subscription");
                }
                Err(e) => return Err(e),
            }

            let outcome = self
                .synchronizer
                .update_status_only(subscription_id, SubscriptionStatus::Active)
                .await?;

            if let SyncOutcome::Applied(_) = outcome {
                let paid_at = intent
                    .created
                    .and_then(timestamp_to_utc)
                    .unwrap_or_else(Utc::now);
                self.synchronizer
                    .mark_paid(subscription_id, paid_at, intent.invoice.as_deref())
                    .await?;
            }
        } else {
            debug!(
                payment_intent_id = %intent.id,
                "Succeeded payment intent has no resolvable subscription"
            );
        }

        self.recorder
            .record(
                intent,
                SubscriptionStatus::Active,
                link.subscription_id.as_deref(),
                link.customer_id.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// A failed payment pushes the linked subscription to incomplete and
    /// records a failed payment row.
    pub async fn on_payment_intent_failed(
        &self,
        intent: &ProviderPaymentIntent,
    ) -> AppResult<()> {
        let link = self.resolve_link(intent).await?;

        if let Some(subscription_id) = link.subscription_id.as_deref() {
            self.synchronizer
                .update_status_only(subscription_id, SubscriptionStatus::Incomplete)
                .await?;
        } else {
            debug!(
                payment_intent_id = %intent.id,
                "Failed payment intent has no resolvable subscription"
            );
        }

        self.recorder
            .record(
                intent,
                SubscriptionStatus::Incomplete,
                link.subscription_id.as_deref(),
                link.customer_id.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// A failed renewal invoice moves the subscription to past-due so the
    /// provider's dunning cycle can recover it.
    pub async fn on_invoice_payment_failed(&self, invoice: &ProviderInvoice) -> AppResult<()> {
        let Some(subscription_id) = invoice.subscription.as_deref() else {
            debug!(invoice_id = %invoice.id, "Failed invoice is not tied to a subscription");
            return Ok(());
        };

        self.synchronizer
            .update_status_only(subscription_id, SubscriptionStatus::PastDue)
            .await?;
        Ok(())
    }

    /// Reaffirms trialing before the provider flips the subscription over,
    /// covering rows created while the trial state was still in flight.
    pub async fn on_trial_will_end(&self, subscription_id: &str) -> AppResult<()> {
        let outcome = self
            .synchronizer
            .update_status_only(subscription_id, SubscriptionStatus::Trialing)
            .await?;
        if outcome.is_skipped() {
            warn!(subscription_id, "Trial-ending notice for an unsyncable subscription");
        }
        Ok(())
    }

    /// Payment intents do not reference subscriptions directly. The invoice
    /// they settle does, so it is fetched when present; intents created
    /// outside the invoice cycle fall back to checkout metadata.
    async fn resolve_link(&self, intent: &ProviderPaymentIntent) -> AppResult<IntentLink> {
        if let Some(invoice_id) = intent.invoice.as_deref() {
            let invoice = self.provider.get_invoice(invoice_id).await?;
            return Ok(IntentLink {
                subscription_id: invoice.subscription,
                customer_id: invoice.customer,
            });
        }

        Ok(IntentLink {
            subscription_id: intent.metadata.get("subscription_id").cloned(),
            customer_id: None,
        })
    }
}

struct IntentLink {
    subscription_id: Option<String>,
    customer_id: Option<String>,
}
