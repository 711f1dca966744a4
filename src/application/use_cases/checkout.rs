//! Hosted-checkout session creation and retrieval.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_provider::{BillingProviderPort, CreateSessionParams},
        customer_directory::CustomerDirectoryPort,
        plan_catalog::PlanCatalogPort,
    },
    application::use_cases::{identity::IdentityMapper, subscription_sync::SubscriptionSynchronizer},
};

/// One async mutex per customer id, so the no-active-subscription check and
/// the session creation behind it run as a unit. Entries are never reclaimed;
/// the map grows with the number of customers that ever started a checkout in
/// this process.
#[derive(Default)]
pub struct CustomerLocks {
    inner: std::sync::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, customer_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(customer_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionCreated {
    pub session_id: String,
    pub url: String,
    pub trial_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionView {
    pub session_id: String,
    pub status: Option<String>,
    pub subscription_id: Option<String>,
}

pub struct CheckoutOrchestrator {
    provider: Arc<dyn BillingProviderPort>,
    plans: Arc<dyn PlanCatalogPort>,
    customers: Arc<dyn CustomerDirectoryPort>,
    identities: Arc<IdentityMapper>,
    synchronizer: Arc<SubscriptionSynchronizer>,
    locks: CustomerLocks,
}

impl CheckoutOrchestrator {
    pub fn new(
        provider: Arc<dyn BillingProviderPort>,
        plans: Arc<dyn PlanCatalogPort>,
        customers: Arc<dyn CustomerDirectoryPort>,
        identities: Arc<IdentityMapper>,
        synchronizer: Arc<SubscriptionSynchronizer>,
    ) -> Self {
        Self {
            provider,
            plans,
            customers,
            identities,
            synchronizer,
            locks: CustomerLocks::new(),
        }
    }

    /// Create a hosted checkout session for the customer and plan. Fails with
    /// a conflict while the customer still has a non-terminal subscription.
    pub async fn start_checkout(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        success_url: &str,
        cancel_url: &str,
    ) -> AppResult<CheckoutSessionCreated> {
        validate_redirect_url(success_url)?;
        validate_redirect_url(cancel_url)?;

        let customer = self
            .customers
            .get_by_id(customer_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let plan = self.plans.get_by_id(plan_id).await?.ok_or(AppError::NotFound)?;

        // Serializes with other checkouts for the same customer so the
        // active-subscription check cannot race a concurrent session creation.
        let _guard = self.locks.acquire(customer_id).await;

        if self
            .synchronizer
            .find_current_by_customer(customer_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Customer already has an active subscription".to_string(),
            ));
        }

        // Reuse the provider customer when the identities are already linked,
        // otherwise let the provider create one from the email.
        let (provider_customer, customer_email) =
            match self.identities.find_by_customer_id(customer_id).await {
                Ok(mapping) => (Some(mapping.external_customer_id), None),
                Err(AppError::NotFound) => (None, Some(customer.email.clone())),
                Err(e) => return Err(e),
            };

        let mut metadata = HashMap::new();
        metadata.insert("customer_id".to_string(), customer_id.to_string());
        metadata.insert("plan_id".to_string(), plan_id.to_string());

        let trial_days = (plan.trial_period_days > 0).then_some(plan.trial_period_days);

        let params = CreateSessionParams {
            customer: provider_customer,
            customer_email,
            price_id: plan.external_price_id.clone(),
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            client_reference_id: customer_id.to_string(),
            metadata,
            trial_period_days: trial_days,
        };

        let session = self.provider.create_checkout_session(&params).await?;
        let url = session.url.ok_or_else(|| {
            AppError::Internal("Provider returned a checkout session without a URL".to_string())
        })?;

        info!(
            %customer_id,
            %plan_id,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CheckoutSessionCreated {
            session_id: session.id,
            url,
            trial_days,
        })
    }

    /// Retrieve a checkout session, enforcing that it belongs to the caller.
    pub async fn get_checkout_session(
        &self,
        customer_id: Uuid,
        session_id: &str,
    ) -> AppResult<CheckoutSessionView> {
        let session = self.provider.get_checkout_session(session_id).await?;

        let owner = session
            .client_reference_id
            .as_deref()
            .or_else(|| session.metadata.get("customer_id").map(String::as_str));
        if owner != Some(customer_id.to_string().as_str()) {
            return Err(AppError::Forbidden);
        }

        Ok(CheckoutSessionView {
            session_id: session.id,
            status: session.status,
            subscription_id: session.subscription,
        })
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &CustomerLocks {
        &self.locks
    }
}

fn validate_redirect_url(raw: &str) -> AppResult<()> {
    let parsed =
        Url::parse(raw).map_err(|_| AppError::InvalidInput(format!("Invalid URL: {raw}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(AppError::InvalidInput(format!(
            "Unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }
    Ok(())
}
