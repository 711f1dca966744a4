//! Webhook signature verification and event dispatch.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, info};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingProviderPort, ProviderCheckoutSession, ProviderInvoice, ProviderPaymentIntent,
        ProviderSubscription,
    },
    application::use_cases::{
        identity::IdentityMapper, status_resolver::StatusResolver,
        subscription_sync::SubscriptionSynchronizer,
    },
};

/// Maximum accepted age of a signed webhook delivery, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Verify the provider's `t=<unix>,v1=<hex>` signature header against the raw
/// request body. The signed message is `<t>.<body>`.
pub fn verify_signature(
    secret: &SecretString,
    payload: &[u8],
    signature_header: &str,
) -> AppResult<()> {
    verify_signature_at(secret, payload, signature_header, Utc::now().timestamp())
}

fn verify_signature_at(
    secret: &SecretString,
    payload: &[u8],
    signature_header: &str,
    now: i64,
) -> AppResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return Err(AppError::SignatureInvalid);
    };
    if signatures.is_empty() {
        return Err(AppError::SignatureInvalid);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::SignatureInvalid);
    }

    let mut signed = timestamp.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload);

    // Mac::verify_slice is constant-time.
    let verified = signatures.iter().any(|candidate| {
        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(&signed);
        mac.verify_slice(candidate).is_ok()
    });

    if verified {
        Ok(())
    } else {
        Err(AppError::SignatureInvalid)
    }
}

/// The event types this service reacts to. Everything else is acknowledged
/// and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString)]
pub enum WebhookEventKind {
    #[strum(serialize = "checkout.session.completed")]
    CheckoutSessionCompleted,
    #[strum(serialize = "customer.subscription.created")]
    SubscriptionCreated,
    #[strum(serialize = "customer.subscription.updated")]
    SubscriptionUpdated,
    #[strum(serialize = "customer.subscription.deleted")]
    SubscriptionDeleted,
    #[strum(serialize = "customer.subscription.trial_will_end")]
    SubscriptionTrialWillEnd,
    #[strum(serialize = "payment_intent.succeeded")]
    PaymentIntentSucceeded,
    #[strum(serialize = "payment_intent.payment_failed")]
    PaymentIntentFailed,
    #[strum(serialize = "invoice.payment_failed")]
    InvoicePaymentFailed,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
struct WebhookEventData {
    object: serde_json::Value,
}

pub struct WebhookDispatcher {
    webhook_secret: SecretString,
    provider: Arc<dyn BillingProviderPort>,
    identities: Arc<IdentityMapper>,
    synchronizer: Arc<SubscriptionSynchronizer>,
    resolver: Arc<StatusResolver>,
}

impl WebhookDispatcher {
    pub fn new(
        webhook_secret: SecretString,
        provider: Arc<dyn BillingProviderPort>,
        identities: Arc<IdentityMapper>,
        synchronizer: Arc<SubscriptionSynchronizer>,
        resolver: Arc<StatusResolver>,
    ) -> Self {
        Self {
            webhook_secret,
            provider,
            identities,
            synchronizer,
            resolver,
        }
    }

    /// Verify and route one delivery. An `Ok` return acknowledges the event;
    /// errors bubble up as 5xx responses so the provider redelivers.
    pub async fn dispatch(&self, payload: &[u8], signature_header: &str) -> AppResult<()> {
        verify_signature(&self.webhook_secret, payload, signature_header)?;

        let event: WebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed webhook payload: {e}")))?;

        let Ok(kind) = WebhookEventKind::from_str(&event.event_type) else {
            debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
            return Ok(());
        };
        info!(event_id = %event.id, event_type = %event.event_type, "Processing webhook event");

        match kind {
            WebhookEventKind::CheckoutSessionCompleted => {
                let session: ProviderCheckoutSession = parse_object(event.data.object)?;
                self.on_checkout_completed(&session).await
            }
            WebhookEventKind::SubscriptionCreated | WebhookEventKind::SubscriptionUpdated => {
                let subscription: ProviderSubscription = parse_object(event.data.object)?;
                self.synchronizer.upsert_from_provider(&subscription).await?;
                Ok(())
            }
            WebhookEventKind::SubscriptionDeleted => {
                let subscription: ProviderSubscription = parse_object(event.data.object)?;
                self.synchronizer.remove_by_external_id(&subscription.id).await
            }
            WebhookEventKind::SubscriptionTrialWillEnd => {
                let subscription: ProviderSubscription = parse_object(event.data.object)?;
                self.resolver.on_trial_will_end(&subscription.id).await
            }
            WebhookEventKind::PaymentIntentSucceeded => {
                let intent: ProviderPaymentIntent = parse_object(event.data.object)?;
                self.resolver.on_payment_intent_succeeded(&intent).await
            }
            WebhookEventKind::PaymentIntentFailed => {
                let intent: ProviderPaymentIntent = parse_object(event.data.object)?;
                self.resolver.on_payment_intent_failed(&intent).await
            }
            WebhookEventKind::InvoicePaymentFailed => {
                let invoice: ProviderInvoice = parse_object(event.data.object)?;
                self.resolver.on_invoice_payment_failed(&invoice).await
            }
        }
    }

    /// Checkout completion is where the identity link is established: the
    /// session carries our customer id outbound and the provider's customer
    /// id inbound. The subscription is synced right away instead of waiting
    /// for its own event, which may already have arrived and been skipped.
    async fn on_checkout_completed(&self, session: &ProviderCheckoutSession) -> AppResult<()> {
        let Some(external_customer_id) = session.customer.as_deref() else {
            debug!(session_id = %session.id, "Completed session has no provider customer");
            return Ok(());
        };

        let local_id = session
            .client_reference_id
            .as_deref()
            .or_else(|| session.metadata.get("customer_id").map(String::as_str))
            .and_then(|raw| uuid::Uuid::parse_str(raw).ok());
        let Some(customer_id) = local_id else {
            debug!(session_id = %session.id, "Completed session carries no local customer id");
            return Ok(());
        };

        self.identities.upsert(external_customer_id, customer_id).await?;

        if let Some(subscription_id) = session.subscription.as_deref() {
            let subscription = self.provider.get_subscription(subscription_id).await?;
            self.synchronizer.upsert_from_provider(&subscription).await?;
        }
        Ok(())
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(object: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(object)
        .map_err(|e| AppError::InvalidInput(format!("Malformed event object: {e}")))
}
