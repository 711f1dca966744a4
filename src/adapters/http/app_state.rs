use std::sync::Arc;

use crate::{
    application::use_cases::{
        checkout::CheckoutOrchestrator, payment_record::PaymentRecorder,
        subscription_sync::SubscriptionSynchronizer, webhook::WebhookDispatcher,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub synchronizer: Arc<SubscriptionSynchronizer>,
    pub recorder: Arc<PaymentRecorder>,
    pub webhooks: Arc<WebhookDispatcher>,
}
