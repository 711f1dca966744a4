use std::fs::File;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::http::app_state::AppState,
    application::ports::{
        billing_provider::BillingProviderPort, cache::CacheInvalidator,
        customer_directory::CustomerDirectoryPort, plan_catalog::PlanCatalogPort,
    },
    application::use_cases::{
        checkout::CheckoutOrchestrator,
        identity::{IdentityMapper, IdentityMappingRepo},
        payment_record::{PaymentRecorder, PaymentRepo},
        status_resolver::StatusResolver,
        subscription_sync::{SubscriptionRepo, SubscriptionSynchronizer},
        webhook::WebhookDispatcher,
    },
    infra::{cache::RedisCacheInvalidator, config::AppConfig, postgres_persistence,
        stripe_client::StripeClient},
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let cache =
        Arc::new(RedisCacheInvalidator::new(&config.redis_url).await?) as Arc<dyn CacheInvalidator>;
    let provider = Arc::new(StripeClient::new(config.stripe_secret_key.clone()))
        as Arc<dyn BillingProviderPort>;

    let identity_repo = postgres_arc.clone() as Arc<dyn IdentityMappingRepo>;
    let subscription_repo = postgres_arc.clone() as Arc<dyn SubscriptionRepo>;
    let payment_repo = postgres_arc.clone() as Arc<dyn PaymentRepo>;
    let plans = postgres_arc.clone() as Arc<dyn PlanCatalogPort>;
    let customers = postgres_arc.clone() as Arc<dyn CustomerDirectoryPort>;

    let identities = Arc::new(IdentityMapper::new(identity_repo, cache.clone()));
    let synchronizer = Arc::new(SubscriptionSynchronizer::new(
        subscription_repo.clone(),
        identities.clone(),
        plans.clone(),
        provider.clone(),
        cache.clone(),
    ));
    let recorder = Arc::new(PaymentRecorder::new(
        payment_repo,
        subscription_repo,
        identities.clone(),
        cache,
    ));
    let resolver = Arc::new(StatusResolver::new(
        provider.clone(),
        synchronizer.clone(),
        recorder.clone(),
    ));
    let checkout = Arc::new(CheckoutOrchestrator::new(
        provider.clone(),
        plans,
        customers,
        identities.clone(),
        synchronizer.clone(),
    ));
    let webhooks = Arc::new(WebhookDispatcher::new(
        config.stripe_webhook_secret.clone(),
        provider,
        identities,
        synchronizer.clone(),
        resolver,
    ));

    Ok(AppState {
        config: Arc::new(config),
        checkout,
        synchronizer,
        recorder,
        webhooks,
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bookline_billing=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
