//! Builder assembling a fully wired [`AppState`] over in-memory doubles, for
//! route-level tests with `axum_test::TestServer`.

use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::SecretString;
use serde::Serialize;
use uuid::Uuid;

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
    domain::entities::{customer::Customer, plan::Plan},
    infra::config::AppConfig,
    test_utils::{
        FakeBillingProvider, InMemoryCustomerDirectory, InMemoryIdentityMappingRepo,
        InMemoryPaymentRepo, InMemoryPlanCatalog, InMemorySubscriptionRepo, NoopCacheInvalidator,
    },
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

/// Bearer token that passes the auth extractor when the state was built with
/// [`TestAppStateBuilder`].
pub fn auth_token(customer_id: Uuid) -> String {
    let claims = TestClaims {
        sub: customer_id.to_string(),
        exp: Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("HS256 signing cannot fail with a valid secret")
}

/// A wired application state plus handles on the underlying doubles, so tests
/// can seed and inspect them directly.
pub struct TestApp {
    pub state: AppState,
    pub subscriptions: Arc<InMemorySubscriptionRepo>,
    pub payments: Arc<InMemoryPaymentRepo>,
    pub mappings: Arc<InMemoryIdentityMappingRepo>,
    pub provider: Arc<FakeBillingProvider>,
    pub synchronizer: Arc<SubscriptionSynchronizer>,
}

#[derive(Default)]
pub struct TestAppStateBuilder {
    plans: Vec<Plan>,
    customers: Vec<Customer>,
    mappings: Vec<(String, Uuid)>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plans.push(plan);
        self
    }

    pub fn with_customer(mut self, customer: Customer) -> Self {
        self.customers.push(customer);
        self
    }

    pub fn with_mapping(mut self, external_customer_id: &str, customer_id: Uuid) -> Self {
        self.mappings
            .push((external_customer_id.to_string(), customer_id));
        self
    }

    pub fn build(self) -> TestApp {
        let subscriptions = Arc::new(InMemorySubscriptionRepo::new());
        let payments = Arc::new(InMemoryPaymentRepo::new());
        let mappings = Arc::new(InMemoryIdentityMappingRepo::new());
        for (external, local) in &self.mappings {
            mappings.insert(external, *local);
        }
        let provider = Arc::new(FakeBillingProvider::new());

        let plans = Arc::new(InMemoryPlanCatalog::with_plans(self.plans))
            as Arc<dyn PlanCatalogPort>;
        let customers = Arc::new(InMemoryCustomerDirectory::with_customers(self.customers))
            as Arc<dyn CustomerDirectoryPort>;
        let cache = Arc::new(NoopCacheInvalidator) as Arc<dyn CacheInvalidator>;

        let identities = Arc::new(IdentityMapper::new(
            mappings.clone() as Arc<dyn IdentityMappingRepo>,
            cache.clone(),
        ));
        let synchronizer = Arc::new(SubscriptionSynchronizer::new(
            subscriptions.clone() as Arc<dyn SubscriptionRepo>,
            identities.clone(),
            plans.clone(),
            provider.clone() as Arc<dyn BillingProviderPort>,
            cache.clone(),
        ));
        let recorder = Arc::new(PaymentRecorder::new(
            payments.clone() as Arc<dyn PaymentRepo>,
            subscriptions.clone() as Arc<dyn SubscriptionRepo>,
            identities.clone(),
            cache,
        ));
        let resolver = Arc::new(StatusResolver::new(
            provider.clone() as Arc<dyn BillingProviderPort>,
            synchronizer.clone(),
            recorder.clone(),
        ));
        let checkout = Arc::new(CheckoutOrchestrator::new(
            provider.clone() as Arc<dyn BillingProviderPort>,
            plans,
            customers,
            identities.clone(),
            synchronizer.clone(),
        ));
        let webhooks = Arc::new(WebhookDispatcher::new(
            SecretString::new(TEST_WEBHOOK_SECRET.into()),
            provider.clone() as Arc<dyn BillingProviderPort>,
            identities,
            synchronizer.clone(),
            resolver,
        ));

        let config = AppConfig {
            jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
            stripe_secret_key: SecretString::new("sk_test_dummy".into()),
            stripe_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            bind_addr: "127.0.0.1:0".parse().expect("valid test bind addr"),
            database_url: "postgres://unused".to_string(),
            redis_url: "redis://unused".to_string(),
        };

        let state = AppState {
            config: Arc::new(config),
            checkout,
            synchronizer: synchronizer.clone(),
            recorder,
            webhooks,
        };

        TestApp {
            state,
            subscriptions,
            payments,
            mappings,
            provider,
            synchronizer,
        }
    }
}
