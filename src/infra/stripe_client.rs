//! Stripe REST client implementing the billing provider port.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_provider::{
        BillingProviderPort, CreateSessionParams, ProviderCheckoutSession, ProviderInvoice,
        ProviderSubscription,
    },
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> AppResult<T> {
        let response = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(AppError::NotFound);
            }
            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::InvalidInput(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::Internal(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Internal(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

#[async_trait]
impl BillingProviderPort for StripeClient {
    async fn create_checkout_session(
        &self,
        params: &CreateSessionParams,
    ) -> AppResult<ProviderCheckoutSession> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), params.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), params.success_url.clone()),
            ("cancel_url".to_string(), params.cancel_url.clone()),
            (
                "client_reference_id".to_string(),
                params.client_reference_id.clone(),
            ),
        ];

        if let Some(customer) = &params.customer {
            form.push(("customer".to_string(), customer.clone()));
        } else if let Some(email) = &params.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }

        for (key, value) in &params.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
            // The subscription created from the session carries the same
            // metadata so payment events can be linked back.
            form.push((format!("subscription_data[metadata][{}]", key), value.clone()));
        }

        if let Some(trial_days) = params.trial_period_days {
            form.push((
                "subscription_data[trial_period_days]".to_string(),
                trial_days.to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .header("Authorization", self.auth_header())
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    async fn get_checkout_session(&self, session_id: &str) -> AppResult<ProviderCheckoutSession> {
        self.get_json(&format!("/checkout/sessions/{}", session_id))
            .await
    }

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<ProviderSubscription> {
        self.get_json(&format!("/subscriptions/{}", subscription_id))
            .await
    }

    async fn get_invoice(&self, invoice_id: &str) -> AppResult<ProviderInvoice> {
        self.get_json(&format!("/invoices/{}", invoice_id)).await
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}
