//! Thin client for the payment provider's checkout/intent REST API
//! (Stripe-compatible: form-encoded bodies, HTTP basic auth with the
//! secret key as username). Pure client — no business logic.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{SurfaceKind, ToSurface};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the payment provider client.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed.
    #[error("payment provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The provider responded with a non-success status.
    #[error("payment provider returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl ToSurface for ProviderError {
    fn surface_kind(&self) -> SurfaceKind {
        SurfaceKind::Unavailable
    }
}

/// A created checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Provider session id.
    pub id: String,
    /// URL the customer is redirected to.
    pub url: String,
    /// Unix timestamp the session expires at.
    pub expires_at: i64,
}

/// A retrieved checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionStatus {
    /// Provider session id.
    pub id: String,
    /// Provider payment status (`"paid"`, `"unpaid"`, `"no_payment_required"`).
    pub payment_status: String,
    /// Session lifecycle status (`"open"`, `"complete"`, `"expired"`).
    pub status: String,
    /// The caller-supplied correlation id, echoed back.
    pub client_reference_id: Option<String>,
    /// The provider's payment intent id, once created.
    pub payment_intent: Option<String>,
}

/// A provider payment intent.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentStatus {
    /// Provider intent id.
    pub id: String,
    /// Provider intent status (`"succeeded"`, `"canceled"`, …).
    pub status: String,
}

/// Parameters for creating a checkout session.
pub struct CreateCheckoutSession<'a> {
    /// Local payment intent id, threaded through as `client_reference_id`.
    pub payment_intent_id: &'a str,
    /// Amount in the currency's smallest unit (e.g. cents).
    pub amount_minor: i64,
    /// ISO 4217 currency code.
    pub currency: &'a str,
    /// Line item / product description.
    pub product_name: &'a str,
    /// Optional customer email to pre-fill.
    pub customer_email: Option<&'a str>,
    /// Session expiry, as a Unix timestamp.
    pub expires_at: i64,
}

/// Client for the payment provider's checkout session and intent APIs.
#[derive(Debug, Clone)]
pub struct PaymentProviderClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    success_url: String,
    cancel_url: String,
}

impl PaymentProviderClient {
    /// Builds a client pointed at `base_url`, authenticating with `api_key`
    /// via HTTP basic auth, with a 30-second request timeout.
    #[must_use]
    pub fn new(base_url: String, api_key: String, success_url: String, cancel_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            api_key,
            client,
            success_url,
            cancel_url,
        }
    }

    /// Creates a checkout session with `client_reference_id` set to the
    /// local `payment_intent_id`, so the webhook receiver can correlate
    /// the eventual event back to this payment.
    ///
    /// # Errors
    ///
    /// Returns a request/status error if the provider rejects the call.
    pub async fn create_checkout_session(
        &self,
        params: CreateCheckoutSession<'_>,
    ) -> Result<CheckoutSession, ProviderError> {
        let mut form = vec![
            ("mode".to_owned(), "payment".to_owned()),
            ("payment_method_types[0]".to_owned(), "card".to_owned()),
            (
                "line_items[0][price_data][currency]".to_owned(),
                params.currency.to_ascii_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_owned(),
                params.amount_minor.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_owned(),
                params.product_name.to_owned(),
            ),
            ("line_items[0][quantity]".to_owned(), "1".to_owned()),
            (
                "success_url".to_owned(),
                format!("{}?session_id={{CHECKOUT_SESSION_ID}}", self.success_url),
            ),
            ("cancel_url".to_owned(), self.cancel_url.clone()),
            (
                "client_reference_id".to_owned(),
                params.payment_intent_id.to_owned(),
            ),
            ("expires_at".to_owned(), params.expires_at.to_string()),
        ];
        if let Some(email) = params.customer_email {
            form.push(("customer_email".to_owned(), email.to_owned()));
        }

        self.post_form("/checkout/sessions", &form).await
    }

    /// Retrieves a checkout session's current status.
    ///
    /// # Errors
    ///
    /// Returns a request/status error if the provider rejects the call.
    pub async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionStatus, ProviderError> {
        self.get(&format!("/checkout/sessions/{session_id}")).await
    }

    /// Retrieves a payment intent's current status.
    ///
    /// # Errors
    ///
    /// Returns a request/status error if the provider rejects the call.
    pub async fn get_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntentStatus, ProviderError> {
        self.get(&format!("/payment_intents/{intent_id}")).await
    }

    /// Best-effort cancellation of a payment intent; returns `Ok(false)`
    /// rather than an error if the provider refuses (e.g. already captured).
    ///
    /// # Errors
    ///
    /// Returns a request error only on connection failure.
    pub async fn cancel_payment_intent(&self, intent_id: &str) -> Result<bool, ProviderError> {
        let response = self
            .client
            .post(format!("{}/payment_intents/{intent_id}/cancel", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(false);
        }
        let status: PaymentIntentStatus = response
            .json()
            .await
            .unwrap_or(PaymentIntentStatus {
                id: intent_id.to_owned(),
                status: "unknown".to_owned(),
            });
        Ok(status.status == "canceled")
    }

    async fn get<R: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<R, ProviderError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_form<R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<R, ProviderError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .form(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<R: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<R, ProviderError> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|e| ProviderError::HttpStatus {
            status: status.as_u16(),
            body: format!("failed to parse payment provider response: {e}"),
        })
    }
}
