//! Payment Orchestrator (C9): the primary state machine. Drives a payment
//! record from `pending` to one of four terminal sinks
//! (`completed`/`failed`/`expired`/`cancelled`), owns the uniqueness-of-
//! activity invariant per `quote_id`, and hands off to the issuance API on
//! completion using the chosen offer recorded by
//! [`PaymentOrchestrator::select_offer`] into [`selection::SelectionStore`].
//! [`webhook`] carries the companion
//! receiver (C10) that also writes `payment_status`, via the same
//! [`store::PaymentStore`]. The orchestrator is the exclusive writer of
//! both Payment and Selection records.

pub mod provider;
pub mod selection;
pub mod store;
pub mod webhook;

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{SurfaceKind, ToSurface};
use crate::quotation::{PurchaseRequest, QuotationClient, QuotationError};

use provider::{CreateCheckoutSession, PaymentProviderClient, ProviderError};
use selection::{SelectionError, SelectionRecord, SelectionStore, CURRENT_SCHEMA_VERSION};
use store::{PaymentRecord, PaymentStatus, PaymentStore, StoreError};

/// Parameters to [`PaymentOrchestrator::initiate`].
pub struct InitiateRequest<'a> {
    /// Owning user.
    pub user_id: &'a str,
    /// Quote being purchased.
    pub quote_id: &'a str,
    /// Amount in the currency's smallest unit (e.g. cents).
    pub amount: i64,
    /// ISO 4217 currency code.
    pub currency: &'a str,
    /// Human-readable product description shown at checkout.
    pub product_name: &'a str,
    /// Optional customer email to pre-fill at checkout.
    pub customer_email: Option<&'a str>,
}

/// Result of a successful [`PaymentOrchestrator::initiate`] call.
#[derive(Debug, Clone)]
pub struct CheckoutResponse {
    /// Locally-generated payment identifier.
    pub payment_intent_id: String,
    /// URL the customer should be redirected to.
    pub checkout_url: String,
    /// Provider's checkout session id.
    pub external_session_id: String,
    /// Amount in the currency's smallest unit.
    pub amount: i64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// When the checkout session expires.
    pub expires_at: DateTime<Utc>,
}

/// Parameters to [`PaymentOrchestrator::select_offer`].
pub struct SelectOfferRequest<'a> {
    /// Quote the traveler is choosing an offer from.
    pub quote_id: &'a str,
    /// Selected offers, in the issuance API's documented shape.
    pub purchase_offers: Vec<Value>,
    /// Insured travelers, in the issuance API's documented shape.
    pub insureds: Vec<Value>,
    /// Main contact/policyholder, in the issuance API's documented shape.
    pub main_contact: Value,
    /// Market code the quote was priced under.
    pub market: &'a str,
    /// Response language code the quote was priced under.
    pub language_code: &'a str,
    /// Distribution channel the quote was priced under.
    pub channel: &'a str,
}

/// Result of a successful [`PaymentOrchestrator::complete`] call.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    /// Locally-generated policy identifier.
    pub policy_id: String,
    /// Human-readable policy number.
    pub policy_number: String,
    /// The provider's purchase id, if the issuance API call succeeded.
    pub external_purchase_id: Option<String>,
}

/// Errors from payment orchestration.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// `amount` was not strictly positive.
    #[error("amount must be greater than zero, got {0}")]
    InvalidAmount(i64),
    /// An existing active payment already covers this `quote_id`.
    #[error("quote already has an active payment: {0}")]
    Duplicate(String),
    /// No payment record exists for the given id.
    #[error("payment not found")]
    NotFound,
    /// The requested operation is not valid for the record's current state.
    #[error("{0}")]
    PreconditionFailed(String),
    /// The payment record store is unavailable or failed.
    #[error("payment store error: {0}")]
    Store(#[source] StoreError),
    /// The selection record store is unavailable or failed.
    #[error("selection store error: {0}")]
    Selection(#[source] SelectionError),
    /// The payment provider is unavailable or failed.
    #[error("payment provider error: {0}")]
    Provider(#[source] ProviderError),
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Duplicate(existing) => Self::Duplicate(existing),
            other => Self::Store(other),
        }
    }
}

impl From<SelectionError> for PaymentError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::NotFound => Self::NotFound,
            other => Self::Selection(other),
        }
    }
}

impl From<ProviderError> for PaymentError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl ToSurface for PaymentError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::InvalidAmount(_) => SurfaceKind::InvalidArgument,
            Self::Duplicate(_) => SurfaceKind::Duplicate,
            Self::NotFound => SurfaceKind::NotFound,
            Self::PreconditionFailed(_) => SurfaceKind::PreconditionFailed,
            Self::Store(err) => err.surface_kind(),
            Self::Selection(err) => err.surface_kind(),
            Self::Provider(err) => err.surface_kind(),
        }
    }
}

/// Drives the payment lifecycle: `initiate` creates a pending record and
/// an external checkout session; `complete`/`cancel` transition it to a
/// terminal state; `status`/`by_user`/`by_quote` are read paths.
pub struct PaymentOrchestrator {
    store: Arc<PaymentStore>,
    selections: Arc<SelectionStore>,
    provider: Arc<PaymentProviderClient>,
    quotation: Arc<QuotationClient>,
    checkout_session_ttl_secs: i64,
}

impl PaymentOrchestrator {
    /// Builds an orchestrator over the given payment/selection stores,
    /// provider client, and issuance client, with the configured checkout
    /// session TTL.
    #[must_use]
    pub fn new(
        store: Arc<PaymentStore>,
        selections: Arc<SelectionStore>,
        provider: Arc<PaymentProviderClient>,
        quotation: Arc<QuotationClient>,
        checkout_session_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            selections,
            provider,
            quotation,
            checkout_session_ttl_secs,
        }
    }

    /// Records the traveler's chosen offer for a quote ahead of payment.
    /// The orchestrator is the sole writer of Selection records, mirroring
    /// its exclusive ownership of Payment record writes. Re-selecting
    /// before `initiate` replaces the prior selection for the same quote.
    ///
    /// # Errors
    ///
    /// Returns a store error on failure.
    pub async fn select_offer(
        &self,
        request: SelectOfferRequest<'_>,
    ) -> Result<SelectionRecord, PaymentError> {
        let selection_id = format!("sel_{}", Uuid::new_v4().simple());
        Ok(self
            .selections
            .upsert(
                &selection_id,
                request.quote_id,
                &Value::Array(request.purchase_offers),
                &Value::Array(request.insureds),
                &request.main_contact,
                request.market,
                request.language_code,
                request.channel,
            )
            .await?)
    }

    /// Initiates a payment: creates a `pending` record, then an external
    /// checkout session whose `client_reference_id` is the new local
    /// `payment_intent_id`. Rejects with [`PaymentError::Duplicate`] if an
    /// active record already exists for `request.quote_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::InvalidAmount`] if `request.amount` is not
    /// strictly positive; [`PaymentError::Duplicate`] on a conflicting
    /// active record; on checkout session creation failure, the record is
    /// marked `failed` (best-effort) and [`PaymentError::Provider`] is
    /// returned.
    pub async fn initiate(
        &self,
        request: InitiateRequest<'_>,
    ) -> Result<CheckoutResponse, PaymentError> {
        if request.amount <= 0 {
            return Err(PaymentError::InvalidAmount(request.amount));
        }

        let payment_intent_id = format!("pi_{}", Uuid::new_v4().simple());

        let record = self
            .store
            .create_pending(
                &payment_intent_id,
                request.user_id,
                request.quote_id,
                request.amount,
                request.currency,
                request.product_name,
                request.customer_email,
            )
            .await?;

        let expires_at = Utc::now() + ChronoDuration::seconds(self.checkout_session_ttl_secs);

        let session = self
            .provider
            .create_checkout_session(CreateCheckoutSession {
                payment_intent_id: &payment_intent_id,
                amount_minor: request.amount,
                currency: request.currency,
                product_name: request.product_name,
                customer_email: request.customer_email,
                expires_at: expires_at.timestamp(),
            })
            .await;

        let session = match session {
            Ok(session) => session,
            Err(err) => {
                let _ = self
                    .store
                    .mark_failed(&payment_intent_id, &err.to_string())
                    .await;
                return Err(err.into());
            }
        };

        self.store
            .attach_session(&payment_intent_id, &session.id, expires_at)
            .await?;

        self.selections
            .attach_payment(request.quote_id, &payment_intent_id)
            .await?;

        Ok(CheckoutResponse {
            payment_intent_id: record.payment_intent_id,
            checkout_url: session.url,
            external_session_id: session.id,
            amount: request.amount,
            currency: request.currency.to_owned(),
            expires_at,
        })
    }

    /// Returns the current record view for `payment_intent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotFound`] if no such record exists.
    pub async fn status(&self, payment_intent_id: &str) -> Result<PaymentRecord, PaymentError> {
        Ok(self.store.get(payment_intent_id).await?)
    }

    /// Completes a payment after its status has reached `completed`. If a
    /// Selection record for this payment exists and carries a recognized
    /// `schema_version`, issues the policy through the issuance API first
    /// (gracefully degraded: issuance failure is logged but the local
    /// policy record is still generated, with `external_purchase_id` left
    /// unset). With no matching Selection, the local policy record is
    /// generated directly.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotFound`] or
    /// [`PaymentError::PreconditionFailed`] if the record does not exist,
    /// is not `completed`, or its Selection carries an unrecognized
    /// `schema_version`.
    pub async fn complete(&self, payment_intent_id: &str) -> Result<CompletionResult, PaymentError> {
        let record = self.store.get(payment_intent_id).await?;
        if record.status() != PaymentStatus::Completed {
            return Err(PaymentError::PreconditionFailed(format!(
                "payment {payment_intent_id} is not completed (status: {})",
                record.payment_status
            )));
        }

        let selection = self.selections.get_by_payment(payment_intent_id).await?;
        let external_purchase_id = match selection {
            Some(selection) if selection.schema_version != CURRENT_SCHEMA_VERSION => {
                return Err(PaymentError::PreconditionFailed(format!(
                    "selection for payment {payment_intent_id} has unrecognized schema_version {}",
                    selection.schema_version
                )));
            }
            Some(selection) => {
                let purchase = selection_to_purchase_request(&selection);
                match self.quotation.complete_purchase(&purchase).await {
                    Ok(response) => Some(response.id),
                    Err(QuotationError::HttpStatus { status, body }) => {
                        tracing::warn!(status, body, "issuance purchase failed, degrading to local policy only");
                        None
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "issuance purchase failed, degrading to local policy only");
                        None
                    }
                }
            }
            None => None,
        };

        let policy_id = format!("pol_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let policy_number = format!(
            "POL-{}-{}",
            Utc::now().format("%Y"),
            Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase()
        );

        Ok(CompletionResult {
            policy_id,
            policy_number,
            external_purchase_id,
        })
    }

    /// Cancels a pending payment. Forbidden once `completed`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotFound`] or
    /// [`PaymentError::PreconditionFailed`] if the record is missing or
    /// already completed.
    pub async fn cancel(&self, payment_intent_id: &str, reason: Option<&str>) -> Result<(), PaymentError> {
        let record = self.store.get(payment_intent_id).await?;
        if record.status() == PaymentStatus::Completed {
            return Err(PaymentError::PreconditionFailed(format!(
                "payment {payment_intent_id} is already completed"
            )));
        }

        if let Some(external_intent) = &record.external_payment_intent {
            let _ = self.provider.cancel_payment_intent(external_intent).await;
        }

        self.store.cancel(payment_intent_id, reason).await?;
        Ok(())
    }

    /// Lists a user's payments, most recent first.
    ///
    /// # Errors
    ///
    /// Returns a store error on query failure.
    pub async fn by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PaymentRecord>, PaymentError> {
        Ok(self.store.by_user(user_id, limit).await?)
    }

    /// Returns the most recent payment record for `quote_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns a store error on query failure.
    pub async fn by_quote(&self, quote_id: &str) -> Result<Option<PaymentRecord>, PaymentError> {
        Ok(self.store.by_quote(quote_id).await?)
    }
}

/// Rebuilds the issuance API's purchase request from a stored Selection,
/// for `complete` to call once payment has succeeded.
fn selection_to_purchase_request(selection: &SelectionRecord) -> PurchaseRequest {
    let offers = match &selection.purchase_offers {
        Value::Array(offers) => offers.clone(),
        other => vec![other.clone()],
    };
    let insureds = match &selection.insureds {
        Value::Array(insureds) => insureds.clone(),
        other => vec![other.clone()],
    };
    PurchaseRequest {
        quote_id: selection.quote_id.clone(),
        purchase_offers: offers,
        insureds,
        main_contact: selection.main_contact.clone(),
        market: selection.market.clone(),
        language_code: selection.language_code.clone(),
        channel: selection.channel.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_selection(purchase_offers: Value, insureds: Value) -> SelectionRecord {
        SelectionRecord {
            selection_id: "sel_1".to_owned(),
            quote_id: "Q1".to_owned(),
            payment_id: Some("pi_1".to_owned()),
            schema_version: CURRENT_SCHEMA_VERSION,
            purchase_offers,
            insureds,
            main_contact: json!({"email": "traveler@example.com"}),
            market: "SG".to_owned(),
            language_code: "en".to_owned(),
            channel: "white-label".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rebuilds_purchase_request_from_array_valued_selection() {
        let selection = sample_selection(
            json!([{"offerId": "o1"}]),
            json!([{"name": "Traveler One"}]),
        );
        let request = selection_to_purchase_request(&selection);
        assert_eq!(request.quote_id, "Q1");
        assert_eq!(request.purchase_offers.len(), 1);
        assert_eq!(request.insureds.len(), 1);
    }

    #[test]
    fn wraps_non_array_offer_payload_into_a_single_element_vec() {
        let selection = sample_selection(json!({"offerId": "o1"}), json!({"name": "Solo"}));
        let request = selection_to_purchase_request(&selection);
        assert_eq!(request.purchase_offers.len(), 1);
        assert_eq!(request.insureds.len(), 1);
    }
}
