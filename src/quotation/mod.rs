//! Quotation Client (C8): typed wrapper around the insurance issuance API's
//! pricing and purchase endpoints. Pure client — no business logic; the
//! Payment Orchestrator (C9) decides when to call `purchase`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SurfaceKind, ToSurface};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Single-trip vs. round-trip pricing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripType {
    /// Round trip; requires `return_date`.
    #[serde(rename = "RT")]
    RoundTrip,
    /// Single (one-way) trip.
    #[serde(rename = "ST")]
    SingleTrip,
}

#[derive(Debug, Serialize)]
struct PricingContext {
    #[serde(rename = "tripType")]
    trip_type: TripType,
    #[serde(rename = "departureDate")]
    departure_date: String,
    #[serde(rename = "departureCountry")]
    departure_country: String,
    #[serde(rename = "arrivalCountry")]
    arrival_country: String,
    #[serde(rename = "adultsCount")]
    adults_count: u32,
    #[serde(rename = "childrenCount")]
    children_count: u32,
    #[serde(rename = "returnDate", skip_serializing_if = "Option::is_none")]
    return_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct PricingRequest {
    market: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    channel: String,
    #[serde(rename = "deviceType")]
    device_type: String,
    context: PricingContext,
}

/// Parameters for a pricing quotation call.
#[derive(Debug, Clone)]
pub struct QuotationRequest {
    /// Round trip or single trip.
    pub trip_type: TripType,
    /// Departure date, `YYYY-MM-DD`.
    pub departure_date: String,
    /// Return date, `YYYY-MM-DD`; required when `trip_type` is [`TripType::RoundTrip`].
    pub return_date: Option<String>,
    /// ISO country code of departure.
    pub departure_country: String,
    /// ISO country code of arrival.
    pub arrival_country: String,
    /// Number of adult travelers.
    pub adults_count: u32,
    /// Number of child travelers.
    pub children_count: u32,
    /// Market code, e.g. `"SG"`.
    pub market: String,
    /// Response language code, e.g. `"en"`.
    pub language_code: String,
    /// Distribution channel identifier.
    pub channel: String,
    /// Requesting device type, e.g. `"DESKTOP"`.
    pub device_type: String,
}

impl QuotationRequest {
    /// Builds a request with the issuance API's documented defaults
    /// (`market="SG"`, `language_code="en"`, `channel="white-label"`,
    /// `device_type="DESKTOP"`, no children).
    #[must_use]
    pub fn new(
        trip_type: TripType,
        departure_date: impl Into<String>,
        departure_country: impl Into<String>,
        arrival_country: impl Into<String>,
        adults_count: u32,
    ) -> Self {
        Self {
            trip_type,
            departure_date: departure_date.into(),
            return_date: None,
            departure_country: departure_country.into(),
            arrival_country: arrival_country.into(),
            adults_count,
            children_count: 0,
            market: "SG".to_owned(),
            language_code: "en".to_owned(),
            channel: "white-label".to_owned(),
            device_type: "DESKTOP".to_owned(),
        }
    }
}

/// Quotation response. `offer_categories` is kept as raw JSON — its offer
/// shape is provider-defined and passed through verbatim to the purchase
/// call and to the caller, not interpreted here.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotationResponse {
    /// Quote identifier, referenced by later purchase/payment calls.
    pub id: String,
    #[serde(rename = "languageCode")]
    /// Echoed language code.
    pub language_code: String,
    #[serde(rename = "offerCategories", default)]
    /// Provider-defined offer categories and their offers.
    pub offer_categories: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct PurchaseRequestBody {
    market: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    channel: String,
    #[serde(rename = "quoteId")]
    quote_id: String,
    #[serde(rename = "purchaseOffers")]
    purchase_offers: Vec<Value>,
    insureds: Vec<Value>,
    #[serde(rename = "mainContact")]
    main_contact: Value,
}

/// Parameters for a purchase call, issued after payment succeeds.
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    /// Quote id returned by an earlier [`QuotationResponse`].
    pub quote_id: String,
    /// Selected offers to purchase, in the provider's documented shape.
    pub purchase_offers: Vec<Value>,
    /// Insured travelers, in the provider's documented shape.
    pub insureds: Vec<Value>,
    /// Main contact/policyholder, in the provider's documented shape.
    pub main_contact: Value,
    /// Market code, e.g. `"SG"`.
    pub market: String,
    /// Response language code, e.g. `"en"`.
    pub language_code: String,
    /// Distribution channel identifier.
    pub channel: String,
}

/// Purchase response.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseResponse {
    /// Purchase identifier.
    pub id: String,
    #[serde(rename = "quoteId")]
    /// The quote id this purchase was issued against.
    pub quote_id: String,
    #[serde(rename = "purchasedOffers", default)]
    /// Provider-defined record of what was purchased.
    pub purchased_offers: Vec<Value>,
}

/// Errors from the quotation/purchase client.
#[derive(Debug, thiserror::Error)]
pub enum QuotationError {
    /// `trip_type` was [`TripType::RoundTrip`] but `return_date` was absent.
    #[error("return_date is required for round-trip quotations")]
    MissingReturnDate,
    /// The HTTP request itself failed (DNS, connect, timeout).
    #[error("issuance API request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The issuance API responded with a non-success status.
    #[error("issuance API returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

impl ToSurface for QuotationError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::MissingReturnDate => SurfaceKind::InvalidArgument,
            Self::Request(_) | Self::HttpStatus { .. } => SurfaceKind::Unavailable,
        }
    }
}

/// Client for the issuance API's pricing and purchase endpoints.
#[derive(Debug, Clone)]
pub struct QuotationClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl QuotationClient {
    /// Builds a client pointed at `base_url` (no trailing slash) using `api_key`
    /// via the `x-api-key` header, with a 30-second request timeout.
    #[must_use]
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            api_key,
            client,
        }
    }

    /// Requests a pricing quotation.
    ///
    /// # Errors
    ///
    /// Returns [`QuotationError::MissingReturnDate`] when a round-trip
    /// request omits `return_date`, or a request/status error otherwise.
    pub async fn get_quotation(
        &self,
        request: &QuotationRequest,
    ) -> Result<QuotationResponse, QuotationError> {
        if request.trip_type == TripType::RoundTrip && request.return_date.is_none() {
            return Err(QuotationError::MissingReturnDate);
        }

        let body = PricingRequest {
            market: request.market.clone(),
            language_code: request.language_code.clone(),
            channel: request.channel.clone(),
            device_type: request.device_type.clone(),
            context: PricingContext {
                trip_type: request.trip_type,
                departure_date: request.departure_date.clone(),
                departure_country: request.departure_country.clone(),
                arrival_country: request.arrival_country.clone(),
                adults_count: request.adults_count,
                children_count: request.children_count,
                return_date: request.return_date.clone(),
            },
        };

        self.post("/v1/travel/front/pricing", &body).await
    }

    /// Completes a purchase for a previously quoted offer set.
    ///
    /// # Errors
    ///
    /// Returns a request/status error if the issuance API rejects or fails
    /// the call.
    pub async fn complete_purchase(
        &self,
        request: &PurchaseRequest,
    ) -> Result<PurchaseResponse, QuotationError> {
        let body = PurchaseRequestBody {
            market: request.market.clone(),
            language_code: request.language_code.clone(),
            channel: request.channel.clone(),
            quote_id: request.quote_id.clone(),
            purchase_offers: request.purchase_offers.clone(),
            insureds: request.insureds.clone(),
            main_contact: request.main_contact.clone(),
        };

        self.post("/v1/travel/front/purchase", &body).await
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, QuotationError>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(QuotationError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| QuotationError::HttpStatus {
            status: status.as_u16(),
            body: format!("failed to parse issuance API response: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_round_trip_without_return_date() {
        let client = QuotationClient::new("http://localhost:9999".to_owned(), "key".to_owned());
        let request = QuotationRequest::new(TripType::RoundTrip, "2026-01-01", "SG", "JP", 2);
        let err = client.get_quotation(&request).await.unwrap_err();
        assert!(matches!(err, QuotationError::MissingReturnDate));
    }

    #[test]
    fn single_trip_builder_defaults() {
        let request = QuotationRequest::new(TripType::SingleTrip, "2026-01-01", "SG", "JP", 1);
        assert_eq!(request.market, "SG");
        assert_eq!(request.channel, "white-label");
        assert!(request.return_date.is_none());
    }
}
