use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waypoint::quotation::{PurchaseRequest, QuotationClient, QuotationRequest, TripType};

#[tokio::test]
async fn gets_a_round_trip_quotation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/travel/front/pricing"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "quote-123",
            "languageCode": "en",
            "offerCategories": [{"name": "standard"}]
        })))
        .mount(&server)
        .await;

    let client = QuotationClient::new(server.uri(), "test-key".to_owned());
    let mut request = QuotationRequest::new(TripType::RoundTrip, "2026-08-01", "SG", "JP", 2);
    request.return_date = Some("2026-08-10".to_owned());

    let quote = client.get_quotation(&request).await.unwrap();
    assert_eq!(quote.id, "quote-123");
    assert_eq!(quote.offer_categories.len(), 1);
}

#[tokio::test]
async fn completes_a_purchase_against_a_quote() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/travel/front/purchase"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "purchase-456",
            "quoteId": "quote-123",
            "purchasedOffers": []
        })))
        .mount(&server)
        .await;

    let client = QuotationClient::new(server.uri(), "test-key".to_owned());
    let request = PurchaseRequest {
        quote_id: "quote-123".to_owned(),
        purchase_offers: vec![],
        insureds: vec![],
        main_contact: serde_json::json!({"email": "traveler@example.com"}),
        market: "SG".to_owned(),
        language_code: "en".to_owned(),
        channel: "white-label".to_owned(),
    };

    let purchase = client.complete_purchase(&request).await.unwrap();
    assert_eq!(purchase.id, "purchase-456");
    assert_eq!(purchase.quote_id, "quote-123");
}

#[tokio::test]
async fn issuance_api_error_status_is_surfaced_with_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/travel/front/pricing"))
        .respond_with(ResponseTemplate::new(422).set_body_string("destination country not covered"))
        .mount(&server)
        .await;

    let client = QuotationClient::new(server.uri(), "test-key".to_owned());
    let request = QuotationRequest::new(TripType::SingleTrip, "2026-08-01", "SG", "KP", 1);

    let err = client.get_quotation(&request).await.unwrap_err();
    match err {
        waypoint::quotation::QuotationError::HttpStatus { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("not covered"));
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}
