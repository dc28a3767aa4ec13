use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waypoint::payment::provider::{CreateCheckoutSession, PaymentProviderClient};

fn test_client(base_url: String) -> PaymentProviderClient {
    PaymentProviderClient::new(
        base_url,
        "sk_test_key".to_owned(),
        "https://app.example.com/success".to_owned(),
        "https://app.example.com/cancel".to_owned(),
    )
}

#[tokio::test]
async fn creates_a_checkout_session_with_client_reference_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_test_1",
            "url": "https://checkout.example.com/cs_test_1",
            "expires_at": 1_700_100_000_i64
        })))
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let session = client
        .create_checkout_session(CreateCheckoutSession {
            payment_intent_id: "pi_local_1",
            amount_minor: 1_999,
            currency: "SGD",
            product_name: "Single-trip travel insurance",
            customer_email: Some("traveler@example.com"),
            expires_at: 1_700_100_000,
        })
        .await
        .unwrap();

    assert_eq!(session.id, "cs_test_1");
    assert_eq!(session.expires_at, 1_700_100_000);
}

#[tokio::test]
async fn retrieves_checkout_session_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/checkout/sessions/cs_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "status": "complete",
            "client_reference_id": "pi_local_1",
            "payment_intent": "pi_provider_1"
        })))
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let status = client.get_checkout_session("cs_test_1").await.unwrap();
    assert_eq!(status.payment_status, "paid");
    assert_eq!(status.client_reference_id.as_deref(), Some("pi_local_1"));
}

#[tokio::test]
async fn cancel_returns_false_rather_than_erroring_when_provider_refuses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment_intents/pi_provider_1/cancel"))
        .respond_with(ResponseTemplate::new(400).set_body_string("cannot cancel a captured intent"))
        .mount(&server)
        .await;

    let client = test_client(server.uri());
    let cancelled = client.cancel_payment_intent("pi_provider_1").await.unwrap();
    assert!(!cancelled);
}
