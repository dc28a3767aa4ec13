use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waypoint::graph::GraphConceptClient;

#[tokio::test]
async fn searches_and_filters_short_concept_nodes() {
    let server = MockServer::start().await;

    let long_memory = "a".repeat(150);
    Mock::given(method("POST"))
        .and(path("/concepts/search"))
        .and(body_json(serde_json::json!({"query": "baggage delay", "top_k": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"memory": long_memory},
                {"memory": "short"},
            ]
        })))
        .mount(&server)
        .await;

    let client = GraphConceptClient::new(server.uri(), Some("secret".to_owned()));
    let results = client.search_concepts("baggage delay", 5).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].len(), 150);
}

#[tokio::test]
async fn propagates_non_success_status_as_http_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/concepts/search"))
        .respond_with(ResponseTemplate::new(503).set_body_string("graph store overloaded"))
        .mount(&server)
        .await;

    let client = GraphConceptClient::new(server.uri(), None);
    let err = client.search_concepts("baggage delay", 5).await.unwrap_err();
    assert!(matches!(
        err,
        waypoint::graph::GraphError::HttpStatus { status: 503, .. }
    ));
}
