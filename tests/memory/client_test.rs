use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waypoint::memory::{MemoryClient, MemoryMessage};

#[tokio::test]
async fn adds_memories_from_a_conversation_turn() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/memories/"))
        .and(header("Authorization", "Token test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [{"id": "mem-1", "memory": "prefers window seats", "event": "ADD"}]
        })))
        .mount(&server)
        .await;

    let client = MemoryClient::new(server.uri(), "test-key".to_owned());
    let messages = vec![MemoryMessage {
        role: "user".to_owned(),
        content: "I always want a window seat".to_owned(),
    }];
    let results = client.add("alice", &messages, None).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].event, "ADD");
}

#[tokio::test]
async fn search_accepts_bare_array_response_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/memories/search/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "mem-1", "memory": "prefers window seats", "score": 0.9}
        ])))
        .mount(&server)
        .await;

    let client = MemoryClient::new(server.uri(), "test-key".to_owned());
    let results = client.search("alice", "seating preference", None).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, Some(0.9));
}

#[tokio::test]
async fn transient_server_error_is_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/memories/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/memories/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
        .mount(&server)
        .await;

    let client = MemoryClient::new(server.uri(), "test-key".to_owned());
    let results = client.all("alice").await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn delete_propagates_non_success_status() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/memories/mem-1/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let client = MemoryClient::new(server.uri(), "test-key".to_owned());
    let err = client.delete("mem-1").await.unwrap_err();
    assert!(matches!(
        err,
        waypoint::memory::MemoryError::HttpStatus { status: 404, .. }
    ));
}
