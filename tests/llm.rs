//! Integration tests for `src/llm/`.

#[path = "llm/router_test.rs"]
mod router_test;
