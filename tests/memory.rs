//! Integration tests for `src/memory/`.

#[path = "memory/client_test.rs"]
mod client_test;
