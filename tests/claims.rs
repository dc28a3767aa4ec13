//! Integration tests for `src/claims/`.

#[path = "claims/sandbox_test.rs"]
mod sandbox_test;
