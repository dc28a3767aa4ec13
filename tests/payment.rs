//! Integration tests for `src/payment/`.

#[path = "payment/provider_test.rs"]
mod provider_test;
