//! Integration tests for `src/quotation/`.

#[path = "quotation/client_test.rs"]
mod client_test;
