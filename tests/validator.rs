//! Integration tests for `src/validator.rs`.

#[path = "validator/repair_test.rs"]
mod repair_test;
