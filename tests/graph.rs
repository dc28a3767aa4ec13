//! Integration tests for `src/graph/`.

#[path = "graph/concept_search_test.rs"]
mod concept_search_test;
