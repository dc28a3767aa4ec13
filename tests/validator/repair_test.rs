use waypoint::validator::{extract_json_array, validate_json_response, validate_tolerant};

#[test]
fn strict_json_round_trips_with_no_repair_steps() {
    let outcome = validate_json_response(r#"{"tables":["benefits"]}"#, &["tables"]);
    assert!(outcome.is_valid);
    assert!(outcome.repair_steps.is_empty(), "{:?}", outcome.repair_steps);
}

#[test]
fn combined_defects_are_all_repaired_in_one_pass() {
    // Fenced, quote-wrapped around the fence, trailing comma, and a
    // dropped closing brace all in one response -- the shape an LLM
    // under token pressure actually produces.
    let raw = "'```json\n{\"tables\": [\"benefits\", \"general_conditions\",]\n```'";
    let outcome = validate_json_response(raw, &["tables"]);
    assert!(outcome.is_valid, "{outcome:?}");
    assert!(outcome.repair_steps.contains(&"removed_markdown_code_block".to_owned()));
    let parsed = outcome.parsed.unwrap();
    assert_eq!(parsed["tables"], serde_json::json!(["benefits", "general_conditions"]));
}

#[test]
fn smart_quotes_and_prose_preamble_still_extract_the_array() {
    let raw = "Here are the topics you asked for:\n[\"baggage delay\", \"trip cancellation\"]\nLet me know if you need more.";
    let outcome = extract_json_array(raw);
    assert!(outcome.is_valid, "{outcome:?}");
    assert_eq!(
        outcome.parsed.unwrap(),
        serde_json::json!(["baggage delay", "trip cancellation"])
    );
}

#[test]
fn tolerant_mode_prefers_bare_array_over_wrapping_object_parse() {
    // A response that is unambiguously a bare array should never fall
    // through to the object-shaped branches even when `exact_key` is set.
    let raw = "[{\"topic\": \"baggage delay\"}, {\"topic\": \"trip cancellation\"}]";
    let outcome = validate_tolerant(raw, "topics");
    assert!(outcome.is_valid);
    assert!(outcome.parsed.unwrap().is_array());
}

#[test]
fn tolerant_mode_reports_missing_keys_when_no_shape_matches() {
    let raw = r#"{"unrelated": "value", "another": "value"}"#;
    let outcome = validate_tolerant(raw, "topics");
    assert!(!outcome.is_valid);
    assert_eq!(outcome.missing_keys, vec!["topics".to_owned()]);
}

#[test]
fn unrepairable_garbage_reports_decode_error_without_panicking() {
    let outcome = validate_json_response("not json at all {{{", &["tables"]);
    assert!(!outcome.is_valid);
    assert!(!outcome.repair_steps.is_empty());
}
