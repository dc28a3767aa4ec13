use waypoint::claims::sandbox::validate_read_only;

#[test]
fn rejects_multi_statement_query_smuggling_a_write() {
    let sql = "SELECT * FROM claims; DELETE FROM claims";
    assert!(validate_read_only(sql).is_err());
}

#[test]
fn rejects_write_keyword_hidden_behind_block_comment() {
    let sql = "SELECT * FROM claims /* comment */ ; DROP/**/TABLE claims";
    assert!(validate_read_only(sql).is_err());
}

#[test]
fn keyword_matching_is_case_insensitive() {
    assert!(validate_read_only("select * from claims").is_ok());
    assert!(validate_read_only("Delete From claims").is_err());
}

#[test]
fn accepts_nested_cte_chain() {
    let sql = "WITH recent AS (SELECT * FROM claims), summary AS (SELECT count(*) FROM recent) SELECT * FROM summary";
    assert!(validate_read_only(sql).is_ok());
}

#[test]
fn rejects_query_with_no_select_at_all() {
    assert!(validate_read_only("").is_err());
    assert!(validate_read_only("   ").is_err());
}
