//! Claims SQL Sandbox (C6): validates that a query is read-only before
//! ever reaching the claims warehouse, then executes it through a bounded
//! connection pool. Validation runs client-side and is not a substitute
//! for least-privilege DB credentials, but it catches mistakes and
//! prompt-injected write attempts before they cost a round trip.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};

use crate::error::{SurfaceKind, ToSurface};

const DANGEROUS_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE",
    "EXECUTE", "CALL", "MERGE", "REPLACE", "RENAME",
];

const POOL_MIN_CONNECTIONS: u32 = 2;
const POOL_MAX_CONNECTIONS: u32 = 10;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn single_line_comment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)--.*$").unwrap())
}

fn block_comment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

fn select_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)^(WITH\b.*?\bSELECT\b|SELECT\b)").unwrap())
}

/// Matches `keyword` bounded by a non-alphanumeric character (or the
/// string edge) on each side. Plain `\b` is wrong here: the `regex` crate
/// treats `_` as a word character, so `\bDROP\b` does not match inside
/// `DROP_ME`. Digits still count as keyword-continuing on either side
/// (so `DROP2` is not a hit), matching `\b`'s behavior there; only `_`
/// and punctuation count as a separator in addition to whitespace.
fn keyword_pattern(keyword: &str) -> Regex {
    Regex::new(&format!(r"(?:^|[^A-Z0-9]){keyword}(?:[^A-Z0-9]|$)"))
        .expect("keyword patterns are static and valid")
}

/// Errors from the SQL sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The query contains a write/DDL keyword or does not start with `SELECT`/`WITH`.
    #[error("query is not read-only: {0}")]
    NotReadOnly(String),
    /// The connection pool could not be built or acquired.
    #[error("claims database unavailable: {0}")]
    Pool(#[source] sqlx::Error),
    /// The query executed but the database returned an error.
    #[error("claims query failed: {0}")]
    Query(#[source] sqlx::Error),
}

impl ToSurface for SandboxError {
    fn surface_kind(&self) -> SurfaceKind {
        match self {
            Self::NotReadOnly(_) => SurfaceKind::InvalidArgument,
            Self::Pool(_) => SurfaceKind::Unavailable,
            Self::Query(_) => SurfaceKind::Runtime,
        }
    }
}

/// Normalizes `sql` (strips comments, uppercases) and rejects it unless it
/// is read-only: no whole-word occurrence of a write/DDL keyword, and the
/// query starts with `SELECT` or a `WITH ... SELECT` CTE.
///
/// # Errors
///
/// Returns [`SandboxError::NotReadOnly`] naming the offending keyword or
/// the missing `SELECT` prefix.
pub fn validate_read_only(sql: &str) -> Result<(), SandboxError> {
    let without_line_comments = single_line_comment().replace_all(sql, "");
    let without_comments = block_comment().replace_all(&without_line_comments, "");
    let normalized = without_comments.trim().to_uppercase();

    for keyword in DANGEROUS_KEYWORDS {
        if keyword_pattern(keyword).is_match(&normalized) {
            return Err(SandboxError::NotReadOnly(format!(
                "query contains disallowed keyword: {keyword}"
            )));
        }
    }

    if !select_prefix().is_match(&normalized) {
        return Err(SandboxError::NotReadOnly(
            "query must start with SELECT or WITH ... SELECT".to_owned(),
        ));
    }

    Ok(())
}

/// Read-only, bounded-pool executor for the claims warehouse.
#[derive(Clone)]
pub struct ClaimsSandbox {
    pool: PgPool,
}

impl ClaimsSandbox {
    /// Connects a bounded pool (2–10 connections, 30s command timeout, 10s
    /// connect timeout) to the claims database at `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Pool`] if the pool cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SandboxError> {
        let pool = PgPoolOptions::new()
            .min_connections(POOL_MIN_CONNECTIONS)
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(SandboxError::Pool)?;

        Ok(Self { pool })
    }

    /// Validates and executes `sql`, returning rows as ordered JSON objects
    /// (column order preserved).
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::NotReadOnly`] if validation fails, or
    /// [`SandboxError::Query`] if the database rejects or fails the query.
    pub async fn execute_query(&self, sql: &str) -> Result<Vec<Map<String, Value>>, SandboxError> {
        validate_read_only(sql)?;

        let rows = tokio::time::timeout(COMMAND_TIMEOUT, sqlx::query(sql).fetch_all(&self.pool))
            .await
            .map_err(|_| {
                SandboxError::Query(sqlx::Error::PoolTimedOut)
            })?
            .map_err(SandboxError::Query)?;

        Ok(rows.iter().map(row_to_ordered_map).collect())
    }
}

fn row_to_ordered_map(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();
    for column in row.columns() {
        let name = column.name().to_owned();
        let value = column_value_as_json(row, column.ordinal(), column.type_info().name());
        map.insert(name, value);
    }
    map
}

fn column_value_as_json(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name {
        "INT2" | "INT4" => row
            .try_get::<i32, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT4" | "FLOAT8" | "NUMERIC" => row
            .try_get::<f64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<bool, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index).unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_select() {
        assert!(validate_read_only("SELECT * FROM claims LIMIT 10").is_ok());
    }

    #[test]
    fn accepts_cte_select() {
        assert!(validate_read_only(
            "WITH recent AS (SELECT * FROM claims) SELECT * FROM recent"
        )
        .is_ok());
    }

    #[test]
    fn strips_comments_before_checking() {
        assert!(validate_read_only("SELECT * FROM claims -- DROP TABLE claims\n").is_ok());
    }

    #[test]
    fn rejects_write_keywords() {
        assert!(validate_read_only("DELETE FROM claims").is_err());
        assert!(validate_read_only("INSERT INTO claims VALUES (1)").is_err());
    }

    #[test]
    fn rejects_non_select_prefix() {
        assert!(validate_read_only("EXPLAIN SELECT * FROM claims").is_err());
    }

    #[test]
    fn word_boundary_avoids_false_positive_on_column_names() {
        assert!(validate_read_only("SELECT inserted_at FROM claims").is_ok());
    }

    #[test]
    fn rejects_literal_keyword_as_column_name() {
        assert!(validate_read_only("SELECT drop_me FROM claims").is_err());
    }
}
