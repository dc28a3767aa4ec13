//! Claims Intelligence Orchestrator (C7): a four-phase pipeline over the
//! claims warehouse — plan analytical topics, generate SQL per topic in
//! parallel, execute each query through the sandbox, then synthesize
//! insights from the combined results.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{SurfaceKind, ToSurface};
use crate::llm::gateway::Gateway;
use crate::llm::router::ModelRole;
use crate::llm::{CompletionRequest, Message};
use crate::validator::{extract_json_array, validate_json_response};

use super::sandbox::ClaimsSandbox;

const CLAIMS_SCHEMA_SUMMARY: &str = r#"Table `claims` (read-only):
claim_number (text, PK), product_category, product_name, claim_status,
accident_date, report_date, closed_date (null while open), destination,
claim_type, cause_of_loss, loss_type, and the financial columns
gross_incurred/gross_paid/gross_reserve and net_incurred/net_paid/net_reserve
(net = company's exposure after reinsurance; gross_incurred = gross_paid + gross_reserve,
and similarly for net)."#;

#[derive(Debug, Clone, Deserialize)]
struct Topic {
    topic: String,
    #[serde(default)]
    focus: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SqlCode {
    #[serde(rename = "SQL_code")]
    sql_code: String,
}

struct SqlGeneration {
    topic: Topic,
    sql_code: Option<String>,
    error: Option<String>,
}

struct Execution {
    topic: Topic,
    sql_code: Option<String>,
    rows: Option<Vec<Map<String, Value>>>,
    error: Option<String>,
}

/// Outcome of a claims analysis run.
#[derive(Debug)]
pub enum ClaimsAnalysisOutcome {
    /// The full pipeline completed and produced insights.
    Success {
        /// One insight string per requested topic (best effort; a topic
        /// whose query failed may still be covered by a caveat insight).
        insights: Vec<String>,
    },
    /// Topic planning or insight synthesis failed outright.
    Failed,
}

/// Input-validation errors from [`ClaimsOrchestrator::analyze`].
#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    /// `query` was empty or all whitespace.
    #[error("query must not be empty")]
    EmptyQuery,
    /// `topic_count` was outside the accepted `[1, 10]` range.
    #[error("topic_count must be in 1..=10, got {0}")]
    TopicCountOutOfRange(usize),
}

impl ToSurface for ClaimsError {
    fn surface_kind(&self) -> SurfaceKind {
        SurfaceKind::InvalidArgument
    }
}

const MAX_TOPICS: usize = 10;

/// Drives the plan → generate-SQL → execute → synthesize pipeline.
pub struct ClaimsOrchestrator {
    gateway: Arc<Gateway>,
    sandbox: Arc<ClaimsSandbox>,
    phase_timeout: Duration,
}

impl ClaimsOrchestrator {
    /// Builds an orchestrator over a shared gateway and claims sandbox.
    /// `phase_timeout` bounds each individual LLM call in P1/P2/P4; a P1 or
    /// P4 timeout fails the whole analysis, a P2 timeout fails only that topic.
    #[must_use]
    pub fn new(gateway: Arc<Gateway>, sandbox: Arc<ClaimsSandbox>, phase_timeout: Duration) -> Self {
        Self {
            gateway,
            sandbox,
            phase_timeout,
        }
    }

    /// Runs the full analysis pipeline for `query`, requesting
    /// `topic_count` analytical topics (and, on success, that many insights).
    ///
    /// # Errors
    ///
    /// Returns [`ClaimsError`] only for invalid input; pipeline failures at
    /// any phase are represented as [`ClaimsAnalysisOutcome::Failed`].
    pub async fn analyze(
        &self,
        query: &str,
        topic_count: usize,
    ) -> Result<ClaimsAnalysisOutcome, ClaimsError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ClaimsError::EmptyQuery);
        }
        if topic_count == 0 || topic_count > MAX_TOPICS {
            return Err(ClaimsError::TopicCountOutOfRange(topic_count));
        }

        let Some(topics) = self.plan_topics(trimmed, topic_count).await else {
            return Ok(ClaimsAnalysisOutcome::Failed);
        };

        let sql_generations = self.generate_all_sql(&topics).await;
        let executions = self.execute_all(sql_generations).await;

        match self.synthesize_insights(trimmed, topic_count, &executions).await {
            Some(insights) => Ok(ClaimsAnalysisOutcome::Success { insights }),
            None => Ok(ClaimsAnalysisOutcome::Failed),
        }
    }

    async fn plan_topics(&self, query: &str, topic_count: usize) -> Option<Vec<Topic>> {
        let prompt = format!(
            "You are a data analyst specializing in travel insurance claims analysis.\n\n\
             Given the user's query, plan {topic_count} distinct analytical topics that could \
             provide valuable insights from the claims database.\n\n\
             USER QUERY: {query}\n\n{CLAIMS_SCHEMA_SUMMARY}\n\n\
             Cover different analytical angles (frequency, severity, destination patterns, \
             product performance). Return ONLY valid JSON:\n\
             {{\"topics\": [{{\"topic\": \"...\", \"focus\": \"...\"}}]}}"
        );

        let response = self
            .gateway
            .chat(
                ModelRole::Planner,
                CompletionRequest {
                    model: String::new(),
                    messages: vec![Message::user(prompt)],
                    temperature: 1.0,
                    max_tokens: 4096,
                    json_mode: true,
                    timeout: Some(self.phase_timeout),
                },
            )
            .await
            .ok()?;

        parse_array_or_keyed_object(&response.content, "topics")
    }

    async fn generate_all_sql(&self, topics: &[Topic]) -> Vec<SqlGeneration> {
        let generations = topics.iter().map(|topic| self.generate_sql_for_topic(topic));
        futures_util::future::join_all(generations).await
    }

    async fn generate_sql_for_topic(&self, topic: &Topic) -> SqlGeneration {
        let prompt = format!(
            "You are an expert SQL developer specializing in PostgreSQL analytics queries.\n\n\
             Generate a SQL query to answer the following analytical question about travel \
             insurance claims data.\n\nTOPIC: {}\nFOCUS: {}\n\n{CLAIMS_SCHEMA_SUMMARY}\n\n\
             Write a read-only PostgreSQL SELECT (or WITH ... SELECT) query against the claims \
             table only, with meaningful aliases and a LIMIT of 10-20 rows. Return ONLY valid \
             JSON: {{\"SQL_code\": \"SELECT ...\"}}",
            topic.topic, topic.focus
        );

        let result = self
            .gateway
            .chat(
                ModelRole::Sql,
                CompletionRequest {
                    model: String::new(),
                    messages: vec![Message::user(prompt)],
                    temperature: 0.2,
                    max_tokens: 2048,
                    json_mode: true,
                    timeout: Some(self.phase_timeout),
                },
            )
            .await;

        let Ok(response) = result else {
            return SqlGeneration {
                topic: topic.clone(),
                sql_code: None,
                error: Some("SQL generation call failed".to_owned()),
            };
        };

        let outcome = validate_json_response(&response.content, &["SQL_code"]);
        if !outcome.is_valid {
            return SqlGeneration {
                topic: topic.clone(),
                sql_code: None,
                error: Some("SQL generation response failed validation".to_owned()),
            };
        }
        match outcome.parsed.and_then(|v| serde_json::from_value::<SqlCode>(v).ok()) {
            Some(parsed) => SqlGeneration {
                topic: topic.clone(),
                sql_code: Some(parsed.sql_code),
                error: None,
            },
            None => SqlGeneration {
                topic: topic.clone(),
                sql_code: None,
                error: Some("SQL generation response missing SQL_code".to_owned()),
            },
        }
    }

    async fn execute_all(&self, generations: Vec<SqlGeneration>) -> Vec<Execution> {
        let mut executions = Vec::with_capacity(generations.len());
        for generation in generations {
            let Some(sql_code) = generation.sql_code.clone() else {
                executions.push(Execution {
                    topic: generation.topic,
                    sql_code: None,
                    rows: None,
                    error: generation.error,
                });
                continue;
            };

            match self.sandbox.execute_query(&sql_code).await {
                Ok(rows) => executions.push(Execution {
                    topic: generation.topic,
                    sql_code: Some(sql_code),
                    rows: Some(rows),
                    error: None,
                }),
                Err(err) => executions.push(Execution {
                    topic: generation.topic,
                    sql_code: Some(sql_code),
                    rows: None,
                    error: Some(err.to_string()),
                }),
            }
        }
        executions
    }

    async fn synthesize_insights(
        &self,
        query: &str,
        insight_count: usize,
        executions: &[Execution],
    ) -> Option<Vec<String>> {
        let results_summary: Vec<Value> = executions
            .iter()
            .map(|execution| {
                let mut summary = Map::new();
                summary.insert("topic".to_owned(), json!(execution.topic.topic));
                summary.insert("focus".to_owned(), json!(execution.topic.focus));
                summary.insert(
                    "SQL_code".to_owned(),
                    json!(execution.sql_code.clone().unwrap_or_else(|| "N/A".to_owned())),
                );
                match (&execution.error, &execution.rows) {
                    (Some(error), _) => {
                        summary.insert("status".to_owned(), json!("FAILED"));
                        summary.insert("error".to_owned(), json!(error));
                    }
                    (None, Some(rows)) => {
                        summary.insert("status".to_owned(), json!("SUCCESS"));
                        summary.insert("row_count".to_owned(), json!(rows.len()));
                        summary.insert("data".to_owned(), json!(rows.iter().take(5).collect::<Vec<_>>()));
                    }
                    (None, None) => {
                        summary.insert("status".to_owned(), json!("FAILED"));
                    }
                }
                Value::Object(summary)
            })
            .collect();

        let prompt = format!(
            "You are a senior data analyst providing actionable insurance recommendations based \
             on claims data analysis.\n\nORIGINAL USER QUERY: {query}\n\nANALYSIS RESULTS:\n{}\n\n\
             TASK: Synthesize {insight_count} specific, data-driven insights (citing numbers from \
             results) that directly answer the user's query, each with a clear coverage \
             recommendation. If a query failed, you may still reason from the data that did \
             return, or note the limitation.\n\n{CLAIMS_SCHEMA_SUMMARY}\n\n\
             Return ONLY valid JSON: {{\"insights\": [\"insight 1\", \"insight 2\"]}}",
            serde_json::to_string_pretty(&results_summary).unwrap_or_default(),
        );

        let response = self
            .gateway
            .chat(
                ModelRole::Synth,
                CompletionRequest {
                    model: String::new(),
                    messages: vec![Message::user(prompt)],
                    temperature: 1.0,
                    max_tokens: 8192,
                    json_mode: true,
                    timeout: Some(self.phase_timeout),
                },
            )
            .await
            .ok()?;

        parse_array_or_keyed_object::<String>(&response.content, "insights")
    }
}

/// Mirrors the two response shapes the synthesis/planning prompts may
/// produce: a bare JSON array, or an object carrying the array under
/// `key` (or, failing that, under whichever key holds the first array).
fn parse_array_or_keyed_object<T>(response_text: &str, key: &str) -> Option<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let array_outcome = extract_json_array(response_text);
    if array_outcome.is_valid {
        if let Some(parsed) = array_outcome.parsed {
            if let Ok(items) = serde_json::from_value::<Vec<T>>(parsed) {
                return Some(items);
            }
        }
    }

    let object_outcome = validate_json_response(response_text, &[]);
    if !object_outcome.is_valid {
        return None;
    }
    let Value::Object(map) = object_outcome.parsed? else {
        return None;
    };

    let candidate = map
        .get(key)
        .cloned()
        .or_else(|| map.values().find(|v| v.is_array()).cloned())?;

    serde_json::from_value::<Vec<T>>(candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_array_response() {
        let parsed = parse_array_or_keyed_object::<String>(r#"["a", "b"]"#, "insights");
        assert_eq!(parsed, Some(vec!["a".to_owned(), "b".to_owned()]));
    }

    #[test]
    fn parses_named_key_response() {
        let parsed =
            parse_array_or_keyed_object::<String>(r#"{"insights": ["x", "y"]}"#, "insights");
        assert_eq!(parsed, Some(vec!["x".to_owned(), "y".to_owned()]));
    }

    #[test]
    fn falls_back_to_first_array_valued_key() {
        let parsed =
            parse_array_or_keyed_object::<String>(r#"{"recommendations": ["z"]}"#, "insights");
        assert_eq!(parsed, Some(vec!["z".to_owned()]));
    }

    #[test]
    fn returns_none_when_no_array_present() {
        let parsed = parse_array_or_keyed_object::<String>(r#"{"status": "ok"}"#, "insights");
        assert_eq!(parsed, None);
    }
}
