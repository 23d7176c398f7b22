use crate::config::EndpointConfig;
use crate::models::{GenerationResult, QueryResponse, ValidatedRow, ValidationOutcome};
use crate::rate_limit::RateLimiter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Longest error body kept in a message
const MAX_SNIPPET_CHARS: usize = 180;

/// Why a query did not produce a result set
///
/// The Display text is what ends up in the `error` column and in the
/// summary, so messages must be stable across rows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Empty or invalid query string")]
    EmptyQuery,
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Unexpected results format")]
    UnexpectedFormat,
}

impl QueryError {
    /// Whether a retry could plausibly succeed
    fn is_transient(&self) -> bool {
        match self {
            QueryError::Network(_) => true,
            QueryError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

/// Submits a query and classifies the response
#[async_trait]
pub trait QueryValidator: Send + Sync {
    async fn validate(&self, query: &str) -> QueryResponse;
}

/// Validator backed by a SPARQL protocol endpoint
pub struct SparqlEndpoint {
    client: reqwest::Client,
    config: EndpointConfig,
    limiter: RateLimiter,
}

impl SparqlEndpoint {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let limiter = RateLimiter::new(config.rate_limit_rps);

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    /// Run the query once
    async fn execute(&self, query: &str) -> Result<QueryResponse, QueryError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(&self.config.url)
            .query(&[("query", query), ("format", self.config.result_format.as_str())])
            .header(ACCEPT, self.config.result_format.as_str())
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.network_error(e))?;

        if !status.is_success() {
            return Err(QueryError::Http {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        parse_results(&body, &self.config.value_variable)
    }

    fn network_error(&self, e: reqwest::Error) -> QueryError {
        // Messages must not carry the request URL, it embeds the query.
        let detail = if e.is_timeout() {
            format!("request timed out after {}s", self.config.timeout_secs)
        } else if e.is_connect() {
            "connection failed".to_string()
        } else {
            e.without_url().to_string()
        };
        QueryError::Network(detail)
    }
}

#[async_trait]
impl QueryValidator for SparqlEndpoint {
    async fn validate(&self, query: &str) -> QueryResponse {
        if query.trim().is_empty() {
            return QueryResponse::error(QueryError::EmptyQuery.to_string());
        }

        let mut attempt = 0;
        loop {
            match self.execute(query).await {
                Ok(response) => return response,
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff_ms.saturating_mul(1 << attempt.min(16));
                    warn!(attempt = attempt + 1, "{}; retrying in {}ms", e, delay);
                    sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return QueryResponse::error(e.to_string()),
            }
        }
    }
}

/// Classify a successful SPARQL JSON results document
pub fn parse_results(body: &str, value_variable: &str) -> Result<QueryResponse, QueryError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| QueryError::InvalidJson(format!("{}: {}", e, snippet(body))))?;

    if let Some(answer) = data.get("boolean").and_then(Value::as_bool) {
        let outcome = if answer {
            ValidationOutcome::NonEmpty { rows: 1 }
        } else {
            ValidationOutcome::Empty
        };
        return Ok(QueryResponse {
            outcome,
            values: Vec::new(),
        });
    }

    let bindings = match data.get("results").and_then(|r| r.get("bindings")) {
        None => &[][..],
        Some(Value::Array(bindings)) => bindings.as_slice(),
        Some(_) => return Err(QueryError::UnexpectedFormat),
    };

    let mut seen = HashSet::new();
    let values = bindings
        .iter()
        .filter_map(|b| b.get(value_variable)?.get("value")?.as_str())
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect();

    let outcome = if bindings.is_empty() {
        ValidationOutcome::Empty
    } else {
        ValidationOutcome::NonEmpty {
            rows: bindings.len(),
        }
    };

    Ok(QueryResponse { outcome, values })
}

/// Single-line, length-capped excerpt of a response body
fn snippet(text: &str) -> String {
    let flat = text.trim().replace('\n', " ");
    if flat.chars().count() > MAX_SNIPPET_CHARS {
        let cut: String = flat.chars().take(MAX_SNIPPET_CHARS).collect();
        format!("{}…", cut)
    } else {
        flat
    }
}

/// Validate every generated row, in input order
///
/// Rows whose generation failed are not sent; they keep the failure reason.
pub async fn validate_batch(
    validator: &dyn QueryValidator,
    rows: &[GenerationResult],
    concurrency: usize,
) -> Vec<ValidatedRow> {
    let total = rows.len();

    stream::iter(rows.iter().enumerate())
        .map(|(index, row)| async move {
            let response = match &row.failure {
                Some(reason) => QueryResponse::error(format!("Generation failed: {}", reason)),
                None => validator.validate(row.query_text()).await,
            };
            debug!(
                outcome = response.outcome.label(),
                "Validated query {}/{}",
                index + 1,
                total
            );
            ValidatedRow {
                question: row.question.clone(),
                generated_query: row.query_text().to_string(),
                response,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
