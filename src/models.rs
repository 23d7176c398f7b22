use serde::{Deserialize, Serialize};

/// A single benchmark question to translate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Natural-language question text
    pub question: String,
    /// Dataset (input file stem) the question came from
    pub source_dataset: String,
}

/// Output of the model for one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Original question
    pub question: String,
    /// Generated query, `None` when the model call failed
    pub generated_query: Option<String>,
    /// Why generation failed, kept through the generated CSV
    pub failure: Option<String>,
}

impl GenerationResult {
    pub fn generated(question: &str, query: String) -> Self {
        Self {
            question: question.to_string(),
            generated_query: Some(query),
            failure: None,
        }
    }

    pub fn failed(question: &str, failure: String) -> Self {
        Self {
            question: question.to_string(),
            generated_query: None,
            failure: Some(failure),
        }
    }

    /// Query text, empty for failed generations
    pub fn query_text(&self) -> &str {
        self.generated_query.as_deref().unwrap_or("")
    }
}

/// How a generated query fared against the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationOutcome {
    NonEmpty { rows: usize },
    Empty,
    Error { message: String },
}

impl ValidationOutcome {
    /// Label written to the `outcome` column
    pub fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::NonEmpty { .. } => "non_empty",
            ValidationOutcome::Empty => "empty",
            ValidationOutcome::Error { .. } => "error",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Endpoint response for one query: the outcome plus projected values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub outcome: ValidationOutcome,
    /// Deduplicated bindings of the projection variable, first-seen order
    pub values: Vec<String>,
}

impl QueryResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            outcome: ValidationOutcome::Error {
                message: message.into(),
            },
            values: Vec::new(),
        }
    }
}

/// A generated row after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRow {
    pub question: String,
    pub generated_query: String,
    pub response: QueryResponse,
}

/// Aggregate over all validation outcomes of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total_rows: usize,
    pub non_empty_count: usize,
    pub empty_count: usize,
    pub error_count: usize,
    /// Unique error messages in first-seen order
    pub distinct_error_messages: Vec<String>,
}
