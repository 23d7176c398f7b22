use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for the text-to-SPARQL model
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible API endpoint serving the model
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    #[serde(default)]
    pub env_var_api_key: Option<String>,
    /// Model to use for generating queries
    pub model: String,
    /// Task prefix prepended to every question
    #[serde(default = "default_prompt_prefix")]
    pub prompt_prefix: String,
    /// Sampling temperature, zero keeps decoding deterministic
    #[serde(default)]
    pub temperature: f64,
    /// Maximum tokens for a generated query
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Rate limit for model requests per second (0 disables)
    #[serde(default)]
    pub rate_limit_rps: f64,
    /// Number of model requests in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Column holding the question text
    #[serde(default = "default_question_column")]
    pub question_column: String,
}

/// Settings for the SPARQL endpoint used to validate queries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default = "default_endpoint_url")]
    pub url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Requested result serialization
    #[serde(default = "default_result_format")]
    pub result_format: String,
    /// Rate limit for endpoint requests per second (0 disables)
    #[serde(default = "default_endpoint_rate_limit")]
    pub rate_limit_rps: f64,
    /// Retries for transient failures, 0 treats every failure as final
    #[serde(default)]
    pub max_retries: u32,
    /// Base backoff between retries, doubled on each attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Number of endpoint requests in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Projection variable whose bindings are recorded per row
    #[serde(default = "default_value_variable")]
    pub value_variable: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
            timeout_secs: default_timeout_secs(),
            result_format: default_result_format(),
            rate_limit_rps: default_endpoint_rate_limit(),
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
            concurrency: default_concurrency(),
            value_variable: default_value_variable(),
        }
    }
}

/// Input and output locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory of question CSV files
    pub input_dir: PathBuf,
    /// Where generated queries are written
    pub generated_dir: PathBuf,
    /// Where repaired queries are written, repair is skipped when unset
    #[serde(default)]
    pub repaired_dir: Option<PathBuf>,
    /// Where validated rows are written
    pub validated_dir: PathBuf,
    /// Markdown summary destination
    #[serde(default = "default_summary_file")]
    pub summary_file: PathBuf,
}

impl PathsConfig {
    /// Directory the validation step reads from
    pub fn validation_input(&self) -> &Path {
        self.repaired_dir.as_deref().unwrap_or(&self.generated_dir)
    }
}

fn default_prompt_prefix() -> String {
    "translate english to sparql: ".to_string()
}

fn default_max_tokens() -> u32 {
    128
}

fn default_concurrency() -> usize {
    1
}

fn default_question_column() -> String {
    "question".to_string()
}

fn default_endpoint_url() -> String {
    "https://dbpedia.org/sparql".to_string()
}

fn default_timeout_secs() -> u64 {
    25
}

fn default_result_format() -> String {
    "application/sparql-results+json".to_string()
}

fn default_endpoint_rate_limit() -> f64 {
    20.0
}

fn default_backoff_ms() -> u64 {
    800
}

fn default_value_variable() -> String {
    "obj".to_string()
}

fn default_summary_file() -> PathBuf {
    PathBuf::from("summary.md")
}

/// Root configuration of a run file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub generation: GenerationConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, rps) in [
            ("generation.rate_limit_rps", self.generation.rate_limit_rps),
            ("endpoint.rate_limit_rps", self.endpoint.rate_limit_rps),
        ] {
            if !rps.is_finite() || rps < 0.0 {
                bail!("{} must be a finite number >= 0, got {}", name, rps);
            }
        }
        Ok(())
    }
}
