use crate::config::GenerationConfig;
use crate::models::{GenerationResult, QuestionRecord};
use crate::rate_limit::RateLimiter;
use anyhow::{Context, Result};
use async_openai::{Client, config::OpenAIConfig, types::CreateChatCompletionRequestArgs};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Translates a natural-language question into a SPARQL query
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(&self, question: &str) -> Result<String>;
}

/// Generator backed by an OpenAI-compatible inference API
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    config: GenerationConfig,
    limiter: RateLimiter,
}

impl OpenAiGenerator {
    /// Create a generator, reading the API key from the configured variable
    pub fn new(config: GenerationConfig) -> Result<Self> {
        let client = Self::create_client(&config)?;
        let limiter = RateLimiter::new(config.rate_limit_rps);

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    fn create_client(config: &GenerationConfig) -> Result<Client<OpenAIConfig>> {
        let mut openai_config = OpenAIConfig::new().with_api_base(&config.api_endpoint);

        if let Some(var) = &config.env_var_api_key {
            let api_key = std::env::var(var)
                .with_context(|| format!("Environment variable {} not found", var))?;
            openai_config = openai_config.with_api_key(api_key);
        }

        Ok(Client::with_config(openai_config))
    }

    /// Build the completion request for one question
    fn build_request(
        &self,
        question: &str,
    ) -> Result<async_openai::types::CreateChatCompletionRequest> {
        let user_message = async_openai::types::ChatCompletionRequestUserMessageArgs::default()
            .content(format!("{}{}", self.config.prompt_prefix, question))
            .build()
            .context("Failed to build user message")?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages([user_message])
            .temperature(self.config.temperature as f32)
            .max_tokens(self.config.max_tokens as u16)
            .build()
            .context("Failed to build chat completion request")
    }

    fn extract_query(response: async_openai::types::CreateChatCompletionResponse) -> String {
        match response.choices.first() {
            Some(choice) => match &choice.message.content {
                Some(content) => content.trim().to_string(),
                None => String::new(),
            },
            None => String::new(),
        }
    }
}

#[async_trait]
impl QueryGenerator for OpenAiGenerator {
    async fn generate(&self, question: &str) -> Result<String> {
        self.limiter.acquire().await;

        let request = self.build_request(question)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Failed to generate query")?;

        Ok(Self::extract_query(response))
    }
}

/// Generate one result per record, in input order
///
/// Failures are kept as rows without a query so the output stays aligned
/// with the input file.
pub async fn generate_batch(
    generator: &dyn QueryGenerator,
    records: &[QuestionRecord],
    concurrency: usize,
) -> Vec<GenerationResult> {
    let total = records.len();

    stream::iter(records.iter().enumerate())
        .map(|(index, record)| async move {
            debug!(
                dataset = %record.source_dataset,
                "Generating query for question {}/{}",
                index + 1,
                total
            );
            generate_one(generator, record).await
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

async fn generate_one(generator: &dyn QueryGenerator, record: &QuestionRecord) -> GenerationResult {
    if record.question.trim().is_empty() {
        return GenerationResult::failed(&record.question, "Empty question".to_string());
    }

    match generator.generate(&record.question).await {
        Ok(query) => GenerationResult::generated(&record.question, query),
        Err(e) => {
            warn!(question = %record.question, "Generation failed: {:#}", e);
            GenerationResult::failed(&record.question, format!("{:#}", e))
        }
    }
}
