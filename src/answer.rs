//! Answer generators for `prag query`.
//!
//! | `[llm].provider` | Generator |
//! |------------------|-----------|
//! | `"disabled"` | [`DisabledGenerator`] |
//! | `"openai"` | [`OpenAiChat`] (`POST /v1/chat/completions`, `OPENAI_API_KEY`) |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use portfolio_rag_core::query::AnswerGenerator;

use crate::config::LlmConfig;
use crate::retry::post_json_with_retry;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Always fails; the query still returns citations, with the error text as
/// the answer.
pub struct DisabledGenerator;

#[async_trait]
impl AnswerGenerator for DisabledGenerator {
    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        bail!("answer generation is disabled (set [llm].provider)")
    }
}

/// OpenAI chat completions.
pub struct OpenAiChat {
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            api_key,
            client,
        })
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiChat {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = self.request_body(system_prompt, user_prompt);
        let json = post_json_with_retry(
            &self.client,
            OPENAI_CHAT_URL,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
