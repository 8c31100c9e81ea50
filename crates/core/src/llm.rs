use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{error::LlmError, provider::Provider, usage::calculate_cost};

/// Token counts reported by the provider for one successful call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmUsage {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

/// Observes successful calls. Has no say in control flow.
pub trait UsageObserver: Send + Sync {
    fn record(&self, usage: &LlmUsage, prompt: &str);
}

/// Single-shot text completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, LlmError>;
}

/// OpenAI-compatible `/chat/completions` transport.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    observer: Option<Arc<dyn UsageObserver>>,
}

impl ChatCompletionsClient {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: provider.config().api_url.to_string(),
            api_key: api_key.into(),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn UsageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn report_usage(&self, response: &serde_json::Value, model: &str, prompt: &str) {
        let Some(observer) = &self.observer else {
            return;
        };
        let usage = &response["usage"];
        let (Some(prompt_tokens), Some(completion_tokens)) = (
            usage["prompt_tokens"].as_u64(),
            usage["completion_tokens"].as_u64(),
        ) else {
            debug!(model, "response carried no usage block");
            return;
        };
        let total_tokens = usage["total_tokens"]
            .as_u64()
            .unwrap_or(prompt_tokens + completion_tokens);

        observer.record(
            &LlmUsage {
                model: model.to_string(),
                prompt_tokens,
                completion_tokens,
                total_tokens,
                cost: calculate_cost(model, prompt_tokens, completion_tokens),
            },
            prompt,
        );
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, LlmError> {
        let started = std::time::Instant::now();
        let response = self
            .http
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": model,
                "messages": [
                    {
                        "role": "user",
                        "content": prompt,
                    },
                ],
            }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            warn!(model, "provider returned 429");
            return Err(LlmError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response = response.json::<serde_json::Value>().await?;
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                LlmError::InvalidResponse(format!("no message content in {response}"))
            })?
            .to_string();

        debug!(
            model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "llm call finished"
        );
        self.report_usage(&response, model, prompt);

        Ok(content)
    }
}
