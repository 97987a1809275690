//! OpenAI Chat Completions client.

use std::pin::Pin;

use async_trait::async_trait;
use cadence_harness::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use futures_util::Stream;
use serde::Deserialize;

use crate::client::{GenerateParams, GenerateResponse, ModelClient, ModelClientError};

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    breaker: CircuitBreaker,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            model: model.into(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(&self, prompt: &str, params: &GenerateParams) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(ref system) = params.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": messages,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageResp,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<GenerateResponse, ModelClientError> {
        let body = self.request_body(prompt, params);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let resp = self
            .breaker
            .call(|| {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&body)
                    .send()
            })
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(ModelClientError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelClientError::ApiError {
                status,
                message: text,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ModelClientError::ParseError(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelClientError::ParseError("no choices in response".into()))?;

        Ok(GenerateResponse {
            text: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "unknown".into()),
        })
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _params: &GenerateParams,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, ModelClientError>> + Send>>, ModelClientError>
    {
        Err(ModelClientError::Unsupported(
            "streaming not yet implemented for OpenAiClient".into(),
        ))
    }

    async fn validate_connection(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        self.client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
