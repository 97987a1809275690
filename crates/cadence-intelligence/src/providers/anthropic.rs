//! Anthropic Messages API client.

use std::pin::Pin;

use async_trait::async_trait;
use cadence_harness::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use futures_util::Stream;
use serde::Deserialize;

use crate::client::{GenerateParams, GenerateResponse, ModelClient, ModelClientError};

pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    breaker: CircuitBreaker,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(&self, prompt: &str, params: &GenerateParams) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(ref system) = params.system_prompt {
            body["system"] = serde_json::Value::String(system.clone());
        }
        body
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    _type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<GenerateResponse, ModelClientError> {
        let body = self.request_body(prompt, params);
        let url = format!("{}/v1/messages", self.base_url);

        let resp = self
            .breaker
            .call(|| {
                self.client
                    .post(&url)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", "2023-06-01")
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

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ModelClientError::ParseError(e.to_string()))?;
        let text = parsed
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerateResponse {
            text,
            model: parsed.model,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            finish_reason: parsed.stop_reason.unwrap_or_else(|| "unknown".into()),
        })
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _params: &GenerateParams,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, ModelClientError>> + Send>>, ModelClientError>
    {
        Err(ModelClientError::Unsupported(
            "streaming not yet implemented for AnthropicClient".into(),
        ))
    }

    async fn validate_connection(&self) -> bool {
        // Anthropic has no lightweight models endpoint; a minimal request
        // with a 1-token budget doubles as a credential check.
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "ping"}],
        });
        let url = format!("{}/v1/messages", self.base_url);
        self.client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_includes_system_field() {
        let client = AnthropicClient::new("sk-test", "claude-sonnet-4-20250514");
        let params = GenerateParams {
            system_prompt: Some("be concise".into()),
            ..GenerateParams::default()
        };
        let body = client.request_body("hi", &params);
        assert_eq!(body["system"], "be concise");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn request_body_omits_system_when_absent() {
        let client = AnthropicClient::new("sk-test", "claude-sonnet-4-20250514");
        let body = client.request_body("hi", &GenerateParams::default());
        assert!(body.get("system").is_none());
    }
}
