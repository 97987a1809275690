//! Azure OpenAI client: same wire format as OpenAI's Chat Completions API,
//! but addressed by resource endpoint + deployment name instead of model,
//! and authenticated with an `api-key` header rather than a bearer token.

use std::pin::Pin;

use async_trait::async_trait;
use cadence_harness::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use futures_util::Stream;
use serde::Deserialize;

use crate::client::{GenerateParams, GenerateResponse, ModelClient, ModelClientError};

const API_VERSION: &str = "2024-06-01";

pub struct AzureOpenAiClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    breaker: CircuitBreaker,
}

impl AzureOpenAiClient {
    /// `endpoint` is the resource URL, e.g. `https://my-resource.openai.azure.com`.
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            deployment: deployment.into(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            API_VERSION
        )
    }

    fn request_body(&self, prompt: &str, params: &GenerateParams) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(ref system) = params.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        serde_json::json!({
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": messages,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: Option<String>,
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
impl ModelClient for AzureOpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<GenerateResponse, ModelClientError> {
        let body = self.request_body(prompt, params);
        let url = self.chat_url();

        let resp = self
            .breaker
            .call(|| {
                self.client
                    .post(&url)
                    .header("api-key", &self.api_key)
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
            model: parsed.model.unwrap_or_else(|| self.deployment.clone()),
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
            "streaming not yet implemented for AzureOpenAiClient".into(),
        ))
    }

    async fn validate_connection(&self) -> bool {
        let url = format!(
            "{}/openai/deployments?api-version={}",
            self.endpoint.trim_end_matches('/'),
            API_VERSION
        );
        self.client
            .get(&url)
            .header("api-key", &self.api_key)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    fn provider_name(&self) -> &'static str {
        "azure_openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_embeds_deployment_and_api_version() {
        let client = AzureOpenAiClient::new("key", "https://my-resource.openai.azure.com", "gpt-4o");
        let url = client.chat_url();
        assert!(url.contains("/openai/deployments/gpt-4o/chat/completions"));
        assert!(url.contains(API_VERSION));
    }

    #[test]
    fn chat_url_handles_trailing_slash_on_endpoint() {
        let client = AzureOpenAiClient::new("key", "https://my-resource.openai.azure.com/", "gpt-4o");
        assert!(!client.chat_url().contains("azure.com//openai"));
    }
}
