//! Local inference via Ollama's OpenAI-compatible `/v1/chat/completions`
//! endpoint. No API key. Requests are serialized through a small
//! semaphore so a burst of concurrent stages doesn't overwhelm a single
//! local model server.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use cadence_harness::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::client::{GenerateParams, GenerateResponse, ModelClient, ModelClientError};

fn max_concurrent() -> usize {
    std::env::var("CADENCE_OLLAMA_MAX_CONCURRENT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

fn gate() -> Arc<Semaphore> {
    static GATE: OnceLock<Arc<Semaphore>> = OnceLock::new();
    GATE.get_or_init(|| Arc::new(Semaphore::new(max_concurrent()))).clone()
}

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    breaker: CircuitBreaker,
}

impl OllamaClient {
    /// `base_url` defaults to `http://localhost:11434` when not overridden.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
            model: model.into(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: Option<String>,
    usage: Option<Usage>,
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
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<GenerateResponse, ModelClientError> {
        let _permit = gate()
            .acquire_owned()
            .await
            .map_err(|_| ModelClientError::HttpError("local model queue unavailable".into()))?;

        let mut messages = Vec::new();
        if let Some(ref system) = params.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "messages": messages,
        });

        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self
            .breaker
            .call(|| self.client.post(&url).json(&body).send())
            .await?;

        let status = resp.status().as_u16();
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
            .ok_or_else(|| ModelClientError::ParseError("no choices in local response".into()))?;
        let usage = parsed.usage.as_ref();

        Ok(GenerateResponse {
            text: choice.message.content.unwrap_or_default(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            input_tokens: usage.and_then(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: usage.and_then(|u| u.completion_tokens).unwrap_or(0),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
        })
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _params: &GenerateParams,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, ModelClientError>> + Send>>, ModelClientError>
    {
        Err(ModelClientError::Unsupported(
            "streaming not yet implemented for OllamaClient".into(),
        ))
    }

    async fn validate_connection(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_stores_configured_base_url() {
        let client = OllamaClient::new("http://localhost:11434", "llama3");
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model, "llama3");
    }
}
