//! Cohere Chat API client.

use std::pin::Pin;

use async_trait::async_trait;
use cadence_harness::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use futures_util::Stream;
use serde::Deserialize;

use crate::client::{GenerateParams, GenerateResponse, ModelClient, ModelClientError};

pub struct CohereClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    breaker: CircuitBreaker,
}

impl CohereClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.cohere.com".to_string(),
            model: model.into(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    fn request_body(&self, prompt: &str, params: &GenerateParams) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "message": prompt,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });
        if let Some(ref system) = params.system_prompt {
            body["preamble"] = serde_json::Value::String(system.clone());
        }
        body
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    text: String,
    #[serde(default)]
    finish_reason: Option<String>,
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    billed_units: Option<BilledUnits>,
}

#[derive(Deserialize)]
struct BilledUnits {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[async_trait]
impl ModelClient for CohereClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<GenerateResponse, ModelClientError> {
        let body = self.request_body(prompt, params);
        let url = format!("{}/v1/chat", self.base_url);

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
        let billed = parsed.meta.as_ref().and_then(|m| m.billed_units.as_ref());

        Ok(GenerateResponse {
            text: parsed.text,
            model: self.model.clone(),
            input_tokens: billed.and_then(|b| b.input_tokens).unwrap_or(0),
            output_tokens: billed.and_then(|b| b.output_tokens).unwrap_or(0),
            finish_reason: parsed.finish_reason.unwrap_or_else(|| "unknown".into()),
        })
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _params: &GenerateParams,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, ModelClientError>> + Send>>, ModelClientError>
    {
        Err(ModelClientError::Unsupported(
            "streaming not yet implemented for CohereClient".into(),
        ))
    }

    async fn validate_connection(&self) -> bool {
        let url = format!("{}/v1/models/{}", self.base_url, self.model);
        self.client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map(|resp| resp.status().is_success())
            .unwrap_or(false)
    }

    fn provider_name(&self) -> &'static str {
        "cohere"
    }
}
