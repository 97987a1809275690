//! Provider-agnostic model client contract.
//!
//! Every concrete client (OpenAI, Azure OpenAI, Groq, Ollama, Anthropic,
//! Cohere) implements [`ModelClient`] and is otherwise free to shape its
//! wire format however its backend requires.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelClientError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("request timed out")]
    Timeout,

    #[error("circuit open for this provider")]
    CircuitOpen,

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<reqwest::Error> for ModelClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelClientError::Timeout
        } else {
            ModelClientError::HttpError(err.to_string())
        }
    }
}

impl From<cadence_harness::circuit_breaker::CircuitBreakerError> for ModelClientError {
    fn from(err: cadence_harness::circuit_breaker::CircuitBreakerError) -> Self {
        use cadence_harness::circuit_breaker::CircuitBreakerError as E;
        match err {
            E::Open => ModelClientError::CircuitOpen,
            E::Timeout(_) => ModelClientError::Timeout,
            E::Inner(msg) => ModelClientError::HttpError(msg),
        }
    }
}

/// Generation parameters shared by every provider. `extra` carries
/// provider-specific knobs (e.g. `top_p`, `stop_sequences`) that don't
/// warrant a dedicated field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: None,
            extra: serde_json::Value::Null,
        }
    }
}

/// Result of a completed (non-streamed) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub finish_reason: String,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send a single prompt and return the full response text.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<GenerateResponse, ModelClientError>;

    /// Stream a completion as it is produced. Providers without native
    /// streaming support return `Err(ModelClientError::Unsupported(...))`.
    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, ModelClientError>> + Send>>, ModelClientError>;

    /// Cheap connectivity/credential probe used by the workflow driver
    /// before committing a stage to this client.
    async fn validate_connection(&self) -> bool;

    fn provider_name(&self) -> &'static str;
}

impl fmt::Debug for dyn ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelClient({})", self.provider_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_reasonable() {
        let params = GenerateParams::default();
        assert!(params.max_tokens > 0);
        assert!(params.temperature > 0.0);
        assert!(params.system_prompt.is_none());
    }

    #[test]
    fn error_display_messages() {
        let e = ModelClientError::ApiError {
            status: 429,
            message: "slow down".into(),
        };
        assert!(e.to_string().contains("429"));
        assert!(e.to_string().contains("slow down"));

        let e = ModelClientError::CircuitOpen;
        assert!(e.to_string().contains("circuit"));
    }

    #[test]
    fn circuit_breaker_error_maps_to_model_client_error() {
        use cadence_harness::circuit_breaker::CircuitBreakerError;
        let mapped: ModelClientError = CircuitBreakerError::Open.into();
        assert!(matches!(mapped, ModelClientError::CircuitOpen));
    }
}
