//! Concrete [`crate::client::ModelClient`] implementations, one per
//! supported provider.

pub mod anthropic;
pub mod azure_openai;
pub mod cohere;
pub mod groq;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use azure_openai::AzureOpenAiClient;
pub use cohere::CohereClient;
pub use groq::GroqClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
