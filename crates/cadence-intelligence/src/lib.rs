//! Provider-agnostic LLM client registry: a [`client::ModelClient`]
//! contract implemented by six concrete providers, cached by
//! `(provider, model)` and wrapped in a circuit breaker per client.

pub mod client;
pub mod providers;
pub mod registry;

pub use client::{GenerateParams, GenerateResponse, ModelClient, ModelClientError};
pub use registry::{ClientRegistry, ProviderCredentials};
