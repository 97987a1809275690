//! Builds and caches [`ModelClient`] instances by `(provider, model)`.
//!
//! New providers register a factory under a name; the registry itself
//! has no built-in knowledge of any particular backend beyond the six
//! wired up by [`ClientRegistry::with_builtin_providers`].

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::{ModelClient, ModelClientError};
use crate::providers::{
    AnthropicClient, AzureOpenAiClient, CohereClient, GroqClient, OllamaClient, OpenAiClient,
};

/// Connection details a factory needs to build a client. Not every field
/// applies to every provider (e.g. `deployment` is Azure-only).
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub deployment: Option<String>,
}

type Factory = Arc<
    dyn Fn(&str, &ProviderCredentials) -> Result<Arc<dyn ModelClient>, ModelClientError>
        + Send
        + Sync,
>;

pub struct ClientRegistry {
    factories: DashMap<String, Factory>,
    cache: DashMap<(String, String), Arc<dyn ModelClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// A registry pre-populated with the six providers this workspace ships.
    pub fn with_builtin_providers() -> Self {
        let registry = Self::new();
        registry.register_provider("openai", |model, creds| {
            let key = creds
                .api_key
                .clone()
                .ok_or_else(|| ModelClientError::HttpError("openai: missing api_key".into()))?;
            let mut client = OpenAiClient::new(key, model);
            if let Some(base_url) = &creds.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Ok(Arc::new(client) as Arc<dyn ModelClient>)
        });
        registry.register_provider("azure_openai", |model, creds| {
            let key = creds
                .api_key
                .clone()
                .ok_or_else(|| ModelClientError::HttpError("azure_openai: missing api_key".into()))?;
            let endpoint = creds.base_url.clone().ok_or_else(|| {
                ModelClientError::HttpError("azure_openai: missing base_url (endpoint)".into())
            })?;
            let deployment = creds.deployment.clone().unwrap_or_else(|| model.to_string());
            Ok(Arc::new(AzureOpenAiClient::new(key, endpoint, deployment)) as Arc<dyn ModelClient>)
        });
        registry.register_provider("groq", |model, creds| {
            let key = creds
                .api_key
                .clone()
                .ok_or_else(|| ModelClientError::HttpError("groq: missing api_key".into()))?;
            let mut client = GroqClient::new(key, model);
            if let Some(base_url) = &creds.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Ok(Arc::new(client) as Arc<dyn ModelClient>)
        });
        registry.register_provider("ollama", |model, creds| {
            let base_url = creds
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Arc::new(OllamaClient::new(base_url, model)) as Arc<dyn ModelClient>)
        });
        registry.register_provider("anthropic", |model, creds| {
            let key = creds
                .api_key
                .clone()
                .ok_or_else(|| ModelClientError::HttpError("anthropic: missing api_key".into()))?;
            let mut client = AnthropicClient::new(key, model);
            if let Some(base_url) = &creds.base_url {
                client = client.with_base_url(base_url.clone());
            }
            Ok(Arc::new(client) as Arc<dyn ModelClient>)
        });
        registry.register_provider("cohere", |model, creds| {
            let key = creds
                .api_key
                .clone()
                .ok_or_else(|| ModelClientError::HttpError("cohere: missing api_key".into()))?;
            Ok(Arc::new(CohereClient::new(key, model)) as Arc<dyn ModelClient>)
        });
        registry
    }

    pub fn register_provider<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&str, &ProviderCredentials) -> Result<Arc<dyn ModelClient>, ModelClientError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Fetch (building and caching if absent) a client for `provider`/`model`.
    /// `cache = false` bypasses the cache in both directions — used for
    /// one-off connection tests so credentials aren't retained.
    pub fn client(
        &self,
        provider: &str,
        model: &str,
        credentials: &ProviderCredentials,
        cache: bool,
    ) -> Result<Arc<dyn ModelClient>, ModelClientError> {
        let cache_key = (provider.to_string(), model.to_string());
        if cache {
            if let Some(existing) = self.cache.get(&cache_key) {
                return Ok(existing.clone());
            }
        }

        let factory = self.factories.get(provider).ok_or_else(|| {
            ModelClientError::Unsupported(format!("no provider registered for `{provider}`"))
        })?;
        let client = factory(model, credentials)?;

        if cache {
            self.cache.insert(cache_key, client.clone());
        }
        Ok(client)
    }

    pub fn cached_client_count(&self) -> usize {
        self.cache.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_builtin_providers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let registry = ClientRegistry::with_builtin_providers();
        let result = registry.client("does-not-exist", "model", &ProviderCredentials::default(), true);
        assert!(matches!(result, Err(ModelClientError::Unsupported(_))));
    }

    #[test]
    fn missing_api_key_is_rejected_before_caching() {
        let registry = ClientRegistry::with_builtin_providers();
        let result = registry.client("openai", "gpt-4", &ProviderCredentials::default(), true);
        assert!(result.is_err());
        assert_eq!(registry.cached_client_count(), 0);
    }

    #[test]
    fn same_provider_and_model_reuses_cached_client() {
        let registry = ClientRegistry::with_builtin_providers();
        let creds = ProviderCredentials {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let first = registry.client("openai", "gpt-4", &creds, true).unwrap();
        let second = registry.client("openai", "gpt-4", &creds, true).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_client_count(), 1);
    }

    #[test]
    fn cache_false_never_populates_the_cache() {
        let registry = ClientRegistry::with_builtin_providers();
        let creds = ProviderCredentials {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        registry.client("openai", "gpt-4", &creds, false).unwrap();
        assert_eq!(registry.cached_client_count(), 0);
    }

    #[test]
    fn ollama_requires_no_api_key() {
        let registry = ClientRegistry::with_builtin_providers();
        let result = registry.client("ollama", "llama3", &ProviderCredentials::default(), false);
        assert!(result.is_ok());
    }

    #[test]
    fn azure_openai_requires_endpoint_as_base_url() {
        let registry = ClientRegistry::with_builtin_providers();
        let creds = ProviderCredentials {
            api_key: Some("key".into()),
            ..Default::default()
        };
        let result = registry.client("azure_openai", "gpt-4o", &creds, false);
        assert!(result.is_err());
    }

    #[test]
    fn custom_provider_can_be_registered() {
        let registry = ClientRegistry::new();
        registry.register_provider("stub", |_model, _creds| {
            Err(ModelClientError::Unsupported("stub always fails".into()))
        });
        let result = registry.client("stub", "model", &ProviderCredentials::default(), false);
        assert!(matches!(result, Err(ModelClientError::Unsupported(_))));
    }
}
