use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.config/cadence/config.toml`.
///
/// Every field has a default, so a fresh checkout runs with zero
/// configuration; secrets (JWT signing key, Redis URL) are read from the
/// environment variable *named* by the relevant `*_env` field rather than
/// stored in the file itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            events: EventsConfig::default(),
            queue: QueueConfig::default(),
            connections: ConnectionsConfig::default(),
            persistence: PersistenceConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `~/.config/cadence/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Sanity-check bounds that would otherwise surface as confusing
    /// runtime behavior much later (e.g. a zero-capacity rate limiter).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.access_token_ttl_minutes == 0 {
            return Err(ConfigError::Invalid(
                "auth.access_token_ttl_minutes must be > 0".into(),
            ));
        }
        if self.auth.refresh_token_ttl_days == 0 {
            return Err(ConfigError::Invalid(
                "auth.refresh_token_ttl_days must be > 0".into(),
            ));
        }
        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.requests_per_minute must be > 0".into(),
            ));
        }
        if self.events.buffer_size == 0 {
            return Err(ConfigError::Invalid("events.buffer_size must be > 0".into()));
        }
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("cadence")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("invalid: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            workspace_root: default_workspace_root(),
        }
    }
}

fn default_project_name() -> String {
    "cadence".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_workspace_root() -> String {
    "./workspaces".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_server_host() -> String {
    "127.0.0.1".into()
}
fn default_server_port() -> u16 {
    8787
}

/// §4.1 / §6: access+refresh token lifetimes and the env var the signing
/// secret is read from. The secret itself is never written to the config
/// file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_access_token_ttl_minutes")]
    pub access_token_ttl_minutes: u64,
    #[serde(default = "default_refresh_token_ttl_days")]
    pub refresh_token_ttl_days: u64,
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_minutes: default_access_token_ttl_minutes(),
            refresh_token_ttl_days: default_refresh_token_ttl_days(),
            jwt_secret_env: default_jwt_secret_env(),
            argon2_memory_kib: default_argon2_memory_kib(),
        }
    }
}

fn default_access_token_ttl_minutes() -> u64 {
    15
}
fn default_refresh_token_ttl_days() -> u64 {
    7
}
fn default_jwt_secret_env() -> String {
    "CADENCE_JWT_SECRET".into()
}
fn default_argon2_memory_kib() -> u32 {
    19_456
}

/// §4.2: per-identity token bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_requests_per_minute() -> u32 {
    60
}

/// §4.4: event bus flush thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

fn default_buffer_size() -> usize {
    50
}
fn default_batch_timeout_ms() -> u64 {
    100
}

/// §4.5: job queue defaults and the Redis connection env var.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_redis_url_env")]
    pub redis_url_env: String,
    #[serde(default = "default_worker_batch_size")]
    pub worker_batch_size: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            redis_url_env: default_redis_url_env(),
            worker_batch_size: default_worker_batch_size(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_timeout_seconds() -> u64 {
    300
}
fn default_redis_url_env() -> String {
    "CADENCE_REDIS_URL".into()
}
fn default_worker_batch_size() -> u32 {
    10
}

/// §4.3: connection registry idle sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default = "default_idle_session_timeout_seconds")]
    pub idle_session_timeout_seconds: u64,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            idle_session_timeout_seconds: default_idle_session_timeout_seconds(),
        }
    }
}

fn default_idle_session_timeout_seconds() -> u64 {
    600
}

/// Relational store location; an external collaborator per the spec, but
/// concretely realized here as SQLite so the repo is runnable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> String {
    "./cadence.db".into()
}

/// §4.7/C6: which env var each builtin model provider's credentials are
/// read from. `ollama` needs only a reachable base URL, every other
/// provider an API key; `azure_openai` additionally needs its endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_openai_api_key_env")]
    pub openai_api_key_env: String,
    #[serde(default = "default_azure_openai_api_key_env")]
    pub azure_openai_api_key_env: String,
    #[serde(default = "default_azure_openai_endpoint_env")]
    pub azure_openai_endpoint_env: String,
    #[serde(default = "default_groq_api_key_env")]
    pub groq_api_key_env: String,
    #[serde(default = "default_anthropic_api_key_env")]
    pub anthropic_api_key_env: String,
    #[serde(default = "default_cohere_api_key_env")]
    pub cohere_api_key_env: String,
    #[serde(default = "default_ollama_base_url_env")]
    pub ollama_base_url_env: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_api_key_env: default_openai_api_key_env(),
            azure_openai_api_key_env: default_azure_openai_api_key_env(),
            azure_openai_endpoint_env: default_azure_openai_endpoint_env(),
            groq_api_key_env: default_groq_api_key_env(),
            anthropic_api_key_env: default_anthropic_api_key_env(),
            cohere_api_key_env: default_cohere_api_key_env(),
            ollama_base_url_env: default_ollama_base_url_env(),
        }
    }
}

fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_azure_openai_api_key_env() -> String {
    "AZURE_OPENAI_API_KEY".into()
}
fn default_azure_openai_endpoint_env() -> String {
    "AZURE_OPENAI_ENDPOINT".into()
}
fn default_groq_api_key_env() -> String {
    "GROQ_API_KEY".into()
}
fn default_anthropic_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn default_cohere_api_key_env() -> String {
    "COHERE_API_KEY".into()
}
fn default_ollama_base_url_env() -> String {
    "OLLAMA_BASE_URL".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.rate_limit.requests_per_minute, 60);
        assert_eq!(cfg.queue.max_retries, 3);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [rate_limit]
            requests_per_minute = 120
            "#,
        )
        .unwrap();
        assert_eq!(cfg.rate_limit.requests_per_minute, 120);
        assert_eq!(cfg.auth.access_token_ttl_minutes, 15);
    }

    #[test]
    fn zero_buffer_size_is_invalid() {
        let mut cfg = Config::default();
        cfg.events.buffer_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = Config::default();
        let text = cfg.to_toml().unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.general.project_name, cfg.general.project_name);
    }
}
