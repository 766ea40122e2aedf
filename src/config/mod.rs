//! Server configuration.
//!
//! Configuration is resolved from three layers, highest priority first:
//! YAML file (when `--config` is given) > environment variables > `.env`
//! values loaded by dotenvy > built-in defaults.
//!
//! # Example
//! ```rust,no_run
//! use parley_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // YAML file with environment variable fallback
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::conversation::{DEFAULT_PROVIDER_TIMEOUT_SECS, SessionConfig, SpeakingDonePolicy};
use crate::core::provider::{ProviderConfig, supported_providers};
use crate::utils::validate_endpoint;

mod yaml;

pub use yaml::YamlConfig;

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// API secret authentication entry with a client identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthApiSecret {
    pub id: String,
    pub secret: String,
}

/// Server configuration
///
/// Everything needed to run the gateway: server settings (host, port, TLS),
/// provider selection and credentials, turn-taking policy, authentication,
/// and security settings (CORS, rate limiting, connection limits).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,

    // Provider settings
    /// Provider name ("openai" or "scripted")
    pub provider: String,
    /// OpenAI API key, required when provider is "openai"
    pub openai_api_key: Option<String>,
    /// Provider endpoint override (tests, proxies)
    pub openai_base_url: Option<String>,
    /// Model name passed through to the provider
    pub model: Option<String>,
    /// System instructions prepended to every dispatch
    pub system_prompt: Option<String>,
    /// Bound on each provider call
    pub provider_timeout_seconds: u64,

    // Conversation settings
    /// Scripted opening turn seeded on `start`
    pub greeting: Option<String>,
    /// How speaking completion is detected
    pub speaking_done: SpeakingDonePolicy,
    /// Close connections idle longer than this
    pub idle_timeout_seconds: u64,

    // Authentication configuration
    pub auth_api_secrets: Vec<AuthApiSecret>,
    pub auth_required: bool,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: u32,
    /// Global cap on concurrent WebSocket connections (None = unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Per-IP cap on concurrent WebSocket connections
    pub max_connections_per_ip: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            tls: None,
            provider: "scripted".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            model: None,
            system_prompt: None,
            provider_timeout_seconds: DEFAULT_PROVIDER_TIMEOUT_SECS,
            greeting: None,
            speaking_done: SpeakingDonePolicy::default(),
            idle_timeout_seconds: 300,
            auth_api_secrets: Vec::new(),
            auth_required: false,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_env_unchecked()?;
        config.validate()?;
        Ok(config)
    }

    /// Read the environment layer without cross-field validation, so a
    /// YAML layer on top can still complete a partial environment.
    fn from_env_unchecked() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tls = match (env::var("TLS_CERT_PATH").ok(), env::var("TLS_KEY_PATH").ok()) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
                ));
            }
        };

        let speaking_done = match env_opt("SPEAKING_DONE_MODE") {
            None => defaults.speaking_done,
            Some(mode) => match mode.as_str() {
                "estimated" => SpeakingDonePolicy::Estimated {
                    ms_per_char: parse_opt("SPEAKING_MS_PER_CHAR")?,
                    min_ms: None,
                    max_ms: None,
                },
                "client_ack" => SpeakingDonePolicy::ClientAck,
                other => {
                    return Err(ConfigError::InvalidVar {
                        var: "SPEAKING_DONE_MODE",
                        value: other.to_string(),
                    });
                }
            },
        };

        let config = Self {
            host: env_opt("HOST").unwrap_or(defaults.host),
            port: parse_opt("PORT")?.unwrap_or(defaults.port),
            tls,
            provider: env_opt("PROVIDER").unwrap_or(defaults.provider),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_base_url: env_opt("OPENAI_BASE_URL"),
            model: env_opt("MODEL"),
            system_prompt: env_opt("SYSTEM_PROMPT"),
            provider_timeout_seconds: parse_opt("PROVIDER_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.provider_timeout_seconds),
            greeting: env_opt("GREETING"),
            speaking_done,
            idle_timeout_seconds: parse_opt("IDLE_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.idle_timeout_seconds),
            auth_api_secrets: parse_api_secrets(env_opt("AUTH_API_SECRETS").as_deref())?,
            auth_required: parse_opt("AUTH_REQUIRED")?.unwrap_or(defaults.auth_required),
            cors_allowed_origins: env_opt("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: parse_opt("RATE_LIMIT_REQUESTS_PER_SECOND")?
                .unwrap_or(defaults.rate_limit_requests_per_second),
            rate_limit_burst_size: parse_opt("RATE_LIMIT_BURST_SIZE")?
                .unwrap_or(defaults.rate_limit_burst_size),
            max_websocket_connections: parse_opt("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: parse_opt("MAX_CONNECTIONS_PER_IP")?
                .unwrap_or(defaults.max_connections_per_ip),
        };

        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables as
    /// the fallback layer for anything the file leaves unset.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let mut config = Self::from_env_unchecked()?;
        let overrides = yaml::load(path)?;
        overrides.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Bind address in `host:port` form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn has_api_secret_auth(&self) -> bool {
        !self.auth_api_secrets.is_empty()
    }

    /// Provider-agnostic config handed to the provider factory.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.openai_api_key.clone(),
            model: self.model.clone(),
            base_url: self.openai_base_url.clone(),
            system_prompt: self.system_prompt.clone(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Per-session knobs handed to each new session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            greeting: self.greeting.clone(),
            speaking_done: self.speaking_done.clone(),
            provider_timeout: Duration::from_secs(self.provider_timeout_seconds),
        }
    }

    /// Check cross-field invariants. Called by every loader.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let supported = supported_providers();
        if !supported
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&self.provider))
        {
            return Err(ConfigError::Invalid(format!(
                "unknown provider '{}' (supported: {})",
                self.provider,
                supported.join(", ")
            )));
        }
        if self.provider.eq_ignore_ascii_case("openai") && self.openai_api_key.is_none() {
            return Err(ConfigError::Invalid(
                "OPENAI_API_KEY is required when provider is openai".to_string(),
            ));
        }
        if let Some(base_url) = &self.openai_base_url {
            validate_endpoint(base_url).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        if self.provider_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "provider timeout must be at least 1 second".to_string(),
            ));
        }
        if self.max_connections_per_ip == 0 {
            return Err(ConfigError::Invalid(
                "max connections per IP must be at least 1".to_string(),
            ));
        }
        if self.auth_required && !self.has_api_secret_auth() {
            return Err(ConfigError::Invalid(
                "AUTH_REQUIRED is set but no API secrets are configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read an env var, treating empty strings as unset.
fn env_opt(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

/// Read and parse an env var.
fn parse_opt<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env_opt(var) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar { var, value: raw }),
    }
}

/// Parse `id:secret,id:secret` pairs.
fn parse_api_secrets(raw: Option<&str>) -> Result<Vec<AuthApiSecret>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            entry
                .trim()
                .split_once(':')
                .filter(|(id, secret)| !id.is_empty() && !secret.is_empty())
                .map(|(id, secret)| AuthApiSecret {
                    id: id.to_string(),
                    secret: secret.to_string(),
                })
                .ok_or_else(|| ConfigError::InvalidVar {
                    var: "AUTH_API_SECRETS",
                    value: entry.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "HOST",
            "PORT",
            "TLS_CERT_PATH",
            "TLS_KEY_PATH",
            "PROVIDER",
            "OPENAI_API_KEY",
            "OPENAI_BASE_URL",
            "MODEL",
            "SYSTEM_PROMPT",
            "PROVIDER_TIMEOUT_SECONDS",
            "GREETING",
            "SPEAKING_DONE_MODE",
            "SPEAKING_MS_PER_CHAR",
            "IDLE_TIMEOUT_SECONDS",
            "AUTH_API_SECRETS",
            "AUTH_REQUIRED",
            "CORS_ALLOWED_ORIGINS",
            "RATE_LIMIT_REQUESTS_PER_SECOND",
            "RATE_LIMIT_BURST_SIZE",
            "MAX_WEBSOCKET_CONNECTIONS",
            "MAX_CONNECTIONS_PER_IP",
        ] {
            unsafe { env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.address(), "0.0.0.0:3000");
        assert_eq!(config.provider, "scripted");
        assert!(!config.auth_required);
        assert!(!config.is_tls_enabled());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        unsafe {
            env::set_var("HOST", "127.0.0.1");
            env::set_var("PORT", "8443");
            env::set_var("GREETING", "Hi! How can I help?");
            env::set_var("SPEAKING_DONE_MODE", "client_ack");
        }
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.address(), "127.0.0.1:8443");
        assert_eq!(config.greeting.as_deref(), Some("Hi! How can I help?"));
        assert_eq!(config.speaking_done, SpeakingDonePolicy::ClientAck);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_openai_provider_requires_key() {
        clear_env();
        unsafe { env::set_var("PROVIDER", "openai") };
        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        unsafe { env::set_var("OPENAI_API_KEY", "sk-test") };
        assert!(ServerConfig::from_env().is_ok());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_port_rejected() {
        clear_env();
        unsafe { env::set_var("PORT", "not-a-port") };
        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { var: "PORT", .. }));
        clear_env();
    }

    #[test]
    fn test_parse_api_secrets() {
        let secrets = parse_api_secrets(Some("a:sec1,b:sec2")).unwrap();
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].id, "a");
        assert_eq!(secrets[1].secret, "sec2");

        assert!(parse_api_secrets(Some("missing-separator")).is_err());
        assert!(parse_api_secrets(None).unwrap().is_empty());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let config = ServerConfig {
            provider: "acme".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_auth_required_without_secrets() {
        let config = ServerConfig {
            auth_required: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let config = ServerConfig {
            provider: "openai".to_string(),
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some("ftp://nope".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
