//! YAML configuration file loading.
//!
//! Every field is optional: the file only overrides what it names, and the
//! environment layer fills in the rest.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8443
//!   tls_cert_path: /etc/parley/cert.pem
//!   tls_key_path: /etc/parley/key.pem
//! provider:
//!   name: openai
//!   model: gpt-4o-mini
//!   system_prompt: "You are a concise voice assistant."
//! conversation:
//!   greeting: "Hi! What can I do for you?"
//!   speaking_done:
//!     mode: client_ack
//! auth:
//!   required: true
//!   api_secrets:
//!     - id: web
//!       secret: s3cr3t
//! security:
//!   cors_allowed_origins: "*"
//!   max_connections_per_ip: 5
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{AuthApiSecret, ConfigError, ServerConfig, TlsConfig};
use crate::core::conversation::SpeakingDonePolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    #[serde(default)]
    server: Option<YamlServer>,
    #[serde(default)]
    provider: Option<YamlProvider>,
    #[serde(default)]
    conversation: Option<YamlConversation>,
    #[serde(default)]
    auth: Option<YamlAuth>,
    #[serde(default)]
    security: Option<YamlSecurity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlServer {
    host: Option<String>,
    port: Option<u16>,
    tls_cert_path: Option<PathBuf>,
    tls_key_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlProvider {
    name: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlConversation {
    greeting: Option<String>,
    speaking_done: Option<SpeakingDonePolicy>,
    idle_timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlAuth {
    required: Option<bool>,
    #[serde(default)]
    api_secrets: Vec<YamlApiSecret>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlApiSecret {
    id: String,
    secret: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlSecurity {
    cors_allowed_origins: Option<String>,
    rate_limit_requests_per_second: Option<u32>,
    rate_limit_burst_size: Option<u32>,
    max_websocket_connections: Option<usize>,
    max_connections_per_ip: Option<usize>,
}

/// Read and parse a YAML config file.
pub fn load(path: &Path) -> Result<YamlConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

macro_rules! override_field {
    ($target:expr, $value:expr) => {
        if let Some(value) = $value {
            $target = value;
        }
    };
}

impl YamlConfig {
    /// Lay this file's settings over an already-loaded configuration.
    pub fn apply(self, config: &mut ServerConfig) -> Result<(), ConfigError> {
        if let Some(server) = self.server {
            override_field!(config.host, server.host);
            override_field!(config.port, server.port);
            match (server.tls_cert_path, server.tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    config.tls = Some(TlsConfig {
                        cert_path,
                        key_path,
                    });
                }
                (None, None) => {}
                _ => {
                    return Err(ConfigError::Invalid(
                        "tls_cert_path and tls_key_path must be set together".to_string(),
                    ));
                }
            }
        }

        if let Some(provider) = self.provider {
            override_field!(config.provider, provider.name);
            override_field!(config.openai_api_key, provider.api_key.map(Some));
            override_field!(config.openai_base_url, provider.base_url.map(Some));
            override_field!(config.model, provider.model.map(Some));
            override_field!(config.system_prompt, provider.system_prompt.map(Some));
            override_field!(config.provider_timeout_seconds, provider.timeout_seconds);
        }

        if let Some(conversation) = self.conversation {
            override_field!(config.greeting, conversation.greeting.map(Some));
            override_field!(config.speaking_done, conversation.speaking_done);
            override_field!(
                config.idle_timeout_seconds,
                conversation.idle_timeout_seconds
            );
        }

        if let Some(auth) = self.auth {
            override_field!(config.auth_required, auth.required);
            if !auth.api_secrets.is_empty() {
                config.auth_secrets_from(auth.api_secrets);
            }
        }

        if let Some(security) = self.security {
            override_field!(
                config.cors_allowed_origins,
                security.cors_allowed_origins.map(Some)
            );
            override_field!(
                config.rate_limit_requests_per_second,
                security.rate_limit_requests_per_second
            );
            override_field!(config.rate_limit_burst_size, security.rate_limit_burst_size);
            override_field!(
                config.max_websocket_connections,
                security.max_websocket_connections.map(Some)
            );
            override_field!(config.max_connections_per_ip, security.max_connections_per_ip);
        }

        Ok(())
    }
}

impl ServerConfig {
    fn auth_secrets_from(&mut self, secrets: Vec<YamlApiSecret>) {
        self.auth_api_secrets = secrets
            .into_iter()
            .map(|s| AuthApiSecret {
                id: s.id,
                secret: s.secret,
            })
            .collect();
    }
}
