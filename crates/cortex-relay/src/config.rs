//! Relay configuration.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file, the
//! prefixed environment (`CORTEX_RELAY_UPSTREAM__ACCOUNT`, ...), then the
//! flat variables the service has always read (`SNOWFLAKE_ACCOUNT`,
//! `SNOWFLAKE_PAT`, `SNOWFLAKE_DB`, `SNOWFLAKE_SCHEMA`, `API_KEY`).
//!
//! The loaded value is validated once and then shared read-only.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cortex_relay_protocol::AgentDescriptor;

pub const APP_NAME: &str = "cortex-relay";

const ENV_PREFIX: &str = "CORTEX_RELAY";

const DEFAULT_SYSTEM_PROMPT: &str = "Français uniquement. \
Texte simple, pas de Markdown (# interdit). \
Réponse concise et orientée business. \
Ne produis AUCUN texte d'étapes, de statut ou de raisonnement \
(pas de thinking, pas de status). \
Réponds directement par le résultat final.";

/// Legacy flat environment variables and the key each one sets.
const LEGACY_ENV: [(&str, &str); 5] = [
    ("SNOWFLAKE_ACCOUNT", "upstream.account"),
    ("SNOWFLAKE_PAT", "upstream.token"),
    ("SNOWFLAKE_DB", "upstream.database"),
    ("SNOWFLAKE_SCHEMA", "upstream.schema"),
    ("API_KEY", "auth.api_key"),
];

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{key}` (set {env} or {key} in the config file)")]
    Missing { key: &'static str, env: &'static str },

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
    pub agents: Vec<AgentDescriptor>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            auth: AuthConfig::default(),
            agents: cortex_relay_protocol::default_catalog(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Upstream agent service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Account identifier; the host is derived from it.
    pub account: String,
    /// Bearer credential (programmatic access token).
    pub token: String,
    pub database: String,
    pub schema: String,
    /// Overrides the account-derived base URL.
    pub base_url: Option<String>,
    pub connect_timeout_secs: u64,
    /// Bound on the whole exchange, streaming included.
    pub read_timeout_secs: u64,
    /// Dialogue turns forwarded with each request.
    pub max_turns: usize,
    /// Characters of an upstream error body relayed to the client.
    pub error_body_limit: usize,
    pub system_prompt: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            token: String::new(),
            database: String::new(),
            schema: String::new(),
            base_url: None,
            connect_timeout_secs: 10,
            read_timeout_secs: 180,
            max_turns: 5,
            error_body_limit: 2000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }

    /// Run endpoint for `agent`.
    pub fn run_url(&self, agent: &str) -> String {
        format!(
            "{}/api/v2/databases/{}/schemas/{}/agents/{}:run",
            self.base_url(),
            self.database,
            self.schema,
            agent
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Inbound authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret expected in `x-api-key`. Unset or empty disables the check.
    pub api_key: Option<String>,
}

impl AuthConfig {
    pub fn required_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

impl RelayConfig {
    /// Load from `path` (if it exists) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );
        for (var, key) in LEGACY_ENV {
            let value = env::var(var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        let config: RelayConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything the relay needs before it can serve a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (&self.upstream.account, "upstream.account", "SNOWFLAKE_ACCOUNT"),
            (&self.upstream.token, "upstream.token", "SNOWFLAKE_PAT"),
            (&self.upstream.database, "upstream.database", "SNOWFLAKE_DB"),
            (&self.upstream.schema, "upstream.schema", "SNOWFLAKE_SCHEMA"),
        ];
        for (value, key, env) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing { key, env });
            }
        }

        if self.upstream.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "upstream.connect_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.upstream.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "upstream.read_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.upstream.max_turns == 0 {
            return Err(ConfigError::Invalid {
                key: "upstream.max_turns",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.agents.is_empty() {
            return Err(ConfigError::Invalid {
                key: "agents",
                reason: "at least one agent must be configured".to_string(),
            });
        }
        Ok(())
    }

    /// Upstream agent identifiers accepted by `/chat/stream`, sorted.
    pub fn allowed_agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self
            .agents
            .iter()
            .map(|a| a.upstream_agent.clone())
            .collect();
        agents.sort();
        agents.dedup();
        agents
    }

    pub fn is_allowed(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a.upstream_agent == agent)
    }

    /// Copy with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.upstream.token.is_empty() {
            copy.upstream.token = "********".to_string();
        }
        if copy.auth.required_key().is_some() {
            copy.auth.api_key = Some("********".to_string());
        }
        copy
    }
}

/// Default config file location (`$XDG_CONFIG_HOME/cortex-relay/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir).join(APP_NAME).join("config.toml"));
    }

    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|dir| dir.join(APP_NAME).join("config.toml"))
}
