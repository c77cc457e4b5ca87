// ABOUTME: Environment-driven server configuration with typed sub-configs
// ABOUTME: Parses ports, database URL, completion backend, JWT, CORS and turn timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{completion, defaults};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite:./data/chatstream.db` or `sqlite::memory:`
    pub url: String,
}

/// Completion backend configuration
#[derive(Clone)]
pub struct LlmConfig {
    /// Azure resource endpoint or OpenAI-compatible base URL
    pub endpoint: String,
    /// API key sent with every request
    pub api_key: String,
    /// Azure deployment name; `None` selects the plain OpenAI-compatible URL form
    pub deployment: Option<String>,
    /// Azure `api-version` query parameter
    pub api_version: String,
    /// Model identifier sent in the request body
    pub model: String,
    /// Output token cap for normal turns
    pub max_tokens: u32,
    /// Sampling temperature for normal turns
    pub temperature: f32,
    /// Timeout for establishing the connection
    pub connect_timeout_secs: u64,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Bearer token configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,
    /// Token lifetime in hours
    pub jwt_expiry_hours: i64,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_expiry_hours", &self.jwt_expiry_hours)
            .finish()
    }
}

/// CORS configuration
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Allowed origins; empty or `*` allows any origin
    pub allowed_origins: Vec<String>,
}

/// Attachment download configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Timeout for a single attachment download
    pub fetch_timeout_secs: u64,
}

/// Chat turn behavior
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Upper bound on the whole completion phase of a turn
    pub turn_timeout: Duration,
    /// Upper bound on the gap between two streamed chunks
    pub idle_timeout: Duration,
    /// Whether buffered (non-streaming) turns also generate a title
    pub title_on_non_streaming: bool,
    /// Output token cap for normal turns
    pub max_tokens: u32,
    /// Sampling temperature for normal turns
    pub temperature: f32,
    /// Surface upstream error detail in `error` events
    pub expose_error_detail: bool,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(60),
            title_on_non_streaming: false,
            max_tokens: completion::DEFAULT_MAX_TOKENS,
            temperature: completion::DEFAULT_TEMPERATURE,
            expose_error_detail: true,
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Persistence settings
    pub database: DatabaseConfig,
    /// Completion backend settings
    pub llm: LlmConfig,
    /// Bearer token settings
    pub auth: AuthConfig,
    /// CORS settings
    pub cors: CorsConfig,
    /// Attachment download settings
    pub storage: StorageConfig,
    /// Chat turn settings
    pub turn: TurnConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails to parse
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let environment = Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development"));

        let llm = LlmConfig {
            endpoint: env_var_or("LLM_ENDPOINT", "https://api.openai.com/v1"),
            api_key: env_var_or("LLM_API_KEY", ""),
            deployment: env::var("LLM_DEPLOYMENT").ok().filter(|d| !d.trim().is_empty()),
            api_version: env_var_or("LLM_API_VERSION", "2024-08-06"),
            model: env_var_or("LLM_MODEL", defaults::MODEL),
            max_tokens: parse_env("LLM_MAX_TOKENS", completion::DEFAULT_MAX_TOKENS)?,
            temperature: parse_env("LLM_TEMPERATURE", completion::DEFAULT_TEMPERATURE)?,
            connect_timeout_secs: parse_env("LLM_CONNECT_TIMEOUT_SECS", 10)?,
        };

        let turn = TurnConfig {
            turn_timeout: Duration::from_secs(parse_env("TURN_TIMEOUT_SECS", 300)?),
            idle_timeout: Duration::from_secs(parse_env("STREAM_IDLE_TIMEOUT_SECS", 60)?),
            title_on_non_streaming: parse_env("TITLE_ON_NON_STREAMING", false)?,
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            expose_error_detail: !environment.is_production(),
        };

        let config = Self {
            http_port: parse_env("HTTP_PORT", 8081)?,
            environment,
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:./data/chatstream.db"),
            },
            llm,
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
                jwt_expiry_hours: parse_env("JWT_EXPIRY_HOURS", 24)?,
            },
            cors: CorsConfig {
                allowed_origins: parse_origins(&env_var_or("CORS_ALLOWED_ORIGINS", "*")),
            },
            storage: StorageConfig {
                fetch_timeout_secs: parse_env("STORAGE_FETCH_TIMEOUT_SECS", 30)?,
            },
            turn,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot work at runtime
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 16 {
            anyhow::bail!("JWT_SECRET must be at least 16 characters");
        }
        if self.llm.endpoint.trim().is_empty() {
            anyhow::bail!("LLM_ENDPOINT must not be empty");
        }
        if self.environment.is_production() && self.llm.api_key.is_empty() {
            anyhow::bail!("LLM_API_KEY must be set in production");
        }
        if self.turn.idle_timeout > self.turn.turn_timeout {
            anyhow::bail!("STREAM_IDLE_TIMEOUT_SECS must not exceed TURN_TIMEOUT_SECS");
        }
        Ok(())
    }

    /// One-line, secret-free description for startup logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "environment={} http_port={} database={} llm_endpoint={} deployment={} model={} cors_origins={} turn_timeout={}s idle_timeout={}s title_on_non_streaming={}",
            self.environment,
            self.http_port,
            redact_database_url(&self.database.url),
            self.llm.endpoint,
            self.llm.deployment.as_deref().unwrap_or("-"),
            self.llm.model,
            self.cors.allowed_origins.join(","),
            self.turn.turn_timeout.as_secs(),
            self.turn.idle_timeout.as_secs(),
            self.turn.title_on_non_streaming,
        )
    }
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {raw}")),
        _ => Ok(default),
    }
}

/// Parse comma-separated CORS origins
fn parse_origins(origins_str: &str) -> Vec<String> {
    if origins_str.trim() == "*" {
        vec!["*".to_owned()]
    } else {
        origins_str
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn redact_database_url(url: &str) -> String {
    url.split_once('@')
        .and_then(|(prefix, host)| {
            prefix
                .split_once("://")
                .map(|(scheme, _)| format!("{scheme}://***@{host}"))
        })
        .unwrap_or_else(|| url.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "JWT_SECRET",
        "HTTP_PORT",
        "ENVIRONMENT",
        "LLM_DEPLOYMENT",
        "TITLE_ON_NON_STREAMING",
        "CORS_ALLOWED_ORIGINS",
        "TURN_TIMEOUT_SECS",
        "STREAM_IDLE_TIMEOUT_SECS",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_with_secret() {
        clear();
        env::set_var("JWT_SECRET", "a-sufficiently-long-secret");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.http_port, 8081);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.llm.deployment.is_none());
        assert!(!config.turn.title_on_non_streaming);
        assert_eq!(config.cors.allowed_origins, vec!["*".to_owned()]);
        assert!(!config.summary().contains("a-sufficiently-long-secret"));

        clear();
    }

    #[test]
    #[serial]
    fn test_missing_secret_fails() {
        clear();
        assert!(ServerConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        env::set_var("JWT_SECRET", "a-sufficiently-long-secret");
        env::set_var("HTTP_PORT", "9000");
        env::set_var("LLM_DEPLOYMENT", "gpt-4o-prod");
        env::set_var("TITLE_ON_NON_STREAMING", "true");
        env::set_var("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.llm.deployment.as_deref(), Some("gpt-4o-prod"));
        assert!(config.turn.title_on_non_streaming);
        assert_eq!(config.cors.allowed_origins.len(), 2);

        clear();
    }

    #[test]
    #[serial]
    fn test_idle_timeout_must_fit_turn_timeout() {
        clear();
        env::set_var("JWT_SECRET", "a-sufficiently-long-secret");
        env::set_var("TURN_TIMEOUT_SECS", "10");
        env::set_var("STREAM_IDLE_TIMEOUT_SECS", "20");

        assert!(ServerConfig::from_env().is_err());

        clear();
    }

    #[test]
    fn test_redact_database_url() {
        assert_eq!(
            redact_database_url("postgres://user:pw@db:5432/chat"),
            "postgres://***@db:5432/chat"
        );
        assert_eq!(redact_database_url("sqlite::memory:"), "sqlite::memory:");
    }
}
