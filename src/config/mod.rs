//! Configuration management
//!
//! This module handles loading and parsing configuration for Quillboard.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Session secret used when none is configured. Fine for development only.
pub const DEFAULT_SESSION_SECRET: &str = "dev-secret-key";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Content generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Secret used to sign session cookies
    #[serde(default = "default_session_secret")]
    pub session_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_secret: default_session_secret(),
        }
    }
}

impl ServerConfig {
    /// Whether the built-in development secret is still in use
    pub fn uses_default_secret(&self) -> bool {
        self.session_secret == DEFAULT_SESSION_SECRET
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_session_secret() -> String {
    DEFAULT_SESSION_SECRET.to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/quillboard.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How long a login session stays valid
    #[serde(default = "default_session_expiration_days")]
    pub session_expiration_days: i64,
    /// Minimum password length accepted at registration
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    /// Admin account created when the users table is empty
    #[serde(default = "default_bootstrap_admin")]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiration_days: default_session_expiration_days(),
            min_password_length: default_min_password_length(),
            bootstrap_admin: default_bootstrap_admin(),
        }
    }
}

fn default_session_expiration_days() -> i64 {
    7
}

fn default_min_password_length() -> usize {
    8
}

fn default_bootstrap_admin() -> Option<BootstrapAdmin> {
    Some(BootstrapAdmin::default())
}

/// Credentials for the bootstrap admin account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl Default for BootstrapAdmin {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

/// Content generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Providers to try, in order
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderKind>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    /// Maximum tokens requested from the provider
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Timeout for a single provider call
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_providers() -> Vec<ProviderKind> {
    vec![ProviderKind::Openai, ProviderKind::Anthropic]
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_seconds() -> u64 {
    120
}

/// Content generation provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
}

impl ProviderKind {
    /// Service name under which the provider's API key is stored
    pub fn service_name(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - QUILLBOARD_SERVER_HOST
    /// - QUILLBOARD_SERVER_PORT (or PORT)
    /// - QUILLBOARD_SESSION_SECRET (or SESSION_SECRET)
    /// - QUILLBOARD_DATABASE_DRIVER
    /// - QUILLBOARD_DATABASE_URL (or DATABASE_URL)
    /// - QUILLBOARD_ADMIN_USERNAME
    /// - QUILLBOARD_ADMIN_PASSWORD
    /// - QUILLBOARD_GENERATION_TIMEOUT_SECONDS
    ///
    /// The prefixed names win over the bare ones.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("QUILLBOARD_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_first(&["QUILLBOARD_SERVER_PORT", "PORT"]) {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Some(secret) = env_first(&["QUILLBOARD_SESSION_SECRET", "SESSION_SECRET"]) {
            self.server.session_secret = secret;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("QUILLBOARD_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Some(url) = env_first(&["QUILLBOARD_DATABASE_URL", "DATABASE_URL"]) {
            self.database.url = url;
        }

        // Bootstrap admin
        let username = std::env::var("QUILLBOARD_ADMIN_USERNAME").ok();
        let password = std::env::var("QUILLBOARD_ADMIN_PASSWORD").ok();
        if username.is_some() || password.is_some() {
            let admin = self
                .auth
                .bootstrap_admin
                .get_or_insert_with(BootstrapAdmin::default);
            if let Some(username) = username {
                admin.username = username;
            }
            if let Some(password) = password {
                admin.password = password;
            }
        }

        // Generation
        if let Ok(timeout) = std::env::var("QUILLBOARD_GENERATION_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.generation.timeout_seconds = timeout;
            }
        }
    }

    /// Reject values that would make the server unusable
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.session_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.session_secret cannot be empty".to_string(),
            ));
        }
        if self.auth.session_expiration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_expiration_days must be positive".to_string(),
            ));
        }
        if self.generation.providers.is_empty() {
            return Err(ConfigError::ValidationError(
                "generation.providers must list at least one provider".to_string(),
            ));
        }
        Ok(())
    }
}

/// First set environment variable among `names`
fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
