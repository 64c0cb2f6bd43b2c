//! Configuration management for sqlgate
//!
//! Loads configuration with priority:
//! 1. config.toml (or specified config file)
//! 2. Environment variables (for `${VAR}` references and API keys)
//! 3. Defaults

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// sqlgate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Proposer model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model provider (gemini, openai)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key (can reference env var with ${VAR_NAME})
    pub api_key: Option<String>,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Override for OpenAI-compatible endpoints
    pub base_url: Option<String>,

    #[serde(default)]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Connection settings for the target databases.
///
/// A request names a database; every database is reached with the same
/// host and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_user")]
    pub user: String,

    pub password: Option<String>,

    /// Database used when a request does not name one
    #[serde(default = "default_db_name")]
    pub default_db: String,

    /// Schema whose tables are exposed to the proposer
    #[serde(default = "default_db_schema")]
    pub schema: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Maximum number of rows returned by a read
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

/// Conversation state machine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Entries kept per user session, oldest dropped first
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Top retrieval score below which a follow-up request is answered with
    /// a clarifying question
    #[serde(default = "default_clarification_threshold")]
    pub clarification_threshold: f32,

    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
}

/// Long-term retrieval index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// JSON file the index is loaded from at startup and saved to at shutdown
    pub index_path: Option<PathBuf>,

    /// Maximum characters of sample values kept in a column document
    #[serde(default = "default_column_sample_chars")]
    pub column_sample_chars: usize,

    /// Sample values fetched per column when building the schema index
    #[serde(default = "default_sample_limit")]
    pub sample_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model_name: default_model_name(),
            base_url: None,
            temperature: 0.0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: None,
            default_db: default_db_name(),
            schema: default_db_schema(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            max_rows: default_max_rows(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            clarification_threshold: default_clarification_threshold(),
            retrieval_top_k: default_retrieval_top_k(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            column_sample_chars: default_column_sample_chars(),
            sample_limit: default_sample_limit(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logs: false,
        }
    }
}

impl GateConfig {
    /// Load configuration from config.toml in the current directory or a parent
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            Self::find_config_file()?
        };

        tracing::debug!("Loading configuration from: {:?}", config_path);

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))
    }

    /// Parse configuration from TOML text and resolve environment references
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: GateConfig = toml::from_str(contents)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Find config.toml by searching current directory and parents
    fn find_config_file() -> Result<PathBuf> {
        let mut current = env::current_dir()?;

        loop {
            let config_path = current.join("config.toml");
            if config_path.exists() {
                return Ok(config_path);
            }

            if !current.pop() {
                break;
            }
        }

        Err(anyhow!(
            "config.toml not found. Create one with: cp config.toml.example config.toml"
        ))
    }

    /// Resolve ${VAR_NAME} references to environment variables
    fn resolve_env_vars(&mut self) {
        let key_var = match self.model.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GEMINI_API_KEY",
        };

        self.model.api_key = match self.model.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                Self::resolve_env_var(key).or_else(|| env::var(key_var).ok())
            }
            // No api_key in config, try environment variable as fallback
            _ => env::var(key_var).ok(),
        };

        if let Some(ref url) = self.model.base_url {
            self.model.base_url = Self::resolve_env_var(url);
        }

        if let Some(ref password) = self.database.password {
            self.database.password = Self::resolve_env_var(password);
        }
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.conversation.max_history == 0 {
            return Err(anyhow!("conversation.max_history must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.conversation.clarification_threshold) {
            return Err(anyhow!(
                "conversation.clarification_threshold must be within [0, 1], got {}",
                self.conversation.clarification_threshold
            ));
        }
        Ok(())
    }

    /// Get the proposer API key with a clear error message
    pub fn api_key(&self) -> Result<String> {
        self.model.api_key.clone().ok_or_else(|| {
            anyhow!(
                "API key not found. Configure it in config.toml:\n\
                [model]\n\
                api_key = \"${{GEMINI_API_KEY}}\"\n\
                \n\
                Or set environment variable:\n\
                export GEMINI_API_KEY=\"your-key\""
            )
        })
    }

    /// Create test-friendly defaults (no API key or database required)
    pub fn test_defaults() -> Self {
        Self {
            model: ModelConfig {
                provider: "test".to_string(),
                api_key: Some("test-api-key".to_string()),
                model_name: "test-model".to_string(),
                base_url: None,
                temperature: 0.0,
            },
            database: DatabaseConfig {
                default_db: "test_db".to_string(),
                ..DatabaseConfig::default()
            },
            ..Self::default()
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model_name() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "postgres".to_string()
}

fn default_db_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_max_rows() -> usize {
    1000
}

fn default_max_history() -> usize {
    200
}

fn default_clarification_threshold() -> f32 {
    0.35
}

fn default_retrieval_top_k() -> usize {
    3
}

fn default_column_sample_chars() -> usize {
    200
}

fn default_sample_limit() -> i64 {
    5
}

fn default_service_name() -> String {
    "sqlgate".to_string()
}
