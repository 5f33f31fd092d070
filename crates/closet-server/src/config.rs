//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/closet";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default OpenAI chat completions endpoint.
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default OpenAI vision model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Default Gemini image generation endpoint.
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp:generateContent";

/// Default delay between document extraction status polls, in seconds.
pub const DEFAULT_EXTRACTION_POLL_INTERVAL_SECS: u64 = 5;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub adapters: AdapterConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// External capability configuration: vision, image generation, document
/// extraction, and the optional downstream consumer endpoints that receive
/// extraction results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub openai_model: String,
    pub gemini_api_key: String,
    pub gemini_api_url: String,
    pub extraction_poll_interval_secs: u64,
    pub summary_endpoint: Option<String>,
    pub imagery_endpoint: Option<String>,
    pub music_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("CLOSET_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("CLOSET_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: std::env::var("DATABASE_IDLE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            adapters: AdapterConfig {
                openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                openai_api_url: std::env::var("OPENAI_API_URL")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_API_URL.to_string()),
                openai_model: std::env::var("OPENAI_MODEL")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
                gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
                gemini_api_url: std::env::var("GEMINI_API_URL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_API_URL.to_string()),
                extraction_poll_interval_secs: std::env::var("EXTRACTION_POLL_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_EXTRACTION_POLL_INTERVAL_SECS),
                summary_endpoint: std::env::var("SUMMARY_ENDPOINT").ok(),
                imagery_endpoint: std::env::var("IMAGERY_ENDPOINT").ok(),
                music_endpoint: std::env::var("MUSIC_ENDPOINT").ok(),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.adapters.extraction_poll_interval_secs == 0 {
            anyhow::bail!("Extraction poll interval must be greater than 0");
        }

        if self.adapters.openai_api_key.is_empty() {
            tracing::warn!("OPENAI_API_KEY not set - clothing analysis will fail");
        }

        if self.adapters.gemini_api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY not set - clipart synthesis will fail");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            adapters: AdapterConfig {
                openai_api_key: String::new(),
                openai_api_url: DEFAULT_OPENAI_API_URL.to_string(),
                openai_model: DEFAULT_OPENAI_MODEL.to_string(),
                gemini_api_key: String::new(),
                gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
                extraction_poll_interval_secs: DEFAULT_EXTRACTION_POLL_INTERVAL_SECS,
                summary_endpoint: None,
                imagery_endpoint: None,
                music_endpoint: None,
            },
        }
    }
}
