//! Startup configuration
//!
//! All settings are read once at startup into an explicit struct; nothing
//! reads ambient environment state after that.

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemma-3n-e4b-it:free";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OPENROUTER_API_KEY is not set; export an OpenRouter API key before starting")]
    MissingApiKey,
    #[error("OPENROUTER_API_KEY is set but empty")]
    EmptyApiKey,
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Credential for the hosted completion API.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Sampling temperature; 0.0 requests minimally-random responses.
    pub temperature: f32,
    /// Port the HTTP server binds to.
    pub port: u16,
}

impl AppConfig {
    /// Read configuration from the environment.
    ///
    /// A missing or empty API key is a hard error so the server refuses to
    /// start rather than failing every turn at request time.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = match std::env::var("OPENROUTER_API_KEY") {
            Ok(key) if key.trim().is_empty() => return Err(ConfigError::EmptyApiKey),
            Ok(key) => key,
            Err(_) => return Err(ConfigError::MissingApiKey),
        };

        let base_url = std::env::var("OPENROUTER_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("HERON_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let temperature = match std::env::var("HERON_TEMPERATURE") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "HERON_TEMPERATURE",
                value: raw,
            })?,
            Err(_) => 0.0,
        };

        let port = match std::env::var("HERON_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "HERON_PORT",
                value: raw,
            })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            temperature,
            port,
        })
    }
}
