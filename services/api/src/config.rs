use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The realtime speech-to-speech backends a voice session can bridge to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o-realtime-preview-2024-12-17",
            Provider::Gemini => "models/gemini-2.0-flash-live-001",
        }
    }

    pub fn default_voice(&self) -> &'static str {
        match self {
            Provider::OpenAI => "alloy",
            Provider::Gemini => "Puck",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Model used for recipe search and formatting.
    pub chat_model: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub timer_tick: Duration,
    pub surface_transcripts: bool,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let provider_str =
            std::env::var("REALTIME_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "REALTIME_PROVIDER".to_string(),
                    format!("'{other}' is not one of 'openai', 'gemini'"),
                ));
            }
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| provider.default_model().to_string());
        let realtime_voice = std::env::var("REALTIME_VOICE")
            .unwrap_or_else(|_| provider.default_voice().to_string());

        let tick_str = std::env::var("TIMER_TICK_SECS").unwrap_or_else(|_| "2".to_string());
        let timer_tick = match tick_str.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                return Err(ConfigError::InvalidValue(
                    "TIMER_TICK_SECS".to_string(),
                    format!("'{tick_str}' is not a positive number of seconds"),
                ));
            }
        };

        let transcripts_str =
            std::env::var("SURFACE_TRANSCRIPTS").unwrap_or_else(|_| "true".to_string());
        let surface_transcripts = transcripts_str.parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(
                "SURFACE_TRANSCRIPTS".to_string(),
                format!("'{transcripts_str}' is not 'true' or 'false'"),
            )
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            bind_address,
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model,
            realtime_model,
            realtime_voice,
            timer_tick,
            surface_transcripts,
            log_level,
            prompts_path,
        })
    }
}
