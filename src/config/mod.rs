//! Process configuration, read once from the environment at startup.
//!
//! A `.env` file in the working directory is loaded first (without overriding
//! variables that are already set), then the recognized keys are read:
//!
//! | Key                      | Default                  |
//! |--------------------------|--------------------------|
//! | `USE_OLLAMA`             | `false`                  |
//! | `OLLAMA_MODEL`           | `phi3:3.8b`              |
//! | `OLLAMA_BASE_URL`        | `http://localhost:11434` |
//! | `OLLAMA_TIMEOUT_SECS`    | `60`                     |
//! | `REVIEW_BIND_ADDR`       | `127.0.0.1:8000`         |
//! | `REVIEW_MAX_INPUT_CHARS` | `200000`                 |
//! | `REVIEW_ALLOWED_ORIGINS` | unset (any origin)       |

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "phi3:3.8b";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 200_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be true or false, got {value:?}")]
    InvalidFlag { key: &'static str, value: String },

    #[error("OLLAMA_BASE_URL must start with http:// or https://, got {0:?}")]
    InvalidBaseUrl(String),
}

/// Settings for the model backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    pub enabled: bool,
    pub model: String,
    /// Endpoint root without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub max_input_chars: usize,
    /// Browser origins allowed by CORS; empty means any.
    pub allowed_origins: Vec<String>,
    pub ollama: OllamaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_owned(),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            allowed_origins: Vec::new(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let enabled = match get("USE_OLLAMA") {
            None => defaults.ollama.enabled,
            Some(v) => parse_flag("USE_OLLAMA", &v)?,
        };

        let base_url = match get("OLLAMA_BASE_URL") {
            None => defaults.ollama.base_url,
            Some(v) => {
                if !(v.starts_with("http://") || v.starts_with("https://")) {
                    return Err(ConfigError::InvalidBaseUrl(v));
                }
                v.trim_end_matches('/').to_owned()
            }
        };

        let timeout = match get("OLLAMA_TIMEOUT_SECS") {
            None => defaults.ollama.timeout,
            Some(v) => Duration::from_secs(parse_positive("OLLAMA_TIMEOUT_SECS", &v)? as u64),
        };

        let max_input_chars = match get("REVIEW_MAX_INPUT_CHARS") {
            None => defaults.max_input_chars,
            Some(v) => parse_positive("REVIEW_MAX_INPUT_CHARS", &v)?,
        };

        let allowed_origins = get("REVIEW_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|origin| origin.trim().trim_end_matches('/').to_owned())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Ok(Self {
            bind_addr: get("REVIEW_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_input_chars,
            allowed_origins,
            ollama: OllamaConfig {
                enabled,
                model: get("OLLAMA_MODEL").unwrap_or(defaults.ollama.model),
                base_url,
                timeout,
            },
        })
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key,
            value: value.to_owned(),
        }),
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: value.to_owned(),
        }),
    }
}
