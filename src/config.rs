//! Configuration management
//!
//! Loaded once at start-up from the process environment (optionally primed
//! from a `.env` file by `main`). Components receive the resulting struct;
//! nothing reads or mutates the environment afterwards.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::history::DEFAULT_WINDOW;

/// Default OpenAI-compatible completion endpoint (Groq)
pub const DEFAULT_AI_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default completion model
pub const DEFAULT_AI_MODEL: &str = "llama-3.3-70b-versatile";

/// AI backend settings. Generation parameters are fixed per process.
#[derive(Debug, Clone)]
pub struct AiSettings {
    /// API key (optional - without it every free-text message is echoed)
    pub api_key: Option<String>,

    /// Chat completions endpoint
    pub api_url: String,

    /// Model identifier sent with every request
    pub model: String,

    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,

    /// Whole-request timeout
    pub timeout: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_AI_URL.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 1.0,
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (required to run the bot)
    pub telegram_token: Option<String>,

    /// Telegram bot username, without the leading '@'
    pub bot_username: String,

    /// AI backend settings
    pub ai: AiSettings,

    /// Turns retained per chat
    pub history_window: usize,

    /// SQLite database for the audit log and business directory
    pub db_path: PathBuf,

    /// Bind address for the operator control API
    pub control_addr: SocketAddr,

    /// Whether the bot processes messages right after start-up
    pub start_active: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_token: None,
            bot_username: "alexia_bot".to_string(),
            ai: AiSettings::default(),
            history_window: DEFAULT_WINDOW,
            db_path: default_db_path(),
            control_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            start_active: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let ai = AiSettings {
            api_key: non_empty_var("GROK_API_KEY"),
            api_url: non_empty_var("GROK_API_URL").unwrap_or(defaults.ai.api_url),
            model: non_empty_var("GROK_MODEL").unwrap_or(defaults.ai.model),
            temperature: parse_var("AI_TEMPERATURE", defaults.ai.temperature),
            max_tokens: parse_var("AI_MAX_TOKENS", defaults.ai.max_tokens),
            top_p: parse_var("AI_TOP_P", defaults.ai.top_p),
            timeout: Duration::from_secs(parse_var("AI_TIMEOUT_SECS", 60u64)),
            connect_timeout: defaults.ai.connect_timeout,
        };

        let history_window = parse_var("HISTORY_WINDOW", DEFAULT_WINDOW);
        if history_window == 0 {
            warn!("HISTORY_WINDOW=0 is not allowed, using 1");
        }

        let control_addr = match non_empty_var("CONTROL_ADDR") {
            Some(addr) => addr
                .parse()
                .with_context(|| format!("Invalid CONTROL_ADDR: {}", addr))?,
            None => defaults.control_addr,
        };

        Ok(Self {
            telegram_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            bot_username: non_empty_var("TELEGRAM_BOT_USERNAME")
                .map(|u| u.trim_start_matches('@').to_string())
                .unwrap_or(defaults.bot_username),
            ai,
            history_window: history_window.max(1),
            db_path: non_empty_var("ALEXIA_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            control_addr,
            start_active: non_empty_var("BOT_START_ACTIVE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// Telegram token, or an error naming the missing variable
    pub fn require_telegram_token(&self) -> Result<&str> {
        self.telegram_token
            .as_deref()
            .context("TELEGRAM_BOT_TOKEN must be set")
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("alexia")
        .join("alexia.db")
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr + Copy>(key: &str, default: T) -> T {
    match non_empty_var(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.history_window, 20);
        assert_eq!(config.ai.max_tokens, 1024);
        assert_eq!(config.ai.timeout, Duration::from_secs(60));
        assert!(!config.start_active);
        assert!(config.db_path.ends_with("alexia/alexia.db"));
        assert!(config.require_telegram_token().is_err());
    }

    #[test]
    fn test_parse_var_falls_back_on_garbage() {
        // Unset and unparsable variables both yield the default
        assert_eq!(parse_var("ALEXIA_TEST_SURELY_UNSET_VAR", 42u32), 42);
    }
}
