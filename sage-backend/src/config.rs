use std::env;

use crate::error::AgentError;

/// Process configuration, read once at startup and injected from the
/// composition root. A missing API key is fatal at construction.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub anthropic_api_key: String,
    pub model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_max_retries: u32,
    pub llm_timeout_secs: u64,
    /// Directory for the file-backed conversation store
    pub chat_history_dir: String,
    /// When set, conversation history goes to SQLite instead of flat files
    pub database_url: Option<String>,
    /// Base URL of the external retrieval service; absent means no
    /// long-term memory and no retrieval tool
    pub vector_service_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AgentError> {
        let anthropic_api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AgentError::Config("ANTHROPIC_API_KEY must be set".to_string()))?;

        Ok(Self {
            port: parse_var("PORT", 8000)?,
            anthropic_api_key,
            model_name: env::var("MODEL_NAME")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
            llm_temperature: parse_var("LLM_TEMPERATURE", 0.7)?,
            llm_max_tokens: parse_var("LLM_MAX_TOKENS", 1024)?,
            llm_max_retries: parse_var("LLM_MAX_RETRIES", 3)?,
            llm_timeout_secs: parse_var("LLM_TIMEOUT_SECS", 60)?,
            chat_history_dir: env::var("CHAT_HISTORY_DIR")
                .unwrap_or_else(|_| "./chat_histories".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            vector_service_url: env::var("VECTOR_SERVICE_URL").ok(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AgentError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AgentError::Config(format!("{} must be a valid number, got '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}
