use thiserror::Error;

use crate::ai::types::AiError;

/// Error taxonomy for the agent core.
///
/// `Config` is fatal at construction. `Persistence` is recovered locally by
/// the memory layer (logged, the source degrades to empty for the turn).
/// `Parse` aborts the decomposition pipeline. `Completion` and `Tool` surface
/// to the caller as a generic execution failure.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Structural parse error: {0}")]
    Parse(String),

    #[error("Completion error: {0}")]
    Completion(#[from] AiError),

    #[error("Tool error: {0}")]
    Tool(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = AgentError::Config("ANTHROPIC_API_KEY must be set".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: ANTHROPIC_API_KEY must be set"
        );
    }

    #[test]
    fn test_completion_error_wraps_status() {
        let err: AgentError = AiError::with_status("rate limited", 429).into();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = AgentError::Parse("expected 2-5 sub-questions, got 1".to_string());
        assert!(err.to_string().starts_with("Structural parse error"));
    }
}
