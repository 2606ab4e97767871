//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the Abacus engine.
//! All errors implement the `AbacusErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Hints never echo snippet source, credentials, or file paths, so they are
//! safe to show to the person chatting with the assistant.

use thiserror::Error;

/// Trait for Abacus error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait AbacusErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors only affect the current turn. Non-recoverable
    /// errors stop the process at startup.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Validation**: a generated snippet was rejected before execution
/// - **Execution**: a vetted snippet faulted inside the sandbox
/// - **Model calls**: generation or summarization failed
/// - **Retrieval**: the document collaborator could not answer
/// - **Startup**: configuration or credentials are unusable
///
/// # Examples
///
/// ```
/// use sdk::errors::{AbacusErrorExt, EngineError};
///
/// let error = EngineError::ValidationRejected("Function not allowed: eval".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::MissingCredentials("OPENAI_API_KEY".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Static validation errors
    #[error("Code rejected by validator: {0}")]
    ValidationRejected(String),

    #[error("Syntax error in generated code: {0}")]
    SyntaxInvalid(String),

    // Sandbox errors
    #[error("Execution fault: {message}")]
    Execution { message: String, trace: Option<String> },

    // Model call errors
    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    // Document collaborator errors
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    // Startup errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credentials: environment variable {0} is not set")]
    MissingCredentials(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AbacusErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::ValidationRejected(_) => "The generated code used operations that are not allowed",
            Self::SyntaxInvalid(_) => "The generated code was not valid Python. Try rephrasing",
            Self::Execution { .. } => "The calculation failed while running",

            Self::Generation(_) => "Language model unavailable. Check your API key and network",
            Self::Summarization(_) => "Older messages could not be summarized yet",

            Self::Retrieval(_) => "Document search is unavailable right now",

            Self::Config(_) => "Check your config.toml and environment variables",
            Self::MissingCredentials(_) => "Set the API key environment variable and restart",

            Self::Network(_) => "Network operation failed. Check your connection",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::MissingCredentials(_) => false,

            // All other errors are confined to a single turn
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_errors_are_fatal() {
        assert!(!EngineError::Config("bad".to_string()).is_recoverable());
        assert!(!EngineError::MissingCredentials("OPENAI_API_KEY".to_string()).is_recoverable());
    }

    #[test]
    fn test_turn_errors_are_recoverable() {
        let errors = [
            EngineError::ValidationRejected("os".to_string()),
            EngineError::SyntaxInvalid("line 1".to_string()),
            EngineError::Execution {
                message: "ZeroDivisionError".to_string(),
                trace: None,
            },
            EngineError::Generation("timeout".to_string()),
            EngineError::Summarization("quota".to_string()),
            EngineError::Retrieval("empty".to_string()),
        ];
        for error in &errors {
            assert!(error.is_recoverable(), "{error} should be recoverable");
            assert!(!error.user_hint().is_empty());
        }
    }

    #[test]
    fn test_missing_credentials_message_names_variable() {
        let error = EngineError::MissingCredentials("OPENAI_API_KEY".to_string());
        assert!(error.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_hint_does_not_leak_details() {
        let error = EngineError::ValidationRejected("import os".to_string());
        assert!(!error.user_hint().contains("import os"));
    }
}
