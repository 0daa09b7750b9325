//! Error types for agentrun.

pub mod unified;

pub use unified::{ErrorCategory, ReportedError};

use thiserror::Error;

/// Primary error type for all orchestration operations.
#[derive(Error, Debug)]
pub enum AgentRunError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unresolved action: {0}")]
    UnresolvedAction(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Budget exhausted: {0}")]
    Exhausted(String),

    #[error("Run failed ({code}): {message}")]
    RunFailed { code: String, message: String },

    #[error("Run cancelled by caller")]
    Cancelled,
}

impl AgentRunError {
    /// Create an API error from a status code and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into the orchestration taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api { .. }
            | Self::Authentication(_)
            | Self::Network(_)
            | Self::Io(_)
            | Self::Timeout(_) => ErrorCategory::Transport,
            Self::Protocol(_) | Self::UnresolvedAction(_) => ErrorCategory::Protocol,
            Self::UnknownTool(_) | Self::ToolExecution { .. } | Self::InvalidArgument(_) => {
                ErrorCategory::ToolExecution
            }
            Self::Exhausted(_) => ErrorCategory::Exhausted,
            Self::RunFailed { .. } => ErrorCategory::Remote,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Snapshot this error for a serializable report.
    pub fn to_reported(&self) -> ReportedError {
        ReportedError {
            category: self.category(),
            message: self.to_string(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AgentRunError>;
