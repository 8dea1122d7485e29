use serde::{Deserialize, Serialize};
use std::fmt;

use super::pipeline_state::FailureReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// No model-endpoint credential is configured.
    CredentialMissing,
    /// Network failure or non-success response from the model endpoint.
    Transport { status: Option<u16>, body: String },
    /// The model output holds no statement starting with SELECT.
    ExtractionFailure { raw: String },
    /// The guardrail rejected the statement. `raw` is the model output.
    UnsafeSql { raw: String, reason: String },
    /// The storage engine rejected or failed to run a guarded statement.
    ExecutionError(String),
    EmptyQuestion,
    ValidationError(String),
    ConfigError(String),
    DatabaseError(String),
    IoError(String),
}

impl AppError {
    pub fn unsafe_sql(raw: &str, reason: impl Into<String>) -> Self {
        AppError::UnsafeSql {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// Tag reported by the orchestrator when a request ends in `Failed`.
    /// Ambient errors that never occur inside the pipeline have no tag.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            AppError::EmptyQuestion => Some(FailureReason::EmptyQuestion),
            AppError::CredentialMissing => Some(FailureReason::CredentialMissing),
            AppError::Transport { .. } => Some(FailureReason::TransportError),
            AppError::ExtractionFailure { .. } | AppError::UnsafeSql { .. } => {
                Some(FailureReason::UnsafeSql)
            }
            AppError::ExecutionError(_) => Some(FailureReason::ExecutionError),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::CredentialMissing => write!(
                f,
                "Credential missing: set LLM_API_KEY or LISTING_QA_LLM__API_KEY"
            ),
            AppError::Transport {
                status: Some(status),
                body,
            } => write!(f, "Transport error ({}): {}", status, body),
            AppError::Transport { status: None, body } => write!(f, "Transport error: {}", body),
            AppError::ExtractionFailure { raw } => {
                write!(f, "No SELECT statement found in model output: {}", raw)
            }
            AppError::UnsafeSql { raw, reason } => {
                write!(f, "Unsafe SQL rejected ({}): {}", reason, raw)
            }
            AppError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            AppError::EmptyQuestion => write!(f, "Question is required"),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
