use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a request ended in `PipelineState::Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    EmptyQuestion,
    CredentialMissing,
    TransportError,
    UnsafeSql,
    ExecutionError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::EmptyQuestion => "empty_question",
            FailureReason::CredentialMissing => "credential_missing",
            FailureReason::TransportError => "transport_error",
            FailureReason::UnsafeSql => "unsafe_sql",
            FailureReason::ExecutionError => "execution_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PipelineState {
    Received,
    SqlRequested,
    SqlNormalized,
    SqlValidated,
    SqlLimited,
    Executed,
    AnswerRequested,
    Completed,
    Failed(FailureReason),
}

impl PipelineState {
    /// The state reached on success from this one. Terminal states map to
    /// themselves.
    pub fn next(self) -> PipelineState {
        match self {
            PipelineState::Received => PipelineState::SqlRequested,
            PipelineState::SqlRequested => PipelineState::SqlNormalized,
            PipelineState::SqlNormalized => PipelineState::SqlValidated,
            PipelineState::SqlValidated => PipelineState::SqlLimited,
            PipelineState::SqlLimited => PipelineState::Executed,
            PipelineState::Executed => PipelineState::AnswerRequested,
            PipelineState::AnswerRequested => PipelineState::Completed,
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed(_))
    }
}
