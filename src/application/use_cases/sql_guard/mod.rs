//! Turns raw model output into a statement that may be executed.
//!
//! `normalize -> validate -> limit` is the only path to a [`SafeQuery`],
//! and each stage consumes the previous stage's type.

mod limit;
mod literals;
mod normalizer;
mod validator;

use std::fmt;

use tracing::debug;

use crate::domain::error::{AppError, Result};

pub use limit::{enforce_limit, LimitPolicy, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT};
pub use normalizer::{normalize_sql, starts_with_select};
pub use validator::{is_safe_sql, validate_sql, FORBIDDEN_VERBS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardViolation {
    Empty,
    NotSelect,
    MultipleStatements,
    ForbiddenKeyword(String),
    ForeignTable(String),
    CommaJoin,
    NonNumericLimit,
    MultipleLimits,
    UnclosedQuote,
    ParenthesizedSource,
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardViolation::Empty => write!(f, "empty statement"),
            GuardViolation::NotSelect => write!(f, "statement must start with SELECT"),
            GuardViolation::MultipleStatements => write!(f, "semicolons are not allowed"),
            GuardViolation::ForbiddenKeyword(word) => write!(f, "forbidden keyword '{}'", word),
            GuardViolation::ForeignTable(name) => write!(f, "table '{}' is not allowed", name),
            GuardViolation::CommaJoin => write!(f, "comma-separated FROM sources are not allowed"),
            GuardViolation::NonNumericLimit => write!(f, "LIMIT must be a plain integer"),
            GuardViolation::MultipleLimits => write!(f, "more than one top-level LIMIT"),
            GuardViolation::UnclosedQuote => write!(f, "unterminated quote"),
            GuardViolation::ParenthesizedSource => {
                write!(f, "parenthesized FROM sources must be a subquery or the bare table")
            }
        }
    }
}

/// Output of the normalizer. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSql(String);

impl NormalizedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A normalized statement that passed the read-only policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A statement that is normalized, validated and row-limited. The executor
/// accepts nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeQuery {
    sql: String,
}

impl SafeQuery {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn into_string(self) -> String {
        self.sql
    }
}

impl fmt::Display for SafeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Debug, Clone)]
pub struct SqlGuard {
    table_name: String,
    limits: LimitPolicy,
}

impl SqlGuard {
    pub fn new(table_name: impl Into<String>, limits: LimitPolicy) -> Self {
        Self {
            table_name: table_name.into(),
            limits,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn limits(&self) -> LimitPolicy {
        self.limits
    }

    pub fn normalize(&self, raw: &str) -> Result<NormalizedSql> {
        let sql = normalize_sql(raw);
        if sql.is_empty() {
            return Err(AppError::ExtractionFailure {
                raw: raw.to_string(),
            });
        }
        debug!(sql = %sql, "normalized model output");
        Ok(NormalizedSql(sql))
    }

    /// `raw` is carried into the error so callers can report what the model said.
    pub fn validate(&self, sql: NormalizedSql, raw: &str) -> Result<ValidatedSql> {
        validate_sql(sql.as_str(), &self.table_name)
            .map_err(|violation| AppError::unsafe_sql(raw, violation.to_string()))?;
        Ok(ValidatedSql(sql.0))
    }

    pub fn limit(&self, sql: ValidatedSql, raw: &str) -> Result<SafeQuery> {
        let limited = enforce_limit(sql.as_str(), &self.limits)
            .map_err(|violation| AppError::unsafe_sql(raw, violation.to_string()))?;
        Ok(SafeQuery { sql: limited })
    }

    /// All three stages in order.
    pub fn admit(&self, raw: &str) -> Result<SafeQuery> {
        let normalized = self.normalize(raw)?;
        let validated = self.validate(normalized, raw)?;
        self.limit(validated, raw)
    }
}
