use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::application::use_cases::answer_synthesizer::{DEFAULT_RECOMMENDATIONS, DEFAULT_SAMPLE_ROWS};
use crate::application::use_cases::sql_guard::{LimitPolicy, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{CompletionOptions, LlmConfig};

pub const DEFAULT_CONFIG_FILE: &str = "listing-qa.toml";
pub const CONFIG_FILE_ENV: &str = "LISTING_QA_CONFIG";
pub const ENV_PREFIX: &str = "LISTING_QA_";
/// Bare credential variable accepted when no prefixed key is configured.
pub const FALLBACK_API_KEY_ENV: &str = "LLM_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Imported at start-up when the listings table is empty.
    pub seed_csv: Option<PathBuf>,
    #[validate(range(min = 1, max = 64))]
    pub max_connections: u32,
    #[validate(range(min = 1, max = 600))]
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("listings.db"),
            seed_csv: None,
            max_connections: 5,
            query_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    #[validate(length(min = 1, max = 64))]
    pub table_name: String,
    #[validate(range(min = 1))]
    pub default_limit: u64,
    #[validate(range(min = 1, max = 10000))]
    pub max_limit: u64,
    #[validate(range(min = 1, max = 1000))]
    pub answer_sample_rows: usize,
    #[validate(range(min = 1, max = 20))]
    pub recommendation_count: usize,
    #[validate(nested)]
    pub sql_options: CompletionOptions,
    #[validate(nested)]
    pub answer_options: CompletionOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            table_name: "listings".to_string(),
            default_limit: DEFAULT_ROW_LIMIT,
            max_limit: MAX_ROW_LIMIT,
            answer_sample_rows: DEFAULT_SAMPLE_ROWS,
            recommendation_count: DEFAULT_RECOMMENDATIONS,
            sql_options: CompletionOptions::for_sql(),
            answer_options: CompletionOptions::for_answer(),
        }
    }
}

impl PipelineConfig {
    pub fn limit_policy(&self) -> LimitPolicy {
        LimitPolicy {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    fn check(&self) -> Result<()> {
        if self.default_limit > self.max_limit {
            return Err(AppError::ConfigError(format!(
                "pipeline.default_limit ({}) must not exceed pipeline.max_limit ({})",
                self.default_limit, self.max_limit
            )));
        }
        let mut chars = self.table_name.chars();
        let valid_identifier = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_identifier {
            return Err(AppError::ConfigError(format!(
                "pipeline.table_name '{}' is not a plain identifier",
                self.table_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub llm: LlmConfig,
    #[validate(nested)]
    pub pipeline: PipelineConfig,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// `.env`, then defaults < TOML file < `LISTING_QA_*` environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_figment(Self::figment(Path::new(&file)))
    }

    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: AppConfig = figment
            .extract()
            .map_err(|e| AppError::ConfigError(format!("Failed to load configuration: {}", e)))?;

        let has_key = config
            .llm
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            config.llm.api_key = std::env::var(FALLBACK_API_KEY_ENV)
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        config
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.pipeline.check()?;

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
