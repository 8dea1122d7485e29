use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct LlmConfig {
    #[validate(url)]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    pub api_key: Option<String>,
    /// Upper bound for a single chat-completion round trip.
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.opentyphoon.ai/v1".to_string(),
            model: "typhoon-v2.1-12b-instruct".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn chat_completions_url(&self) -> String {
        if self.base_url.ends_with('/') {
            format!("{}chat/completions", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

/// Sampling options sent with every chat-completion request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct CompletionOptions {
    #[validate(range(min = 1, max = 32768))]
    pub max_tokens: u32,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl CompletionOptions {
    pub fn for_sql() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.2,
            top_p: 0.95,
            repetition_penalty: 1.05,
        }
    }

    pub fn for_answer() -> Self {
        Self {
            max_tokens: 700,
            temperature: 0.3,
            top_p: 0.95,
            repetition_penalty: 1.05,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}
