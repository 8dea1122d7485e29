pub mod openai_compat;

use crate::domain::error::Result;
use crate::domain::llm_config::{ChatMessage, CompletionOptions};
use async_trait::async_trait;

pub use openai_compat::OpenAiCompatClient;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `messages` in order and return the first choice's text.
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions)
        -> Result<String>;
}
