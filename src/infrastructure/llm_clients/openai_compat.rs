use super::ChatClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{ChatMessage, CompletionOptions, LlmConfig};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str> {
        match self.config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(AppError::CredentialMissing),
        }
    }

    pub(crate) fn request_body(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "repetition_penalty": options.repetition_penalty,
            "stream": false,
        })
    }
}

/// First choice's message text from a chat-completions response body.
pub(crate) fn extract_content(json: &Value) -> Option<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        let api_key = self.api_key()?;
        let url = self.config.chat_completions_url();
        let body = self.request_body(messages, options);

        debug!(
            url = %url,
            model = %self.config.model,
            messages = messages.len(),
            max_tokens = options.max_tokens,
            "chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport {
                status: None,
                body: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Transport {
                status: Some(status.as_u16()),
                body: text,
            });
        }

        let json: Value = response.json().await.map_err(|e| AppError::Transport {
            status: Some(status.as_u16()),
            body: format!("Failed to parse JSON: {}", e),
        })?;

        extract_content(&json).ok_or_else(|| AppError::Transport {
            status: Some(status.as_u16()),
            body: "Invalid response format: missing choices[0].message.content".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_key: Option<&str>) -> OpenAiCompatClient {
        OpenAiCompatClient::new(LlmConfig {
            api_key: api_key.map(|k| k.to_string()),
            // Unroutable, so an accidental request fails fast.
            base_url: "http://127.0.0.1:9/v1".to_string(),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_request() {
        let options = CompletionOptions::for_sql();
        let messages = [ChatMessage::user("hi")];

        let err = client(None).complete(&messages, &options).await.unwrap_err();
        assert!(matches!(err, AppError::CredentialMissing));

        let err = client(Some("   ")).complete(&messages, &options).await.unwrap_err();
        assert!(matches!(err, AppError::CredentialMissing));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let err = client(Some("key"))
            .complete(&[ChatMessage::user("hi")], &CompletionOptions::for_sql())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport { status: None, .. }));
    }

    #[test]
    fn test_request_body_carries_sampling_options() {
        let body = client(Some("key")).request_body(
            &[ChatMessage::system("s"), ChatMessage::user("u")],
            &CompletionOptions::for_answer(),
        );
        assert_eq!(body["model"], "typhoon-v2.1-12b-instruct");
        assert_eq!(body["max_tokens"], 700);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert!((body["repetition_penalty"].as_f64().unwrap() - 1.05).abs() < 1e-6);
    }

    #[test]
    fn test_extract_content() {
        let ok = json!({ "choices": [{ "message": { "role": "assistant", "content": "SELECT 1" } }] });
        assert_eq!(extract_content(&ok).as_deref(), Some("SELECT 1"));
        assert_eq!(extract_content(&json!({ "choices": [] })), None);
        assert_eq!(extract_content(&json!({ "error": "x" })), None);
    }
}
