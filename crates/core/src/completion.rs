use crate::error::ChatError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 1_000,
        }
    }
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, ChatError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    settings: CompletionSettings,
}

impl OpenAiChatClient {
    pub fn new(api_key: impl Into<String>, settings: CompletionSettings) -> Result<Self, ChatError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChatError::MissingCredential(format!("{API_KEY_ENV} is empty")));
        }

        debug!(model = %settings.model, api_base = %settings.api_base, "completion client ready");
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint_url(&settings.api_base, "chat/completions")?,
            api_key,
            settings,
        })
    }
}

/// Joins `path` onto an API base, with or without its trailing slash.
pub(crate) fn endpoint_url(api_base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = api_base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)?.join(path)
}

fn first_message(response: ChatResponse) -> Result<String, ChatError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ChatError::EmptyCompletion)
}

#[async_trait]
impl ChatCompletion for OpenAiChatClient {
    async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, ChatError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        debug!(model = %self.settings.model, prompt_chars = system_prompt.len(), "requesting completion");

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ChatError::CompletionStatus {
                status: status.as_u16(),
                details,
            });
        }

        first_message(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_with_or_without_slash() -> Result<(), url::ParseError> {
        assert_eq!(
            endpoint_url("https://api.openai.com/v1", "chat/completions")?.as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint_url("http://localhost:8080/v1/", "chat/completions")?.as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
        Ok(())
    }

    #[test]
    fn request_body_matches_api_shape() -> Result<(), serde_json::Error> {
        let request = ChatRequest {
            model: "gpt-4o",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            temperature: 0.1,
            max_tokens: 1_000,
        };
        let value = serde_json::to_value(&request)?;
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["max_tokens"], 1_000);
        Ok(())
    }

    #[test]
    fn first_choice_content_is_the_answer() -> Result<(), Box<dyn std::error::Error>> {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Net debt is 3%."}}]}"#,
        )?;
        assert_eq!(first_message(response)?, "Net debt is 3%.");
        Ok(())
    }

    #[test]
    fn missing_content_is_an_error() -> Result<(), serde_json::Error> {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#)?;
        assert!(matches!(first_message(response), Err(ChatError::EmptyCompletion)));
        Ok(())
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = OpenAiChatClient::new("  ", CompletionSettings::default());
        assert!(matches!(result, Err(ChatError::MissingCredential(_))));
    }
}
