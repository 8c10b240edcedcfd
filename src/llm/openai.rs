//! OpenAI-compatible chat completions client.
//!
//! Talks to any endpoint implementing `POST {base}/chat/completions`
//! (OpenAI, OpenRouter, LiteLLM proxies).

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, Generator};
use crate::error::GenerationError;

/// Default API base when `OPENAI_BASE_URL` is unset.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const TEMPERATURE: f64 = 0.0;
const MAX_TOKENS: u32 = 1024;

/// `OPENAI_API_KEY`, with an empty or blank value treated as unset.
pub fn api_key_from_env() -> Option<String> {
    non_blank(env::var("OPENAI_API_KEY").ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Sends each prompt as a single user message.
pub struct OpenAiGenerator {
    api_base: String,
    api_key: String,
    http_client: Client,
}

impl OpenAiGenerator {
    /// Creates a client with an explicit base URL and key.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http_client,
        })
    }

    /// Creates a client from `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::MissingApiKey` if `OPENAI_API_KEY` is not set.
    pub fn from_env(timeout: Duration) -> Result<Self, GenerationError> {
        let api_key = api_key_from_env().ok_or(GenerationError::MissingApiKey)?;
        let api_base =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(api_base, api_key, timeout)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Extracts the first choice's text. A null content is an empty answer.
fn first_choice_text(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| GenerationError::ParseError("No choices in chat response".to_string()))
}

/// Turns a non-success body into an `ApiError`, preferring the structured message.
fn api_error(code: u16, body: String) -> GenerationError {
    match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(parsed) => GenerationError::ApiError {
            code,
            message: parsed.error.message,
        },
        Err(_) => GenerationError::ApiError {
            code,
            message: body,
        },
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.api_base);
        debug!(task_id = %request.task_id, model = %request.model, "POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(api_error(status.as_u16(), text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(format!("Failed to parse API response: {}", e)))?;
        first_choice_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_choice_text() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"PASS"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "PASS");

        let null_content: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert_eq!(first_choice_text(null_content).unwrap(), "");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice_text(empty),
            Err(GenerationError::ParseError(_))
        ));
    }

    #[test]
    fn test_api_error_prefers_structured_message() {
        let err = api_error(401, r#"{"error":{"message":"bad key","type":"auth"}}"#.to_string());
        assert!(matches!(err, GenerationError::ApiError { code: 401, ref message } if message == "bad key"));

        let err = api_error(502, "upstream down".to_string());
        assert!(matches!(err, GenerationError::ApiError { code: 502, ref message } if message == "upstream down"));
    }

    #[test]
    fn test_blank_api_key_counts_as_unset() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(String::new())), None);
        assert_eq!(non_blank(Some("  \n".to_string())), None);
        assert_eq!(non_blank(Some("sk-test".to_string())).as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let generator =
            OpenAiGenerator::new("http://localhost:4000/v1/", "k", Duration::from_secs(5)).unwrap();
        assert_eq!(generator.api_base(), "http://localhost:4000/v1");
    }
}
