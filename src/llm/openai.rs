//! OpenAI-compatible language model client.
//!
//! Single blocking round trip with one immediate retry on transient network
//! failure. Quota/rate rejections map to `QuotaExceeded`, everything else
//! transport-shaped to `ServiceUnavailable`, so the mode controller can
//! downgrade instead of surfacing a hard failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AnalystError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// OpenAI API endpoint.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Total attempts: the original call plus one immediate retry.
const MAX_ATTEMPTS: u32 = 2;

/// Generation temperature. Low and fixed: the pipeline wants the most
/// deterministic SQL the provider will give.
const TEMPERATURE: f32 = 0.1;

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "gpt-4o-mini").
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// OpenAI-compatible LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalystError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Converts internal messages to the wire format.
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    /// Maps an API error response to (error, is_retryable).
    fn parse_error(status: reqwest::StatusCode, body: &str) -> (AnalystError, bool) {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                AnalystError::config("Model authentication failed. Check OPENAI_API_KEY."),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let detail = api_error_message(body).unwrap_or_else(|| "rate limited".to_string());
            return (AnalystError::QuotaExceeded(detail), false);
        }

        let detail = api_error_message(body)
            .unwrap_or_else(|| format!("model API error ({status}): {body}"));

        // 5xx errors are transient from our perspective.
        (AnalystError::unavailable(detail), status.is_server_error())
    }

    /// Determines if a request error is worth the single retry.
    fn is_retryable_request_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect()
    }
}

fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<WireErrorResponse>(body)
        .ok()
        .map(|r| r.error.message)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let request = WireRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            temperature: TEMPERATURE,
        };

        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            debug!("Model API request attempt {} of {}", attempt, MAX_ATTEMPTS);

            let result = self
                .client
                .post(OPENAI_API_URL)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        AnalystError::unavailable(format!("Failed to read response: {e}"))
                    })?;

                    if status.is_success() {
                        let response: WireResponse = serde_json::from_str(&body).map_err(|e| {
                            AnalystError::unavailable(format!("Failed to parse response: {e}"))
                        })?;

                        return response
                            .choices
                            .into_iter()
                            .next()
                            .map(|c| c.message.content)
                            .ok_or_else(|| AnalystError::unavailable("Empty model response"));
                    }

                    let (error, is_retryable) = Self::parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_ATTEMPTS {
                        break;
                    }
                    warn!("Model API request failed (attempt {attempt}), retrying: {status}");
                }
                Err(e) => {
                    let is_retryable = Self::is_retryable_request_error(&e);
                    let error = if e.is_timeout() {
                        AnalystError::unavailable("Model request timed out")
                    } else if e.is_connect() {
                        AnalystError::unavailable("Failed to connect to the model API")
                    } else {
                        AnalystError::unavailable(format!("Model request failed: {e}"))
                    };
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_ATTEMPTS {
                        break;
                    }
                    warn!("Model API request failed (attempt {attempt}), retrying");
                }
            }
        }

        Err(last_error.expect("at least one attempt was made"))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = OpenAiConfig::new("sk-test", "gpt-4o-mini");
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_config_with_timeout() {
        let config = OpenAiConfig::new("sk-test", "gpt-4o-mini").with_timeout(60);
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_convert_messages() {
        let messages = vec![
            Message::system("You are an analyst."),
            Message::user("How many companies?"),
        ];

        let converted = OpenAiClient::convert_messages(&messages);

        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
    }

    #[test]
    fn test_parse_error_unauthorized_not_retryable() {
        let (error, is_retryable) =
            OpenAiClient::parse_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(matches!(error, AnalystError::Config(_)));
        assert!(!is_retryable);
    }

    #[test]
    fn test_parse_error_rate_limited_is_quota() {
        let body = r#"{"error":{"message":"You exceeded your current quota"}}"#;
        let (error, is_retryable) =
            OpenAiClient::parse_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(matches!(error, AnalystError::QuotaExceeded(_)));
        assert!(error.to_string().contains("quota"));
        assert!(!is_retryable);
    }

    #[test]
    fn test_parse_error_server_error_is_retryable() {
        let (error, is_retryable) =
            OpenAiClient::parse_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(matches!(error, AnalystError::ServiceUnavailable(_)));
        assert!(is_retryable);
    }

    #[test]
    fn test_parse_error_with_message() {
        let body = r#"{"error":{"message":"The model is overloaded"}}"#;
        let (error, _) = OpenAiClient::parse_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, body);
        assert!(error.to_string().contains("overloaded"));
    }

    #[test]
    fn test_request_serializes_temperature() {
        let request = WireRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![],
            temperature: TEMPERATURE,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"temperature\":0.1"));
    }
}
