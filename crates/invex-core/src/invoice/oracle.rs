//! Structured-extraction oracle: a language model that turns invoice text into JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ParseError;
use crate::models::config::OracleConfig;
use crate::models::invoice::TokenUsage;

const SYSTEM_PROMPT: &str =
    "You are an expert at extracting structured data from invoices. Always return valid JSON.";

/// What the oracle is asked to do for one document.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    /// Extracted invoice text.
    pub text: &'a str,
    /// JSON schema the answer must conform to.
    pub schema: &'a Value,
    /// Valid category keys for line items.
    pub categories: &'a [String],
}

/// Raw oracle answer, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleResponse {
    /// Message content, expected to hold one JSON object.
    pub content: String,
    /// Token usage reported by the service.
    pub usage: TokenUsage,
}

/// Trait for structured-extraction oracles.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Ask the oracle for a schema-conformant JSON object describing the invoice.
    async fn extract(&self, request: OracleRequest<'_>) -> Result<OracleResponse, ParseError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Oracle backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
}

impl OpenAiOracle {
    /// Create an oracle; without an explicit key, the one named by
    /// `config.api_key_env` is read from the environment.
    pub fn new(config: &OracleConfig, api_key: Option<String>) -> Result<Self, ParseError> {
        let api_key = match api_key {
            Some(key) if !key.trim().is_empty() => key,
            _ => std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| ParseError::MissingCredentials(config.api_key_env.clone()))?,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ParseError::Unavailable(e.to_string()))?;

        info!(url = %config.base_url, model = %config.model, "Using chat completions oracle");

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    fn user_prompt(request: &OracleRequest<'_>) -> String {
        format!(
            "Extract invoice information from the following text and return a JSON object with \
             the fields invoiceID, LineItems (description, quantity, unit_price, total_price, \
             category) and SpecialNotes (array of strings).\n\n\
             Available categories to choose from: {}\n\n\
             For each line item, assign the most appropriate category from the list above based \
             on the item description.\n\n\
             Invoice text:\n{}\n\n\
             Return only valid JSON, no additional text or explanation.",
            request.categories.join(", "),
            request.text
        )
    }
}

fn request_error(e: reqwest::Error) -> ParseError {
    if e.is_timeout() {
        ParseError::Timeout
    } else {
        ParseError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiOracle {
    async fn extract(&self, request: OracleRequest<'_>) -> Result<OracleResponse, ParseError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(Self::user_prompt(&request)),
                },
            ],
            temperature: self.temperature,
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "invoice",
                    "strict": true,
                    "schema": request.schema,
                }
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending {} chars of invoice text to {}", request.text.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::Api { status, body });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                ParseError::Schema(format!("unexpected chat completion payload: {}", e))
            } else {
                request_error(e)
            }
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ParseError::EmptyResponse)?;

        let usage = chat
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Oracle answered"
        );

        Ok(OracleResponse { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_wins() {
        let config = OracleConfig {
            api_key_env: "INVEX_TEST_UNSET_KEY_VAR".to_string(),
            ..OracleConfig::default()
        };
        let oracle = OpenAiOracle::new(&config, Some("sk-test".to_string())).unwrap();
        assert_eq!(oracle.api_key, "sk-test");
        assert_eq!(oracle.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_missing_credentials() {
        let config = OracleConfig {
            api_key_env: "INVEX_TEST_UNSET_KEY_VAR".to_string(),
            ..OracleConfig::default()
        };
        let err = OpenAiOracle::new(&config, None).err().unwrap();
        assert!(matches!(err, ParseError::MissingCredentials(var) if var == "INVEX_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn test_prompt_lists_categories() {
        let schema = json!({});
        let categories = vec!["food".to_string(), "tools".to_string()];
        let prompt = OpenAiOracle::user_prompt(&OracleRequest {
            text: "Hammer 1 x 9.99",
            schema: &schema,
            categories: &categories,
        });
        assert!(prompt.contains("food, tools"));
        assert!(prompt.contains("Hammer 1 x 9.99"));
    }
}
