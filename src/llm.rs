#![doc = "Reasoning client for the CLI: bridges the core's ReasoningClient trait to an OpenAI-compatible chat completions API."]
//
//! The core only sees [`ReasoningClient`]. This module owns the wire format:
//! one `POST {endpoint}/chat/completions` per request, JSON response mode, and
//! a bearer key read from `OPENAI_API_KEY`. The completion text is returned
//! as-is; parsing and repair happen in the core.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use dtc_report_core::contract::{ReasoningClient, ReasoningError, ReasoningRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::load_config::ReasoningConfig;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http: Client,
    url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(config: &ReasoningConfig, api_key: String) -> Result<Self, ReasoningError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReasoningError::Http(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn new_from_env(
        config: &ReasoningConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok(); // loads environment variables from .env if present
        match env::var(API_KEY_VAR) {
            Ok(api_key) if !api_key.trim().is_empty() => {
                let client = Self::new(config, api_key)?;
                tracing::info!(
                    url = %client.url,
                    model = %client.model,
                    "Initialized OpenAiClient from environment"
                );
                Ok(client)
            }
            Ok(_) => {
                tracing::error!("{API_KEY_VAR} is empty");
                Err(format!("{API_KEY_VAR} is empty").into())
            }
            Err(e) => {
                tracing::error!(error = ?e, "{API_KEY_VAR} missing in environment");
                Err(Box::new(e))
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReasoningClient for OpenAiClient {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::info!(model = %self.model, payload_len = request.user.len(), "Requesting completion");
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Completion request failed");
                ReasoningError::Http(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %text, "Completion returned error status");
            return Err(ReasoningError::Status(status.as_u16(), text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Http(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ReasoningError::EmptyResponse)?;

        tracing::debug!(content_len = content.len(), "Received completion");
        Ok(content)
    }
}
