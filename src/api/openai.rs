// src/api/openai.rs
//! OpenAI-compatible chat completions.

use super::connection_pool::{client_for, PoolConfig};
use super::{success_text, CompletionModel};
use crate::error::{AppError, Result, Service};
use crate::types::{ApiKey, ModelId};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    /// Arbitration must be reproducible
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiCompletions {
    http: Arc<Client>,
    api_key: ApiKey,
    base_url: String,
}

impl OpenAiCompletions {
    pub fn new(api_key: ApiKey, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: client_for("openai", &PoolConfig::with_request_timeout(timeout))?,
            api_key,
            base_url: OPENAI_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key.as_str())).map_err(|e| {
                AppError::MissingConfiguration(format!("Invalid API key format: {}", e))
            })?,
        );
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl CompletionModel for OpenAiCompletions {
    async fn complete(&self, model: &ModelId, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        log::debug!("Chat completion request (model {})", model);

        let request = ChatRequest {
            model: model.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let body = success_text(Service::Llm, response).await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse {
                service: Service::Llm,
                message: e.to_string(),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::MalformedResponse {
                service: Service::Llm,
                message: "no completion in response".to_string(),
            })
    }
}
