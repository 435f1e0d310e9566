//! Generative-language REST backend (`models/{model}:generateContent`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::{PromptBackend, PromptRequest};
use crate::config::GeminiConfig;
use crate::error::RequestError;

pub struct GeminiBackend {
    client: Client,
    host: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::Config(format!("failed to create HTTP client: {e}")))?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            warn!("No Gemini API key configured (set gemini.api_key or GEMINI_API_KEY)");
        }

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.host, self.model)
    }
}

#[async_trait]
impl PromptBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: &PromptRequest) -> Result<Option<String>, RequestError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| RequestError::Config("missing Gemini API key".into()))?;

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: &request.framed,
                }],
            }],
            generation_config: GenerationSettings {
                temperature: request.generation.temperature,
                top_p: request.generation.top_p,
                max_output_tokens: request.generation.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            warn!("Gemini returned status {status}");
            return Err(RequestError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let data: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| RequestError::Decode(e.to_string()))?;

        let reply = data
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        if reply.is_none() {
            debug!("Gemini response had no candidate text: {text}");
        }
        Ok(reply)
    }
}
