//! Relay backend: a local chatbot endpoint that owns the model credentials.
//!
//! Contract: `POST {url}` with `{"message": <user text>}`, answered with
//! `{"reply": <text>}`. The relay applies its own framing, so only the
//! literal user text is forwarded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use super::{PromptBackend, PromptRequest};
use crate::config::RelayConfig;
use crate::error::RequestError;

pub struct RelayBackend {
    client: Client,
    url: String,
}

impl RelayBackend {
    pub fn new(config: &RelayConfig, timeout: Duration) -> Result<Self, RequestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RequestError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl PromptBackend for RelayBackend {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn complete(&self, request: &PromptRequest) -> Result<Option<String>, RequestError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({ "message": request.user_text }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            warn!("Relay returned status {status}");
            let body = resp.text().await.unwrap_or_default();
            return Err(RequestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = resp.json().await?;
        Ok(data["reply"].as_str().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::config::GenerationConfig;
    use crate::prompt::test_support::serve;

    fn request(text: &str) -> PromptRequest {
        PromptRequest {
            user_text: text.into(),
            framed: format!("framing\n\nStudent: {text}"),
            generation: GenerationConfig::default(),
        }
    }

    async fn relay_at(router: Router) -> RelayBackend {
        let base = serve(router).await;
        let config = RelayConfig {
            url: format!("{base}/chatbot"),
        };
        RelayBackend::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_literal_message() {
        let router = Router::new().route(
            "/chatbot",
            post(|Json(body): Json<serde_json::Value>| async move {
                let message = body["message"].as_str().unwrap_or_default().to_string();
                Json(json!({ "reply": format!("echo: {message}") }))
            }),
        );
        let backend = relay_at(router).await;
        let reply = backend.complete(&request("define photosynthesis")).await.unwrap();
        assert_eq!(reply.as_deref(), Some("echo: define photosynthesis"));
    }

    #[tokio::test]
    async fn test_missing_reply_field_is_soft_failure() {
        let router = Router::new().route("/chatbot", post(|| async { Json(json!({ "ok": true })) }));
        let backend = relay_at(router).await;
        assert_eq!(backend.complete(&request("hi")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let router = Router::new().route(
            "/chatbot",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let backend = relay_at(router).await;
        assert!(matches!(
            backend.complete(&request("hi")).await,
            Err(RequestError::Status { status: 502, .. })
        ));
    }
}
