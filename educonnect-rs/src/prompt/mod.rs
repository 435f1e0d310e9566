//! Prompt client: frames a single-turn request, sends it to the configured
//! backend and turns the raw reply into display text.
//!
//! Backends:
//! - `gemini`: generative-language REST API (`generateContent`)
//! - `relay`: a local relay that takes `{message}` and answers `{reply}`

pub mod gemini;
pub mod relay;
pub mod sanitize;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, Config, GenerationConfig};
use crate::error::RequestError;

pub use sanitize::sanitize_reply;

/// Reply used when the backend answers successfully but without usable text.
pub const FALLBACK_REPLY: &str =
    "I couldn't generate a response. Could you please rephrase your question?";

/// Bot message shown when the backend can't be reached at all.
pub const CONNECTION_APOLOGY: &str =
    "Sorry, I'm having trouble connecting to the AI service. Please try again.";

/// One outbound turn. No earlier turns are ever included.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    /// The literal text the user typed or said.
    pub user_text: String,
    /// System framing followed by the user text.
    pub framed: String,
    pub generation: GenerationConfig,
}

#[async_trait]
pub trait PromptBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the backend answered but carried no usable text.
    async fn complete(&self, request: &PromptRequest) -> Result<Option<String>, RequestError>;
}

#[derive(Clone)]
pub struct PromptClient {
    backend: Arc<dyn PromptBackend>,
    framing: String,
    generation: GenerationConfig,
}

impl PromptClient {
    pub fn new(
        backend: Arc<dyn PromptBackend>,
        framing: impl Into<String>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            backend,
            framing: framing.into(),
            generation,
        }
    }

    /// Build the client and backend selected in `config`.
    pub fn from_config(config: &Config) -> Result<Self, RequestError> {
        let timeout = Duration::from_secs(config.backend.timeout_secs);
        let backend: Arc<dyn PromptBackend> = match config.backend.kind {
            BackendKind::Gemini => Arc::new(gemini::GeminiBackend::new(&config.gemini, timeout)?),
            BackendKind::Relay => Arc::new(relay::RelayBackend::new(&config.relay, timeout)?),
        };
        info!("Prompt backend: {}", backend.name());
        Ok(Self::new(
            backend,
            config.prompt.system_framing.clone(),
            config.generation.clone(),
        ))
    }

    pub fn build_request(&self, user_text: &str) -> PromptRequest {
        PromptRequest {
            user_text: user_text.to_string(),
            framed: format!("{}\n\nStudent: {}", self.framing, user_text),
            generation: self.generation.clone(),
        }
    }

    /// Send one turn and return clean display text.
    ///
    /// A reply that is missing or empty after cleanup becomes
    /// [`FALLBACK_REPLY`]; only transport-level problems are errors.
    pub async fn send(&self, user_text: &str) -> Result<String, RequestError> {
        let request = self.build_request(user_text);
        debug!("Sending to {}: {}", self.backend.name(), user_text);

        let t0 = Instant::now();
        let raw = self.backend.complete(&request).await?;
        let latency_ms = t0.elapsed().as_secs_f64() * 1000.0;

        let reply = raw
            .as_deref()
            .map(sanitize_reply)
            .filter(|text| !text.is_empty());

        match reply {
            Some(text) => {
                info!("Reply from {} in {latency_ms:.0}ms ({} chars)", self.backend.name(), text.len());
                Ok(text)
            }
            None => {
                warn!("{} returned no usable reply, using fallback", self.backend.name());
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Backend that replays canned results in order and records requests.
    pub struct ScriptedBackend {
        replies: Mutex<Vec<Result<Option<String>, RequestError>>>,
        pub seen: Mutex<Vec<PromptRequest>>,
    }

    impl ScriptedBackend {
        pub fn new(replies: Vec<Result<Option<String>, RequestError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn reply(text: &str) -> Self {
            Self::new(vec![Ok(Some(text.to_string()))])
        }
    }

    #[async_trait]
    impl PromptBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, request: &PromptRequest) -> Result<Option<String>, RequestError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(None))
        }
    }

    /// Serve `router` on an ephemeral localhost port and return its base URL.
    pub async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedBackend;
    use super::*;

    fn client(backend: ScriptedBackend) -> (PromptClient, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let client = PromptClient::new(backend.clone(), "Be brief.", GenerationConfig::default());
        (client, backend)
    }

    #[tokio::test]
    async fn test_reply_is_sanitized() {
        let (client, _) = client(ScriptedBackend::reply("We offer **Math** and ```Science```."));
        let reply = client.send("What courses do you offer?").await.unwrap();
        assert_eq!(reply, "We offer Math and Science.");
    }

    #[tokio::test]
    async fn test_missing_candidate_uses_fallback() {
        let (client, _) = client(ScriptedBackend::new(vec![Ok(None)]));
        assert_eq!(client.send("hello").await.unwrap(), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_reply_empty_after_cleanup_uses_fallback() {
        let (client, _) = client(ScriptedBackend::reply("  **  "));
        assert_eq!(client.send("hello").await.unwrap(), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let (client, _) = client(ScriptedBackend::new(vec![Err(RequestError::Timeout)]));
        assert!(matches!(client.send("hello").await, Err(RequestError::Timeout)));
    }

    #[tokio::test]
    async fn test_request_is_single_turn_and_framed() {
        let (client, backend) = client(ScriptedBackend::new(vec![Ok(None), Ok(None)]));
        client.send("first question").await.unwrap();
        client.send("second question").await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].user_text, "second question");
        assert!(seen[1].framed.starts_with("Be brief."));
        assert!(seen[1].framed.ends_with("second question"));
        assert!(!seen[1].framed.contains("first question"));
    }
}
