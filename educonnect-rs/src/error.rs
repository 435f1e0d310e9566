//! Error types for the assistant.
//!
//! None of these are fatal: request failures become a fixed apology in the
//! transcript, recognition failures become a notice, and rejected input is
//! absorbed by the session.

/// Failure talking to the generative-language backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("backend misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key as a query parameter.
        let err = err.without_url();
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_decode() {
            RequestError::Decode(err.to_string())
        } else {
            RequestError::Transport(err.to_string())
        }
    }
}

/// Failure of a single-shot speech capture.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("no speech detected")]
    NoSpeech,
    #[error("speech recognition unavailable: {0}")]
    Unavailable(String),
    #[error("recognizer error: {0}")]
    Engine(String),
}

impl RecognitionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            RecognitionError::PermissionDenied(_) => {
                "Microphone access was denied. Please check your audio permissions."
            }
            RecognitionError::NoSpeech => "I didn't catch that. Please try speaking again.",
            RecognitionError::Unavailable(_) => {
                "Voice input isn't available here. Please type your question instead."
            }
            RecognitionError::Engine(_) => "Speech recognition failed. Please try again.",
        }
    }
}

/// Failure of the speech synthesis engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("speech synthesis unavailable: {0}")]
    Unavailable(String),
    #[error("synthesis error: {0}")]
    Engine(String),
}

/// Why a `submit` was rejected without any state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("message cannot be empty")]
    EmptyInput,
    #[error("still waiting for the previous reply")]
    Busy,
}

/// Why a `start_listening` was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ListenError {
    #[error("already listening")]
    AlreadyListening,
    #[error("still waiting for the previous reply")]
    Busy,
}
