//! Speech input adapter: one capture session at a time, one final
//! transcript (or one failure) per session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ListenError, RecognitionError};
use crate::session::SessionEvent;

/// Platform speech recognition: capture until the speaker stops, then
/// return the final transcript. No interim results.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize_once(&self) -> Result<String, RecognitionError>;
}

/// Stand-in used when no recognition engine is available.
pub struct UnavailableRecognizer {
    reason: String,
}

impl UnavailableRecognizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Recognizer for UnavailableRecognizer {
    async fn recognize_once(&self) -> Result<String, RecognitionError> {
        Err(RecognitionError::Unavailable(self.reason.clone()))
    }
}

pub struct SpeechInputAdapter {
    recognizer: Arc<dyn Recognizer>,
    events: mpsc::UnboundedSender<SessionEvent>,
    listening: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SpeechInputAdapter {
    pub fn new(recognizer: Arc<dyn Recognizer>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            recognizer,
            events,
            listening: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Begin a single-shot capture. Exactly one `Transcript` or
    /// `RecognitionFailed` event follows. Rejected while a capture runs.
    pub fn start_listening(&mut self) -> Result<(), ListenError> {
        if self.listening.swap(true, Ordering::AcqRel) {
            debug!("start_listening ignored: capture already active");
            return Err(ListenError::AlreadyListening);
        }
        info!("Listening started");

        let recognizer = Arc::clone(&self.recognizer);
        let listening = Arc::clone(&self.listening);
        let events = self.events.clone();

        self.task = Some(tokio::spawn(async move {
            let result = recognizer.recognize_once().await;
            // Idle again before the controller sees the outcome.
            listening.store(false, Ordering::Release);

            let event = match result {
                Ok(transcript) if transcript.trim().is_empty() => {
                    SessionEvent::RecognitionFailed(RecognitionError::NoSpeech)
                }
                Ok(transcript) => {
                    info!("Transcript: \"{}\"", transcript.trim());
                    SessionEvent::Transcript(transcript.trim().to_string())
                }
                Err(e) => {
                    warn!("Recognition failed: {e}");
                    SessionEvent::RecognitionFailed(e)
                }
            };
            if events.send(event).is_err() {
                debug!("Session gone, dropping recognition result");
            }
        }));

        Ok(())
    }
}

#[cfg(test)]
impl SpeechInputAdapter {
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }
}

impl Drop for SpeechInputAdapter {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use tokio::sync::Notify;

    use super::*;

    /// Recognizer that returns scripted results, optionally holding each
    /// capture open until `release` is notified.
    pub struct ScriptedRecognizer {
        results: Mutex<Vec<Result<String, RecognitionError>>>,
        pub release: Option<Arc<Notify>>,
    }

    impl ScriptedRecognizer {
        pub fn new(results: Vec<Result<String, RecognitionError>>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().rev().collect()),
                release: None,
            }
        }

        pub fn gated(results: Vec<Result<String, RecognitionError>>, release: Arc<Notify>) -> Self {
            Self {
                release: Some(release),
                ..Self::new(results)
            }
        }
    }

    #[async_trait]
    impl Recognizer for ScriptedRecognizer {
        async fn recognize_once(&self) -> Result<String, RecognitionError> {
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(RecognitionError::NoSpeech))
        }
    }
}
