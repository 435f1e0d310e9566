//! Session controller with state machine.
//!
//! IDLE → AWAITING_REPLY → IDLE
//!
//! The controller is the only writer of session state. Adapters and the
//! network task report back through [`SessionEvent`]s, which the service
//! loop feeds into [`SessionController::handle_event`] one at a time.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{ListenError, RecognitionError, RequestError, SubmitError};
use crate::message::{Message, MessageHistory};
use crate::notifier::Notifier;
use crate::prompt::{PromptClient, CONNECTION_APOLOGY};
use crate::speech::input::{Recognizer, SpeechInputAdapter};
use crate::speech::output::{SpeechOutputAdapter, Synthesizer};
use crate::speech::{PlaybackOutcome, UtteranceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TurnId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingReply(TurnId),
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::AwaitingReply(_) => write!(f, "AWAITING_REPLY"),
        }
    }
}

/// Completions delivered to the controller by adapters and the network task.
#[derive(Debug)]
pub enum SessionEvent {
    ReplyReady {
        turn: TurnId,
        result: Result<String, RequestError>,
    },
    Transcript(String),
    RecognitionFailed(RecognitionError),
    PlaybackStarted(UtteranceId),
    PlaybackEnded(UtteranceId, PlaybackOutcome),
}

/// Read-only view published after every state change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub pending_input: String,
    pub is_awaiting_reply: bool,
    pub is_speaking: bool,
    pub is_listening: bool,
    pub notice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Speak the connection apology as well as real replies.
    pub speak_errors: bool,
    pub notifier: Notifier,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            speak_errors: false,
            notifier: Notifier::new(false),
        }
    }
}

pub struct SessionController {
    prompt: PromptClient,
    speech_in: SpeechInputAdapter,
    speech_out: SpeechOutputAdapter,
    events: mpsc::UnboundedSender<SessionEvent>,
    options: SessionOptions,

    history: MessageHistory,
    pending_input: String,
    phase: SessionPhase,
    is_speaking: bool,
    is_listening: bool,
    current_utterance: Option<UtteranceId>,
    notice: Option<String>,
    next_turn: u64,

    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    /// Create a session. The returned receiver carries completions that
    /// must be passed back into [`handle_event`](Self::handle_event).
    pub fn new(
        prompt: PromptClient,
        recognizer: Arc<dyn Recognizer>,
        synthesizer: Arc<dyn Synthesizer>,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        let session = Self {
            prompt,
            speech_in: SpeechInputAdapter::new(recognizer, events.clone()),
            speech_out: SpeechOutputAdapter::new(synthesizer, events.clone()),
            events,
            options,
            history: MessageHistory::new(),
            pending_input: String::new(),
            phase: SessionPhase::Idle,
            is_speaking: false,
            is_listening: false,
            current_utterance: None,
            notice: None,
            next_turn: 0,
            snapshot_tx,
        };
        (session, events_rx)
    }

    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self.phase, SessionPhase::AwaitingReply(_))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.history.as_slice().to_vec(),
            pending_input: self.pending_input.clone(),
            is_awaiting_reply: self.is_awaiting_reply(),
            is_speaking: self.is_speaking,
            is_listening: self.is_listening,
            notice: self.notice.clone(),
        }
    }

    /// Observe state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn set_pending_input(&mut self, text: &str) {
        self.pending_input = text.to_string();
        self.publish();
    }

    /// Submit one user turn.
    ///
    /// The user message is appended before the request is dispatched. The
    /// text is stored and forwarded exactly as given. Blank text and
    /// submissions while a reply is outstanding are rejected without
    /// touching any state.
    pub fn submit(&mut self, text: &str) -> Result<TurnId, SubmitError> {
        if text.trim().is_empty() {
            debug!("Ignoring empty submission");
            return Err(SubmitError::EmptyInput);
        }
        if self.is_awaiting_reply() {
            info!("Submission rejected: reply still pending");
            return Err(SubmitError::Busy);
        }

        // Phase one: commit the user turn.
        self.history.push_user(text);
        self.pending_input.clear();
        self.notice = None;
        self.next_turn += 1;
        let turn = TurnId(self.next_turn);
        self.phase = SessionPhase::AwaitingReply(turn);
        info!("State: IDLE → AWAITING_REPLY (turn {})", turn.0);
        self.publish();

        // Phase two: the reply lands later via `SessionEvent::ReplyReady`.
        let prompt = self.prompt.clone();
        let events = self.events.clone();
        let user_text = text.to_string();
        tokio::spawn(async move {
            let result = prompt.send(&user_text).await;
            if events.send(SessionEvent::ReplyReady { turn, result }).is_err() {
                debug!("Session gone, dropping reply for turn {}", turn.0);
            }
        });

        Ok(turn)
    }

    /// Start a single-shot voice capture. Stops any speech first so the
    /// microphone never hears the assistant.
    pub fn start_listening(&mut self) -> Result<(), ListenError> {
        if self.is_awaiting_reply() {
            return Err(ListenError::Busy);
        }
        if self.is_listening {
            return Err(ListenError::AlreadyListening);
        }

        self.stop_speaking();
        self.speech_in.start_listening()?;
        self.is_listening = true;
        self.notice = None;
        self.publish();
        Ok(())
    }

    /// Cancel playback immediately. Safe to call when silent.
    pub fn stop_speaking(&mut self) {
        self.speech_out.stop();
        self.current_utterance = None;
        if self.is_speaking {
            self.is_speaking = false;
            self.publish();
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ReplyReady { turn, result } => self.on_reply(turn, result),
            SessionEvent::Transcript(text) => self.on_transcript(&text),
            SessionEvent::RecognitionFailed(err) => self.on_recognition_failed(&err),
            SessionEvent::PlaybackStarted(id) => {
                if self.current_utterance == Some(id) {
                    self.is_speaking = true;
                    self.publish();
                }
            }
            SessionEvent::PlaybackEnded(id, outcome) => {
                if self.current_utterance == Some(id) {
                    debug!("Utterance {id} finished: {outcome:?}");
                    self.current_utterance = None;
                    self.is_speaking = false;
                    self.publish();
                }
            }
        }
    }

    fn on_reply(&mut self, turn: TurnId, result: Result<String, RequestError>) {
        if self.phase != SessionPhase::AwaitingReply(turn) {
            warn!("Ignoring reply for stale turn {}", turn.0);
            return;
        }

        let (text, speak) = match result {
            Ok(reply) => (reply, true),
            Err(e) => {
                warn!("Request for turn {} failed: {e}", turn.0);
                (CONNECTION_APOLOGY.to_string(), self.options.speak_errors)
            }
        };

        self.history.push_bot(text.as_str());
        self.phase = SessionPhase::Idle;
        info!("State: AWAITING_REPLY → IDLE (turn {})", turn.0);

        if speak {
            if self.is_listening {
                debug!("Not speaking reply while listening");
            } else {
                self.current_utterance = Some(self.speech_out.speak(&text));
            }
        }
        self.publish();
    }

    fn on_transcript(&mut self, text: &str) {
        self.is_listening = false;
        self.pending_input = text.to_string();
        match self.submit(text) {
            Ok(_) => {}
            Err(SubmitError::Busy) => {
                // Keep the words so they can be sent once the reply lands.
                self.notice = Some("Still answering your last question. Send it again in a moment.".into());
                self.publish();
            }
            Err(SubmitError::EmptyInput) => self.on_recognition_failed(&RecognitionError::NoSpeech),
        }
    }

    fn on_recognition_failed(&mut self, err: &RecognitionError) {
        warn!("Voice input failed: {err}");
        self.is_listening = false;
        let message = err.user_message();
        self.notice = Some(message.to_string());
        self.options.notifier.notify("Voice input", message);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

// Front ends read state through snapshots; direct accessors are for tests.
#[cfg(test)]
impl SessionController {
    pub fn messages(&self) -> &MessageHistory {
        &self.history
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    pub fn is_listening(&self) -> bool {
        self.is_listening
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}
