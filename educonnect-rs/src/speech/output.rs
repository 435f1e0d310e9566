//! Speech output adapter: speaks one utterance at a time.
//!
//! `speak` cancels whatever is playing and starts the new text; nothing is
//! ever queued. Playback runs under a lock, so a superseded utterance has
//! released the device before its successor emits `PlaybackStarted`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::{CancelFlag, PlaybackOutcome, SpeechUtterance, UtteranceId};
use crate::error::SynthesisError;
use crate::session::SessionEvent;

/// Platform speech synthesis. `play` returns once the utterance finished
/// or `cancel` was observed.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn play(
        &self,
        utterance: &SpeechUtterance,
        cancel: &CancelFlag,
    ) -> Result<PlaybackOutcome, SynthesisError>;
}

/// Synthesizer for text-only sessions. Still reports a playback lifecycle.
pub struct MutedSynthesizer;

#[async_trait]
impl Synthesizer for MutedSynthesizer {
    async fn play(
        &self,
        utterance: &SpeechUtterance,
        cancel: &CancelFlag,
    ) -> Result<PlaybackOutcome, SynthesisError> {
        debug!("Muted playback ({} chars)", utterance.text.len());
        if cancel.is_cancelled() {
            Ok(PlaybackOutcome::Cancelled)
        } else {
            Ok(PlaybackOutcome::Completed)
        }
    }
}

pub struct SpeechOutputAdapter {
    synthesizer: Arc<dyn Synthesizer>,
    events: mpsc::UnboundedSender<SessionEvent>,
    playback_lock: Arc<AsyncMutex<()>>,
    next_id: u64,
    active: Option<(UtteranceId, CancelFlag)>,
}

impl SpeechOutputAdapter {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            synthesizer,
            events,
            playback_lock: Arc::new(AsyncMutex::new(())),
            next_id: 0,
            active: None,
        }
    }

    /// Cancel the current utterance and start speaking `text`.
    pub fn speak(&mut self, text: &str) -> UtteranceId {
        self.stop();

        self.next_id += 1;
        let id = UtteranceId(self.next_id);
        let cancel = CancelFlag::new();
        self.active = Some((id, cancel.clone()));

        let utterance = SpeechUtterance::new(text);
        let synthesizer = Arc::clone(&self.synthesizer);
        let lock = Arc::clone(&self.playback_lock);
        let events = self.events.clone();

        tokio::spawn(async move {
            let _guard = lock.lock().await;
            if cancel.is_cancelled() {
                debug!("Utterance {id} superseded before it started");
                return;
            }

            let _ = events.send(SessionEvent::PlaybackStarted(id));
            let outcome = match synthesizer.play(&utterance, &cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Playback of utterance {id} failed: {e}");
                    PlaybackOutcome::Failed
                }
            };
            debug!("Utterance {id} ended: {outcome:?}");
            let _ = events.send(SessionEvent::PlaybackEnded(id, outcome));
        });

        info!("Speaking utterance {id} ({} chars)", text.len());
        id
    }

    /// Cancel playback. Safe to call when nothing is playing.
    pub fn stop(&mut self) {
        if let Some((id, cancel)) = self.active.take() {
            if !cancel.is_cancelled() {
                cancel.cancel();
                debug!("Cancelled utterance {id}");
            }
        }
    }
}

impl Drop for SpeechOutputAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}
