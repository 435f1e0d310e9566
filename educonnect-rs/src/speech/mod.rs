//! Speech input and output adapters.
//!
//! Components:
//! - `input`: single-shot recognition session around a [`input::Recognizer`]
//! - `output`: one-utterance-at-a-time playback around a [`output::Synthesizer`]
//! - `capture` + `whisper`: microphone capture and Whisper ASR (`voice-input`)
//! - `kokoro`: Kokoro ONNX synthesis with rodio playback (`voice-output`)

#[cfg(feature = "voice-input")]
pub mod capture;
pub mod input;
#[cfg(feature = "voice-output")]
pub mod kokoro;
pub mod output;
#[cfg(feature = "voice-input")]
pub mod whisper;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Text handed to the synthesizer for one playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechUtterance {
    pub text: String,
}

impl SpeechUtterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UtteranceId(pub u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Cancellation flag owned by one utterance. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?')
            && bytes.get(i + 1).is_some_and(|next| next.is_ascii_whitespace())
        {
            let s = text[start..=i].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = i + 1;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}
