//! Whisper ASR recognition using whisper-rs (whisper.cpp bindings).
//!
//! Loads a GGML model once at startup. Each recognition captures one
//! utterance from the microphone and transcribes it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::capture::Microphone;
use super::input::Recognizer;
use crate::config::SpeechInputConfig;
use crate::error::RecognitionError;

pub struct WhisperRecognizer {
    ctx: Arc<WhisperContext>,
    microphone: Arc<Microphone>,
    language: String,
}

impl WhisperRecognizer {
    /// Load the Whisper GGML model named in `config`.
    pub fn load(config: &SpeechInputConfig) -> Result<Self, RecognitionError> {
        let model_path = find_model(&config.model)?;

        info!("Loading Whisper model from {}", model_path.display());
        let t0 = Instant::now();

        let path = model_path
            .to_str()
            .ok_or_else(|| RecognitionError::Unavailable("model path is not valid UTF-8".into()))?;
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| RecognitionError::Unavailable(format!("failed to load Whisper model: {e}")))?;

        info!("Whisper model loaded in {}ms", t0.elapsed().as_millis());

        Ok(Self {
            ctx: Arc::new(ctx),
            microphone: Arc::new(Microphone::new(config.clone())),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn recognize_once(&self) -> Result<String, RecognitionError> {
        let ctx = Arc::clone(&self.ctx);
        let microphone = Arc::clone(&self.microphone);
        let language = self.language.clone();

        tokio::task::spawn_blocking(move || {
            let samples = microphone.capture_blocking()?;
            transcribe(&ctx, &samples, &language, microphone.sample_rate())
        })
        .await
        .map_err(|e| RecognitionError::Engine(format!("recognition task failed: {e}")))?
    }
}

/// Transcribe 16kHz mono samples to text.
fn transcribe(
    ctx: &WhisperContext,
    samples: &[f32],
    language: &str,
    sample_rate: u32,
) -> Result<String, RecognitionError> {
    let t0 = Instant::now();

    let mut state = ctx
        .create_state()
        .map_err(|e| RecognitionError::Engine(format!("failed to create whisper state: {e}")))?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(Some(language));
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    params.set_single_segment(true);
    params.set_token_timestamps(false);

    state
        .full(params, samples)
        .map_err(|e| RecognitionError::Engine(format!("whisper inference failed: {e}")))?;

    let mut segments = Vec::new();
    for i in 0..state.full_n_segments() {
        if let Some(segment) = state.get_segment(i) {
            if let Ok(text) = segment.to_str_lossy() {
                segments.push(text.into_owned());
            }
        }
    }
    let text = join_segments(segments.iter().map(String::as_str));

    let latency_ms = t0.elapsed().as_secs_f64() * 1000.0;
    let audio_duration = samples.len() as f64 / sample_rate as f64;
    info!(
        "Transcribed {:.1}s audio in {:.0}ms: \"{}\"",
        audio_duration,
        latency_ms,
        truncate_preview(&text, 80)
    );

    Ok(text)
}

fn join_segments<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    segments
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the GGML model file.
fn find_model(model_name: &str) -> Result<PathBuf, RecognitionError> {
    // Direct path to an existing file
    let direct = PathBuf::from(model_name);
    if direct.exists() && direct.extension().is_some() {
        return Ok(direct);
    }

    let filename = format!("ggml-{}.bin", model_name.replace('/', "-"));
    let search_dirs: Vec<PathBuf> = [
        std::env::current_dir().ok(),
        dirs::home_dir().map(|h| h.join(".cache/whisper")),
        dirs::data_dir().map(|d| d.join("educonnect")),
    ]
    .into_iter()
    .flatten()
    .collect();

    search_dirs
        .iter()
        .map(|dir| dir.join(&filename))
        .find(|path| path.exists())
        .ok_or_else(|| {
            RecognitionError::Unavailable(format!(
                "Whisper model {filename} not found in {search_dirs:?}"
            ))
        })
}

fn truncate_preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_segments_skips_blank_segments() {
        let text = join_segments([" What is", "  ", "photosynthesis? "].into_iter());
        assert_eq!(text, "What is photosynthesis?");
    }

    #[test]
    fn test_truncate_preview_respects_char_boundaries() {
        assert_eq!(truncate_preview("short", 80), "short");
        assert_eq!(truncate_preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        let err = find_model("definitely-not-a-model").unwrap_err();
        assert!(matches!(err, RecognitionError::Unavailable(_)));
    }
}
