//! Kokoro TTS: text → phonemes → ONNX inference → audio playback.
//!
//! Pipeline:
//! 1. Text → sentences (split on .!?)
//! 2. Sentence → phonemes (misaki-rs G2P)
//! 3. Phonemes → token IDs (tokenizer.json vocabulary)
//! 4. Token IDs + voice style + speed → ONNX inference → f32 audio (24kHz)
//! 5. Audio → rodio Sink playback, polled for cancellation

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ndarray::{Array1, Array2, Array3};
use ndarray_npy::NpzReader;
use ort::value::Tensor;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use super::output::Synthesizer;
use super::{split_sentences, CancelFlag, PlaybackOutcome, SpeechUtterance};
use crate::config::SpeechOutputConfig;
use crate::error::SynthesisError;

const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension
const STYLE_DIM: usize = 256;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// ONNX model plus the tables needed to feed it.
struct Engine {
    // ort 2.0 Session::run needs &mut
    session: Mutex<ort::session::Session>,
    phonemizer: misaki_rs::G2P,
    vocab: HashMap<char, i64>,
    /// Style vectors indexed by token count, shape (510, 256).
    styles: Array2<f32>,
    speed: f32,
}

pub struct KokoroSynthesizer {
    engine: Arc<Engine>,
    // Kept alive for the process lifetime
    output: OutputStream,
}

impl KokoroSynthesizer {
    /// Load tokenizer, voice, ONNX model and phonemizer, and open the
    /// default output device. Blocking; call from `spawn_blocking`.
    pub fn load(config: &SpeechOutputConfig) -> Result<Self, SynthesisError> {
        let t0 = Instant::now();

        let tokenizer_path = resolve_asset(&config.tokenizer_path);
        info!("Loading tokenizer from {}", tokenizer_path.display());
        let vocab = load_tokenizer(&tokenizer_path).map_err(SynthesisError::Unavailable)?;
        info!("Tokenizer loaded: {} tokens", vocab.len());

        let voices_path = resolve_asset(&config.voices_path);
        info!("Loading voice '{}' from {}", config.voice, voices_path.display());
        let styles = load_voice(&voices_path, &config.voice).map_err(SynthesisError::Unavailable)?;

        let model_path = resolve_asset(&config.model_path);
        info!("Loading ONNX model from {}", model_path.display());
        let unavailable = |e: String| SynthesisError::Unavailable(e);
        let session = ort::session::Session::builder()
            .map_err(|e| unavailable(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| unavailable(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| unavailable(format!("failed to set thread count: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| unavailable(format!("failed to load ONNX model: {e}")))?;

        let phonemizer = misaki_rs::G2P::new(misaki_rs::Language::EnglishUS);

        let output = OutputStreamBuilder::open_default_stream()
            .map_err(|e| SynthesisError::Unavailable(format!("failed to open audio output: {e}")))?;

        info!("Kokoro TTS loaded in {}ms", t0.elapsed().as_millis());

        Ok(Self {
            engine: Arc::new(Engine {
                session: Mutex::new(session),
                phonemizer,
                vocab,
                styles,
                speed: config.speed,
            }),
            output,
        })
    }

    /// Play samples until done or cancelled. Returns true if cancelled.
    async fn play_samples(&self, samples: Vec<f32>, cancel: &CancelFlag) -> bool {
        let sink = Sink::connect_new(self.output.mixer());
        sink.append(SamplesBuffer::new(1, SAMPLE_RATE, samples));

        loop {
            if cancel.is_cancelled() {
                sink.stop();
                return true;
            }
            if sink.empty() {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Synthesizer for KokoroSynthesizer {
    async fn play(
        &self,
        utterance: &SpeechUtterance,
        cancel: &CancelFlag,
    ) -> Result<PlaybackOutcome, SynthesisError> {
        let sentences: Vec<String> = split_sentences(utterance.text.trim())
            .into_iter()
            .map(str::to_string)
            .collect();
        let total = sentences.len();
        let mut last_error = None;
        let mut played = 0;

        for (i, sentence) in sentences.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancelled before sentence {}/{total}", i + 1);
                return Ok(PlaybackOutcome::Cancelled);
            }

            let t_gen = Instant::now();
            let engine = Arc::clone(&self.engine);
            let generated = tokio::task::spawn_blocking(move || engine.generate(&sentence))
                .await
                .map_err(|e| SynthesisError::Engine(format!("generation task failed: {e}")))?;
            let samples = match generated {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("TTS generation failed for sentence {}: {e}", i + 1);
                    last_error = Some(e);
                    continue;
                }
            };
            let gen_ms = t_gen.elapsed().as_secs_f64() * 1000.0;

            if cancel.is_cancelled() {
                info!("Cancelled after generating sentence {}/{total}", i + 1);
                return Ok(PlaybackOutcome::Cancelled);
            }
            if samples.is_empty() {
                continue;
            }

            let t_play = Instant::now();
            if self.play_samples(samples, cancel).await {
                info!("Cancelled during playback of sentence {}/{total}", i + 1);
                return Ok(PlaybackOutcome::Cancelled);
            }
            played += 1;
            debug!(
                "Sentence {}/{total}: gen={gen_ms:.0}ms play={:.1}s",
                i + 1,
                t_play.elapsed().as_secs_f64()
            );
        }

        match last_error {
            Some(e) if played == 0 => Err(SynthesisError::Engine(e)),
            _ => Ok(PlaybackOutcome::Completed),
        }
    }
}

impl Engine {
    /// Generate audio samples for a single sentence.
    fn generate(&self, text: &str) -> Result<Vec<f32>, String> {
        let (phonemes, _tokens) = self
            .phonemizer
            .g2p(text)
            .map_err(|e| format!("phonemization failed: {e}"))?;

        if phonemes.is_empty() {
            return Ok(Vec::new());
        }

        let token_ids = tokenize(&phonemes, &self.vocab);
        let n_tokens = token_ids.len();

        // Style row is picked by content length (clamped to table size)
        let style_idx = n_tokens.saturating_sub(2).min(self.styles.nrows() - 1);
        let style_vec: Vec<f32> = self.styles.row(style_idx).to_vec();

        let tokens_tensor = Array2::from_shape_vec((1, n_tokens), token_ids)
            .map_err(|e| format!("failed to shape tokens: {e}"))
            .and_then(|a| Tensor::from_array(a).map_err(|e| format!("tokens tensor: {e}")))?;
        let style_tensor = Array2::from_shape_vec((1, STYLE_DIM), style_vec)
            .map_err(|e| format!("failed to shape style: {e}"))
            .and_then(|a| Tensor::from_array(a).map_err(|e| format!("style tensor: {e}")))?;
        let speed_tensor = Tensor::from_array(Array1::from_vec(vec![self.speed]))
            .map_err(|e| format!("speed tensor: {e}"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| "ONNX session lock poisoned".to_string())?;
        let outputs = session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| format!("ONNX inference failed: {e}"))?;

        let first_output = outputs.iter().next().ok_or("no output tensor from model")?;
        let (_shape, audio) = first_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| format!("failed to extract audio tensor: {e}"))?;

        let samples: Vec<f32> = audio.to_vec();
        debug!(
            "Generated {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32
        );
        Ok(samples)
    }
}

/// Map phonemes to token IDs, padded with 0 on both ends and capped at
/// the style table length. Unknown characters are skipped.
fn tokenize(phonemes: &str, vocab: &HashMap<char, i64>) -> Vec<i64> {
    let mut ids = Vec::with_capacity(phonemes.len() + 2);
    ids.push(0);
    ids.extend(phonemes.chars().filter_map(|ch| vocab.get(&ch).copied()));
    ids.push(0);
    ids.truncate(MAX_TOKENS);
    ids
}

/// Relative asset paths fall back to the per-user data directory.
fn resolve_asset(name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() || path.exists() {
        return path;
    }
    dirs::data_dir()
        .map(|d| d.join("educonnect").join(name))
        .filter(|p| p.exists())
        .unwrap_or(path)
}

/// Load tokenizer vocabulary from tokenizer.json.
fn load_tokenizer(path: &Path) -> Result<HashMap<char, i64>, String> {
    let contents =
        fs::read_to_string(path).map_err(|e| format!("failed to read tokenizer: {e}"))?;
    parse_vocab(&contents)
}

fn parse_vocab(contents: &str) -> Result<HashMap<char, i64>, String> {
    let data: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| format!("failed to parse tokenizer JSON: {e}"))?;

    let vocab = data["model"]["vocab"]
        .as_object()
        .ok_or("missing model.vocab in tokenizer.json")?;

    let mut map = HashMap::new();
    for (token, id) in vocab {
        let id = id.as_i64().ok_or("token ID is not an integer")?;
        // Each token should be a single character
        if let Some(ch) = token.chars().next() {
            map.insert(ch, id);
        }
    }
    Ok(map)
}

/// Load one voice's style table from the NPZ voices file.
fn load_voice(path: &Path, voice: &str) -> Result<Array2<f32>, String> {
    let file = fs::File::open(path).map_err(|e| format!("failed to open voices file: {e}"))?;
    let mut npz = NpzReader::new(file).map_err(|e| format!("failed to read NPZ voices file: {e}"))?;

    let arr: Array3<f32> = npz
        .by_name(&format!("{voice}.npy"))
        .map_err(|e| format!("failed to read voice '{voice}': {e}"))?;

    // Shape is (510, 1, 256). Squeeze the middle dimension.
    let (rows, dim) = (arr.shape()[0], arr.shape()[2]);
    if rows == 0 || dim != STYLE_DIM {
        return Err(format!("voice '{voice}' has unexpected shape {:?}", arr.shape()));
    }
    arr.into_shape_with_order((rows, dim))
        .map_err(|e| format!("failed to reshape voice '{voice}': {e}"))
}
