//! Single-shot microphone capture with cpal.
//!
//! Opens the default input device for one utterance, stops on trailing
//! silence or the duration cap, and returns 16kHz mono f32 samples
//! suitable for Whisper.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleRate, StreamConfig};
use tracing::{debug, info, warn};

use crate::config::SpeechInputConfig;
use crate::error::RecognitionError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Tracks one capture and decides when to stop.
///
/// Time is measured in samples so the decision does not depend on callback
/// scheduling.
#[derive(Debug)]
struct Capture {
    buffer: Vec<f32>,
    max_samples: usize,
    min_speech_samples: usize,
    silence_samples_needed: usize,
    silent_run: usize,
    threshold: f32,
    done: bool,
}

impl Capture {
    fn new(config: &SpeechInputConfig) -> Self {
        let rate = config.sample_rate as f64;
        let max_samples = (config.max_duration * rate) as usize;
        Self {
            buffer: Vec::with_capacity(max_samples),
            max_samples,
            min_speech_samples: (config.min_speech_duration * rate) as usize,
            silence_samples_needed: (config.silence_duration * rate) as usize,
            silent_run: 0,
            threshold: config.silence_threshold,
            done: false,
        }
    }

    fn feed(&mut self, data: &[f32]) {
        if self.done {
            return;
        }

        let remaining = self.max_samples.saturating_sub(self.buffer.len());
        let to_copy = data.len().min(remaining);
        self.buffer.extend_from_slice(&data[..to_copy]);

        if self.buffer.len() >= self.max_samples {
            info!("Max recording duration reached");
            self.done = true;
            return;
        }

        // Don't check silence until minimum speech duration
        if self.buffer.len() < self.min_speech_samples {
            return;
        }

        if rms_energy(data) < self.threshold {
            self.silent_run += data.len();
            if self.silent_run >= self.silence_samples_needed {
                debug!("Trailing silence detected, stopping capture");
                self.done = true;
            }
        } else {
            self.silent_run = 0;
        }
    }
}

/// Default input device, opened per utterance.
pub struct Microphone {
    config: SpeechInputConfig,
}

impl Microphone {
    pub fn new(config: SpeechInputConfig) -> Self {
        Self { config }
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Record one utterance. Blocks the calling thread; run it inside
    /// `spawn_blocking`.
    pub fn capture_blocking(&self) -> Result<Vec<f32>, RecognitionError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| RecognitionError::Unavailable("no input audio device".into()))?;

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(Mutex::new(Capture::new(&self.config)));
        let callback_state = Arc::clone(&shared);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if let Ok(mut capture) = callback_state.lock() {
                        capture.feed(data);
                    }
                },
                move |err| {
                    warn!("Audio stream error: {err}");
                },
                None,
            )
            .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| RecognitionError::Engine(format!("failed to start audio stream: {e}")))?;
        info!("Listening...");

        // Safety net in case the device stops delivering callbacks.
        let deadline = Duration::from_secs_f64(self.config.max_duration) + Duration::from_secs(2);
        let mut waited = Duration::ZERO;
        loop {
            std::thread::sleep(POLL_INTERVAL);
            waited += POLL_INTERVAL;
            let done = shared.lock().map(|c| c.done).unwrap_or(true);
            if done || waited >= deadline {
                break;
            }
        }
        drop(stream);

        let samples = match shared.lock() {
            Ok(mut capture) => std::mem::take(&mut capture.buffer),
            Err(_) => return Err(RecognitionError::Engine("capture state poisoned".into())),
        };
        let duration = samples.len() as f64 / self.config.sample_rate as f64;
        info!("Capture stopped: {:.1}s ({} samples)", duration, samples.len());

        if let Some(path) = &self.config.debug_wav {
            save_wav(path, &samples, self.config.sample_rate);
        }

        if is_silent(&samples, self.config.silence_threshold) {
            return Err(RecognitionError::NoSpeech);
        }
        Ok(samples)
    }
}

fn map_build_error(err: BuildStreamError) -> RecognitionError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            RecognitionError::Unavailable("input device not available".into())
        }
        BuildStreamError::BackendSpecific { err } => backend_error(err.description),
        other => RecognitionError::Engine(format!("failed to build input stream: {other}")),
    }
}

/// Backends report denied microphone access only through their message text.
fn backend_error(description: String) -> RecognitionError {
    let lower = description.to_lowercase();
    let denied = ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|hint| lower.contains(hint));
    if denied {
        RecognitionError::PermissionDenied(description)
    } else {
        RecognitionError::Engine(format!("audio backend error: {description}"))
    }
}

/// Save captured audio for debugging recognition problems.
fn save_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    match hound::WavWriter::create(path, spec) {
        Ok(mut writer) => {
            for &sample in samples {
                // f32 [-1, 1] → i16
                let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                if writer.write_sample(s).is_err() {
                    break;
                }
            }
            if writer.finalize().is_ok() {
                info!("Saved WAV to {}", path.display());
            }
        }
        Err(e) => {
            warn!("Failed to save WAV: {e}");
        }
    }
}

fn is_silent(samples: &[f32], threshold: f32) -> bool {
    let rms = rms_energy(samples);
    debug!("Audio RMS energy: {rms:.4} (threshold: {threshold})");
    rms < threshold
}

/// Calculate RMS energy of audio samples.
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
