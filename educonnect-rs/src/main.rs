//! educonnect: voice-enabled tutoring assistant.

mod api;
mod config;
mod error;
mod message;
mod notifier;
mod prompt;
mod service;
mod session;
mod speech;
mod terminal;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::speech::input::{Recognizer, UnavailableRecognizer};
use crate::speech::output::{MutedSynthesizer, Synthesizer};

#[derive(Parser, Debug)]
#[command(name = "educonnect", about = "Voice-enabled tutoring assistant")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable voice input and output
    #[arg(long)]
    no_speech: bool,

    /// Serve the local HTTP API on this port
    #[arg(long)]
    api_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Suppress noisy inference internals unless RUST_LOG says otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug,ort=info,whisper_rs=info,hyper=info,reqwest=info")
        } else {
            EnvFilter::new("info,ort=warn,whisper_rs=warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("educonnect starting");

    let mut config = Config::load(args.config.as_deref());
    if args.no_speech {
        config.speech_input.enabled = false;
        config.speech_output.enabled = false;
    }
    if let Some(port) = args.api_port {
        config.api.enabled = true;
        config.api.port = port;
    }

    let prompt = prompt::PromptClient::from_config(&config)?;

    let recognizer = load_recognizer(&config).await;
    let synthesizer = load_synthesizer(&config).await;

    let options = session::SessionOptions {
        speak_errors: config.speech_output.speak_errors,
        notifier: notifier::Notifier::new(config.feedback.notifications),
    };
    let (session, events) =
        session::SessionController::new(prompt, recognizer, synthesizer, options);

    let api_port = config.api.enabled.then_some(config.api.port);
    service::AssistantService::new(session, events, api_port)
        .run()
        .await
}

#[cfg(feature = "voice-input")]
async fn load_recognizer(config: &Config) -> Arc<dyn Recognizer> {
    if !config.speech_input.enabled {
        return Arc::new(UnavailableRecognizer::new("voice input disabled"));
    }

    // Load Whisper model (blocking, takes a few seconds)
    info!("Loading Whisper model...");
    let input_config = config.speech_input.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        speech::whisper::WhisperRecognizer::load(&input_config)
    })
    .await;

    match loaded {
        Ok(Ok(recognizer)) => Arc::new(recognizer),
        Ok(Err(e)) => {
            tracing::warn!("Voice input disabled: {e}");
            Arc::new(UnavailableRecognizer::new(e.to_string()))
        }
        Err(e) => {
            tracing::warn!("Voice input disabled: {e}");
            Arc::new(UnavailableRecognizer::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "voice-input"))]
async fn load_recognizer(_config: &Config) -> Arc<dyn Recognizer> {
    Arc::new(UnavailableRecognizer::new("built without voice-input"))
}

#[cfg(feature = "voice-output")]
async fn load_synthesizer(config: &Config) -> Arc<dyn Synthesizer> {
    if !config.speech_output.enabled {
        return Arc::new(MutedSynthesizer);
    }

    info!("Loading Kokoro TTS model...");
    let output_config = config.speech_output.clone();
    let loaded = tokio::task::spawn_blocking(move || {
        speech::kokoro::KokoroSynthesizer::load(&output_config)
    })
    .await;

    match loaded {
        Ok(Ok(synthesizer)) => {
            info!(
                "Voice output ready (voice: {}, speed: {})",
                config.speech_output.voice, config.speech_output.speed
            );
            Arc::new(synthesizer)
        }
        Ok(Err(e)) => {
            tracing::warn!("Failed to load TTS model: {e}");
            info!("TTS disabled, continuing without voice output");
            Arc::new(MutedSynthesizer)
        }
        Err(e) => {
            tracing::warn!("TTS loader panicked: {e}");
            Arc::new(MutedSynthesizer)
        }
    }
}

#[cfg(not(feature = "voice-output"))]
async fn load_synthesizer(_config: &Config) -> Arc<dyn Synthesizer> {
    Arc::new(MutedSynthesizer)
}
