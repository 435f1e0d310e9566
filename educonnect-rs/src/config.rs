//! Configuration management for educonnect.
//!
//! Loads config from YAML files in standard locations. Every section is
//! optional; missing keys fall back to their defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_SYSTEM_FRAMING: &str = "You are EduConnect, an educational assistant. \
Answer the student's question concisely in a supportive, encouraging tone. \
Keep the response under 200 words.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Gemini,
    Relay,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Gemini,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub host: String,
    pub model: String,
    /// Falls back to `GEMINI_API_KEY` when unset.
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            host: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-1.5-flash".into(),
            api_key: None,
        }
    }
}

impl GeminiConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/chatbot".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_output_tokens: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_framing: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_framing: DEFAULT_SYSTEM_FRAMING.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechInputConfig {
    pub enabled: bool,
    pub sample_rate: u32,
    pub silence_threshold: f32,
    pub silence_duration: f64,
    pub min_speech_duration: f64,
    pub max_duration: f64,
    pub model: String,
    pub language: String,
    pub debug_wav: Option<PathBuf>,
}

impl Default for SpeechInputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 16000,
            silence_threshold: 0.01,
            silence_duration: 1.5,
            min_speech_duration: 0.5,
            max_duration: 30.0,
            model: "base.en".into(),
            language: "en".into(),
            debug_wav: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechOutputConfig {
    pub enabled: bool,
    pub voice: String,
    pub speed: f32,
    pub model_path: String,
    pub voices_path: String,
    pub tokenizer_path: String,
    /// Also speak the connection apology, not just real replies.
    pub speak_errors: bool,
}

impl Default for SpeechOutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: "af_heart".into(),
            speed: 1.0,
            model_path: "kokoro-v1.0.onnx".into(),
            voices_path: "voices-v1.0.bin".into(),
            tokenizer_path: "tokenizer.json".into(),
            speak_errors: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8780,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub notifications: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub gemini: GeminiConfig,
    pub relay: RelayConfig,
    pub generation: GenerationConfig,
    pub prompt: PromptConfig,
    pub speech_input: SpeechInputConfig,
    pub speech_output: SpeechOutputConfig,
    pub api: ApiConfig,
    pub feedback: FeedbackConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./educonnect.yaml
    /// 2. ~/.config/educonnect/config.yaml
    /// 3. /etc/educonnect/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("educonnect.yaml")),
                dirs::home_dir().map(|h| h.join(".config/educonnect/config.yaml")),
                Some(PathBuf::from("/etc/educonnect/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        // An empty document deserializes to unit, not an empty map.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend.kind, BackendKind::Gemini);
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.relay.url, "http://localhost:3000/chatbot");
        assert!(config.prompt.system_framing.contains("200 words"));
        assert!(!config.speech_output.speak_errors);
        assert!(!config.api.enabled);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
backend:
  kind: relay
generation:
  temperature: 0.2
speech_output:
  speak_errors: true
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Relay);
        assert_eq!(config.backend.timeout_secs, 30);
        assert!((config.generation.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.generation.max_output_tokens, 500);
        assert!(config.speech_output.speak_errors);
        assert_eq!(config.speech_output.voice, "af_heart");
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::parse("   \n").unwrap();
        assert_eq!(config.api.port, 8780);
    }

    #[test]
    fn test_unknown_backend_kind_is_rejected() {
        assert!(Config::parse("backend:\n  kind: carrier-pigeon\n").is_err());
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let gemini = GeminiConfig {
            api_key: Some("from-config".into()),
            ..GeminiConfig::default()
        };
        assert_eq!(gemini.resolve_api_key().as_deref(), Some("from-config"));
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/educonnect.yaml")));
        assert_eq!(config.gemini.model, "gemini-1.5-flash");
    }
}
