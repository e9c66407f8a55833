use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::diagnostics::LogLevel;
use crate::session::{
    AutoDetectSourceLanguageConfig, RecognizerConfig, SessionConfig, SpeechConfig,
    TranslationConfig,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub input: InputConfig,
    pub recognition: RecognitionConfig,
    pub transport: TransportConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "speech-session".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Sample rate sent to the service
    pub sample_rate: u32,
    pub channels: u16,
    /// Frame length read from audio files
    pub buffer_duration_ms: u64,
    /// Skip leading silence before speech onset
    pub voice_activity_detection: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_duration_ms: 100,
            voice_activity_detection: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub language: Option<String>,
    /// Candidate languages for auto-detection; empty disables it
    pub candidate_languages: Vec<String>,
    /// Translation targets; non-empty selects a translation recognizer
    pub target_languages: Vec<String>,
    pub authorization_token: Option<String>,
    pub segmentation_silence_ms: u64,
    pub max_utterance_ms: u64,
    pub initial_silence_timeout_ms: u64,
    pub final_result_timeout_ms: u64,
    pub keyword_pre_roll_ms: u64,
    pub energy_threshold: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            language: Some("en-US".to_string()),
            candidate_languages: Vec::new(),
            target_languages: Vec::new(),
            authorization_token: None,
            segmentation_silence_ms: session.segmentation_silence.as_millis() as u64,
            max_utterance_ms: session.max_utterance.as_millis() as u64,
            initial_silence_timeout_ms: session.initial_silence_timeout.as_millis() as u64,
            final_result_timeout_ms: session.final_result_timeout.as_millis() as u64,
            keyword_pre_roll_ms: session.keyword_pre_roll.as_millis() as u64,
            energy_threshold: session.energy_threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub level: LogLevel,
    /// Start the file sink at this path
    pub log_file: Option<PathBuf>,
    pub append: bool,
    pub filters: Vec<String>,
    /// Capture lines in the memory ring
    pub memory: bool,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Per-session tunables from the `input` and `recognition` sections
    pub fn session_config(&self) -> SessionConfig {
        let recognition = &self.recognition;
        SessionConfig {
            sample_rate: self.input.sample_rate,
            channels: self.input.channels,
            segmentation_silence: Duration::from_millis(recognition.segmentation_silence_ms),
            max_utterance: Duration::from_millis(recognition.max_utterance_ms),
            initial_silence_timeout: Duration::from_millis(recognition.initial_silence_timeout_ms),
            final_result_timeout: Duration::from_millis(recognition.final_result_timeout_ms),
            keyword_pre_roll: Duration::from_millis(recognition.keyword_pre_roll_ms),
            energy_threshold: recognition.energy_threshold,
            ..SessionConfig::default()
        }
    }

    pub fn recognizer_config(&self) -> RecognizerConfig {
        let recognition = &self.recognition;
        if recognition.target_languages.is_empty() {
            RecognizerConfig::Speech(SpeechConfig {
                language: recognition.language.clone(),
                authorization_token: recognition.authorization_token.clone(),
            })
        } else {
            RecognizerConfig::Translation(TranslationConfig {
                language: recognition.language.clone(),
                target_languages: recognition.target_languages.clone(),
                authorization_token: recognition.authorization_token.clone(),
            })
        }
    }

    pub fn auto_detect(&self) -> Option<AutoDetectSourceLanguageConfig> {
        let candidates = &self.recognition.candidate_languages;
        (!candidates.is_empty())
            .then(|| AutoDetectSourceLanguageConfig::from_languages(candidates.iter().cloned()))
    }
}
