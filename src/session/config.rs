use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::EndpointerConfig;

/// Per-session tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-5f1c…")
    pub session_id: String,

    /// Sample rate sent to the service
    pub sample_rate: u32,

    /// Number of audio channels sent to the service (1 = mono)
    pub channels: u16,

    /// Trailing silence that ends an utterance
    pub segmentation_silence: Duration,

    /// Hard cap on the audio of one utterance
    pub max_utterance: Duration,

    /// Single-shot recognition gives up if no speech starts within this much audio
    pub initial_silence_timeout: Duration,

    /// How long to wait for the final phrase after end of audio
    pub final_result_timeout: Duration,

    /// Audio kept from before a keyword match
    pub keyword_pre_roll: Duration,

    /// RMS energy above which a frame counts as speech
    pub energy_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            sample_rate: 16000,
            channels: 1,
            segmentation_silence: Duration::from_millis(1200),
            max_utterance: Duration::from_secs(30),
            initial_silence_timeout: Duration::from_secs(5),
            final_result_timeout: Duration::from_secs(10),
            keyword_pre_roll: Duration::from_millis(1500),
            energy_threshold: 350.0,
        }
    }
}

impl SessionConfig {
    /// Endpointer settings; the initial silence timeout only applies to single-shot
    pub fn endpointer(&self, single_shot: bool) -> EndpointerConfig {
        EndpointerConfig {
            energy_threshold: self.energy_threshold,
            segmentation_silence_ms: self.segmentation_silence.as_millis() as u64,
            max_utterance_ms: self.max_utterance.as_millis() as u64,
            initial_silence_timeout_ms: single_shot
                .then(|| self.initial_silence_timeout.as_millis() as u64),
        }
    }
}

/// Cloud speech recognition settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Source language (BCP-47), `None` for service default or auto-detect
    pub language: Option<String>,
    pub authorization_token: Option<String>,
}

/// Speech translation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub language: Option<String>,
    pub target_languages: Vec<String>,
    pub authorization_token: Option<String>,
}

/// On-device recognition settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    pub model_name: String,
    pub model_paths: Vec<PathBuf>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RecognizerConfig {
    Speech(SpeechConfig),
    Translation(TranslationConfig),
    Embedded(EmbeddedConfig),
}

impl RecognizerConfig {
    pub fn is_translation(&self) -> bool {
        matches!(self, RecognizerConfig::Translation(_))
    }
}

/// Candidate source languages for automatic language detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoDetectSourceLanguageConfig {
    pub languages: Vec<String>,
}

impl AutoDetectSourceLanguageConfig {
    pub fn from_languages<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }
}
