use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::CancellationErrorCode;
use crate::transport::ServiceIntent;

/// Published once per utterance before any audio
#[derive(Debug, Serialize, Deserialize)]
pub struct UtteranceStartMessage {
    pub session_id: String,
    pub utterance_id: u64,
    pub language: Option<String>,
    #[serde(default)]
    pub candidate_languages: Vec<String>,
    #[serde(default)]
    pub target_languages: Vec<String>,
    #[serde(default)]
    pub intent_models: Vec<String>,
    pub embedded_model: Option<String>,
    pub authorization_token: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
}

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    #[serde(default)]
    pub utterance_id: u64,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Error reported by the STT service for an utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptError {
    pub code: CancellationErrorCode,
    pub message: String,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    #[serde(default)]
    pub utterance_id: Option<u64>,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default)]
    pub intent: Option<ServiceIntent>,
    #[serde(default)]
    pub detected_language: Option<String>,
    #[serde(default)]
    pub error: Option<TranscriptError>,
}

impl TranscriptMessage {
    /// Whether this message belongs to the given utterance
    ///
    /// Messages without an utterance id are accepted for any utterance of
    /// the session.
    pub fn matches(&self, session_id: &str, utterance_id: u64) -> bool {
        self.session_id == session_id && self.utterance_id.map_or(true, |id| id == utterance_id)
    }
}
