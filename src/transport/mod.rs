//! Channel to the recognition service
//!
//! A transport is connected once per utterance. The session streams
//! [`TransportCommand`]s into it and reads [`ServiceEvent`]s back; any
//! failure ends up as a cancellation on the session, never as a panic or a
//! returned error from the asynchronous API.

pub mod scripted;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;
use crate::events::CancellationErrorCode;

pub use scripted::{ScriptedFailure, ScriptedTransport, TransportLog, UtteranceScript};

/// Everything the service needs to recognize one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub session_id: String,
    pub utterance_id: u64,
    /// Source language, when fixed
    pub language: Option<String>,
    /// Candidate source languages for automatic detection
    pub candidate_languages: Vec<String>,
    /// Translation targets (empty outside translation mode)
    pub target_languages: Vec<String>,
    /// Language-understanding models whose intents are enabled
    pub intent_models: Vec<String>,
    /// On-device model to use instead of the cloud service
    pub embedded_model: Option<String>,
    pub authorization_token: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone)]
pub enum TransportCommand {
    Audio(AudioFrame),
    /// No more audio for this utterance; the service should finalize
    EndOfAudio,
    Disconnect,
}

/// Intent resolved by a language-understanding model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIntent {
    pub model_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServicePhrase {
    pub text: String,
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default)]
    pub intent: Option<ServiceIntent>,
    #[serde(default)]
    pub detected_language: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Hypothesis {
        text: String,
        translations: BTreeMap<String, String>,
    },
    Phrase(ServicePhrase),
    /// Synthesized translation audio for the current utterance
    Synthesis(Vec<u8>),
    Error {
        code: CancellationErrorCode,
        message: String,
    },
}

pub struct TransportChannels {
    pub commands: mpsc::Sender<TransportCommand>,
    pub events: mpsc::Receiver<ServiceEvent>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Service error: {0}")]
    Service(String),
    #[error("Service timed out")]
    Timeout,
}

impl TransportError {
    pub fn error_code(&self) -> CancellationErrorCode {
        match self {
            TransportError::Connection(_) => CancellationErrorCode::ConnectionFailure,
            TransportError::Authentication(_) => CancellationErrorCode::AuthenticationFailure,
            TransportError::BadRequest(_) => CancellationErrorCode::BadRequest,
            TransportError::Service(_) => CancellationErrorCode::ServiceError,
            TransportError::Timeout => CancellationErrorCode::ServiceTimeout,
        }
    }
}

#[async_trait::async_trait]
pub trait RecognitionTransport: Send + Sync {
    /// Open a channel for one utterance
    async fn connect(&self, request: ConnectRequest) -> Result<TransportChannels, TransportError>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}
