use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultReason {
    RecognizedSpeech,
    RecognizedIntent,
    TranslatedSpeech,
    NoMatch,
}

/// Why recognition was canceled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    /// Transport or service failure, see the error code
    Error,
    /// The audio input was exhausted
    EndOfStream,
    /// The service connection closed without a final result
    Disconnected,
    /// Recognition was stopped before a result arrived
    CancelledByUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationErrorCode {
    NoError,
    AuthenticationFailure,
    BadRequest,
    TooManyRequests,
    Forbidden,
    ConnectionFailure,
    ServiceTimeout,
    ServiceError,
    ServiceUnavailable,
    RuntimeError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationDetails {
    pub reason: CancellationReason,
    pub error_code: CancellationErrorCode,
    pub error_details: Option<String>,
}

impl CancellationDetails {
    pub fn end_of_stream() -> Self {
        Self {
            reason: CancellationReason::EndOfStream,
            error_code: CancellationErrorCode::NoError,
            error_details: None,
        }
    }

    pub fn error(error_code: CancellationErrorCode, details: impl Into<String>) -> Self {
        Self {
            reason: CancellationReason::Error,
            error_code,
            error_details: Some(details.into()),
        }
    }

    pub fn disconnected(details: impl Into<String>) -> Self {
        Self {
            reason: CancellationReason::Disconnected,
            error_code: CancellationErrorCode::ConnectionFailure,
            error_details: Some(details.into()),
        }
    }
}

/// A partial hypothesis for the utterance in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    pub session_id: String,
    pub utterance_id: u64,
    pub text: String,
    /// Target language → partial translation
    pub translations: BTreeMap<String, String>,
    /// Offset of the utterance start in the audio stream
    pub offset_ms: u64,
}

/// The final result of one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub session_id: String,
    pub utterance_id: u64,
    pub reason: ResultReason,
    pub text: String,
    pub translations: BTreeMap<String, String>,
    pub intent_id: Option<String>,
    /// Source language reported by automatic language detection
    pub detected_language: Option<String>,
    pub confidence: Option<f32>,
    pub offset_ms: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanceledNotice {
    pub session_id: String,
    pub utterance_id: Option<u64>,
    pub details: CancellationDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordNotice {
    pub session_id: String,
    pub keyword: String,
    pub confidence: f32,
    /// Timestamp of the frame where the keyword matched
    pub offset_ms: u64,
}

/// Outcome of a single-shot recognition
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionResult {
    Recognized(FinalResult),
    Canceled(CancellationDetails),
}

impl RecognitionResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            RecognitionResult::Recognized(result) => Some(&result.text),
            RecognitionResult::Canceled(_) => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, RecognitionResult::Canceled(_))
    }
}

/// Typed recognition event delivered through the event bus
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    SessionStarted { session_id: String },
    SessionStopped { session_id: String },
    Recognizing(PartialResult),
    Recognized(FinalResult),
    /// Chunk of translated speech audio; an empty chunk ends the utterance's audio
    Synthesizing {
        session_id: String,
        utterance_id: u64,
        audio: Vec<u8>,
    },
    KeywordRecognized(KeywordNotice),
    Canceled(CanceledNotice),
}

impl RecognitionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RecognitionEvent::SessionStarted { .. } => EventKind::SessionStarted,
            RecognitionEvent::SessionStopped { .. } => EventKind::SessionStopped,
            RecognitionEvent::Recognizing(_) => EventKind::Recognizing,
            RecognitionEvent::Recognized(_) => EventKind::Recognized,
            RecognitionEvent::Synthesizing { .. } => EventKind::Synthesizing,
            RecognitionEvent::KeywordRecognized(_) => EventKind::KeywordRecognized,
            RecognitionEvent::Canceled(_) => EventKind::Canceled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStarted,
    SessionStopped,
    Recognizing,
    Recognized,
    Synthesizing,
    KeywordRecognized,
    Canceled,
}
