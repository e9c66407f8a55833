//! Recognition session management
//!
//! This module provides the `Recognizer` abstraction that manages:
//! - Single-shot, continuous and keyword-triggered recognition
//! - Audio processing (downsampling, mono conversion, endpointing)
//! - Streaming utterances through a `RecognitionTransport`
//! - Target-language and intent configuration while live
//! - Session statistics and state management

mod config;
mod recognizer;
mod settings;
mod state;
mod stats;
mod worker;

pub use config::{
    AutoDetectSourceLanguageConfig, EmbeddedConfig, RecognizerConfig, SessionConfig, SpeechConfig,
    TranslationConfig,
};
pub use recognizer::{Recognizer, RecognizerOptions};
pub use settings::{
    default_intent_id, normalize_phrase, validate_language_tag, LanguageUnderstandingModel,
    RecognitionSettings,
};
pub use state::{RecognitionMode, SessionState};
pub use stats::SessionStats;
