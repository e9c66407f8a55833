pub mod audio;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod keyword;
pub mod nats;
pub mod session;
pub mod transport;

pub use audio::{
    AudioConfig, AudioFile, AudioFrame, AudioInput, AudioProcessingOptions, FileAudioInput,
    PushAudioStream,
};
pub use config::Config;
pub use diagnostics::{Diagnostics, DiagnosticsLayer, LogLevel};
pub use error::{Result, SessionError};
pub use events::{
    CancellationDetails, CancellationReason, EventBus, EventKind, FinalResult, PartialResult,
    RecognitionEvent, RecognitionResult, ResultReason,
};
pub use keyword::{KeywordModel, KeywordSpotter};
pub use nats::{NatsClient, NatsTransport};
pub use session::{
    Recognizer, RecognizerConfig, RecognizerOptions, SessionConfig, SessionState, SessionStats,
};
pub use transport::{RecognitionTransport, ScriptedTransport, UtteranceScript};
