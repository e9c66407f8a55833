pub mod client;
pub mod messages;
pub mod transport;

pub use client::NatsClient;
pub use messages::{AudioFrameMessage, TranscriptError, TranscriptMessage, UtteranceStartMessage};
pub use transport::{service_event, NatsTransport};
