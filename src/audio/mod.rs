pub mod backend;
pub mod file;
pub mod processing;

pub use backend::{AudioConfig, AudioFrame, AudioInput, PushAudioInput, PushAudioStream};
pub use file::{AudioFile, FileAudioInput};
pub use processing::{
    frame_energy, normalize_frame, AudioProcessingOptions, Endpoint, Endpointer, EndpointerConfig,
};
