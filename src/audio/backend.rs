use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use super::file::FileAudioInput;
use super::processing::AudioProcessingOptions;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the stream started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration covered by this frame in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let per_channel = self.samples.len() as u64 / self.channels as u64;
        per_channel * 1000 / self.sample_rate as u64
    }

    /// Little-endian PCM bytes, as sent over the wire
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Audio capture input trait
///
/// Implementations:
/// - File: read frames from a WAV file (testing/batch processing)
/// - Push: the application pushes frames through a `PushAudioStream`
#[async_trait::async_trait]
pub trait AudioInput: Send + Sync {
    /// Start producing audio
    ///
    /// Returns a channel receiver that will receive audio frames. The channel
    /// closes when the input is exhausted.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop producing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if the input is currently producing frames
    fn is_capturing(&self) -> bool;

    /// Get input name for logging
    fn name(&self) -> &str;
}

/// Audio configuration handed to a recognizer at construction
pub struct AudioConfig {
    pub(crate) input: Box<dyn AudioInput>,
    pub(crate) processing: AudioProcessingOptions,
}

impl AudioConfig {
    /// Wrap any audio input
    pub fn new(input: Box<dyn AudioInput>) -> Self {
        Self {
            input,
            processing: AudioProcessingOptions::default(),
        }
    }

    /// Stream frames from a WAV file, `buffer_duration_ms` per frame
    pub fn from_wav_file(path: impl Into<std::path::PathBuf>, buffer_duration_ms: u64) -> Self {
        Self::new(Box::new(FileAudioInput::new(path, buffer_duration_ms)))
    }

    /// Create a push-based input and the handle used to feed it
    pub fn from_push_stream(capacity: usize) -> (Self, PushAudioStream) {
        let (input, stream) = PushAudioInput::new(capacity);
        (Self::new(Box::new(input)), stream)
    }

    pub fn with_processing(mut self, processing: AudioProcessingOptions) -> Self {
        self.processing = processing;
        self
    }

    pub fn processing(&self) -> AudioProcessingOptions {
        self.processing
    }
}

impl std::fmt::Debug for AudioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioConfig")
            .field("input", &self.input.name())
            .field("processing", &self.processing)
            .finish()
    }
}

/// Input fed by the application through a [`PushAudioStream`]
pub struct PushAudioInput {
    receiver: Option<mpsc::Receiver<AudioFrame>>,
    capturing: bool,
}

impl PushAudioInput {
    pub fn new(capacity: usize) -> (Self, PushAudioStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                receiver: Some(rx),
                capturing: false,
            },
            PushAudioStream { sender: tx },
        )
    }
}

#[async_trait::async_trait]
impl AudioInput for PushAudioInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| anyhow::anyhow!("Push audio input already started"))?;
        self.capturing = true;
        info!("Push audio input started");
        Ok(receiver)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "push"
    }
}

/// Application-side handle of a push audio input
#[derive(Clone)]
pub struct PushAudioStream {
    sender: mpsc::Sender<AudioFrame>,
}

impl PushAudioStream {
    /// Push one frame, waiting for buffer space
    pub async fn write(&self, frame: AudioFrame) -> Result<()> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| anyhow::anyhow!("Push audio stream closed"))
    }

    /// Close the stream; the recognizer sees end of stream once buffered
    /// frames are consumed
    pub fn close(self) {
        drop(self.sender);
    }
}
