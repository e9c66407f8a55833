//! Frame normalisation and energy-based endpointing
//!
//! Frames are folded to the session's target format before they are sent to
//! the recognition service, and an energy endpointer decides where an
//! utterance ends: after a run of trailing silence, at the hard duration cap,
//! or when no speech shows up within the initial silence timeout.

use super::backend::AudioFrame;

/// Audio processing flags applied to the input before recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioProcessingOptions {
    flags: u32,
}

impl AudioProcessingOptions {
    pub const NONE: u32 = 0x0000_0000;
    /// Leading silence before speech onset is not transmitted
    pub const ENABLE_VOICE_ACTIVITY_DETECTION: u32 = 0x0000_0020;

    pub fn new(flags: u32) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn voice_activity_detection(&self) -> bool {
        self.flags & Self::ENABLE_VOICE_ACTIVITY_DETECTION != 0
    }
}

/// Process audio frame: downsample and convert to target format
pub fn normalize_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    if processed.sample_rate != target_sample_rate {
        processed = downsample_frame(processed, target_sample_rate);
    }

    if processed.channels != target_channels && target_channels == 1 {
        processed = stereo_to_mono(processed);
    }

    processed
}

/// Downsample audio frame by decimation
fn downsample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || target_rate == 0 {
        return frame;
    }

    let ratio = frame.sample_rate / target_rate;
    if ratio <= 1 {
        return frame; // Can't upsample
    }

    let channels = frame.channels.max(1) as usize;
    let downsampled: Vec<i16> = frame
        .samples
        .chunks(channels)
        .step_by(ratio as usize)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples: downsampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Convert stereo to mono by summing channels
fn stereo_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels != 2 {
        return frame; // Only support stereo -> mono
    }

    let mono_samples = frame
        .samples
        .chunks_exact(2)
        .map(|pair| (pair[0] as i32 + pair[1] as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Root-mean-square energy of a frame, in raw i16 units
pub fn frame_energy(frame: &AudioFrame) -> f32 {
    if frame.samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / frame.samples.len() as f64).sqrt() as f32
}

#[derive(Debug, Clone)]
pub struct EndpointerConfig {
    /// RMS energy above which a frame counts as speech
    pub energy_threshold: f32,
    /// Trailing silence after speech that ends the utterance
    pub segmentation_silence_ms: u64,
    /// Hard cap on utterance audio
    pub max_utterance_ms: u64,
    /// End the utterance if no speech starts within this much audio
    pub initial_silence_timeout_ms: Option<u64>,
}

impl Default for EndpointerConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 350.0,
            segmentation_silence_ms: 1200,
            max_utterance_ms: 30_000,
            initial_silence_timeout_ms: Some(5_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Continue,
    EndOfSpeech,
    MaxDuration,
    InitialSilenceTimeout,
}

/// Tracks one utterance's audio and reports where it ends
#[derive(Debug)]
pub struct Endpointer {
    config: EndpointerConfig,
    audio_ms: u64,
    speech_seen: bool,
    trailing_silence_ms: u64,
}

impl Endpointer {
    pub fn new(config: EndpointerConfig) -> Self {
        Self {
            config,
            audio_ms: 0,
            speech_seen: false,
            trailing_silence_ms: 0,
        }
    }

    /// Classify one frame; returns whether it is speech and the endpoint decision
    pub fn push(&mut self, frame: &AudioFrame) -> (bool, Endpoint) {
        let duration = frame.duration_ms();
        let is_speech = frame_energy(frame) > self.config.energy_threshold;
        self.audio_ms += duration;

        if is_speech {
            self.speech_seen = true;
            self.trailing_silence_ms = 0;
        } else if self.speech_seen {
            self.trailing_silence_ms += duration;
        }

        let decision = if self.audio_ms >= self.config.max_utterance_ms {
            Endpoint::MaxDuration
        } else if self.speech_seen && self.trailing_silence_ms >= self.config.segmentation_silence_ms {
            Endpoint::EndOfSpeech
        } else if !self.speech_seen
            && self
                .config
                .initial_silence_timeout_ms
                .is_some_and(|timeout| self.audio_ms >= timeout)
        {
            Endpoint::InitialSilenceTimeout
        } else {
            Endpoint::Continue
        };

        (is_speech, decision)
    }

    pub fn speech_seen(&self) -> bool {
        self.speech_seen
    }

    pub fn audio_ms(&self) -> u64 {
        self.audio_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: i16, ts: u64) -> AudioFrame {
        AudioFrame {
            samples: vec![value; 1600],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_stereo_fold_clamps() {
        let stereo = AudioFrame {
            samples: vec![i16::MAX, 10, 100, 200],
            sample_rate: 16000,
            channels: 2,
            timestamp_ms: 40,
        };
        let mono = normalize_frame(stereo, 16000, 1);
        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![i16::MAX, 300]);
        assert_eq!(mono.timestamp_ms, 40);
    }

    #[test]
    fn test_downsample_keeps_channel_pairs() {
        let frame = AudioFrame {
            samples: vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            sample_rate: 48000,
            channels: 2,
            timestamp_ms: 0,
        };
        let out = normalize_frame(frame, 16000, 2);
        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.samples, vec![1, 2, 7, 8]);
    }

    #[test]
    fn test_endpointer_ends_after_trailing_silence() {
        let mut ep = Endpointer::new(EndpointerConfig {
            segmentation_silence_ms: 300,
            ..Default::default()
        });

        assert_eq!(ep.push(&frame(0, 0)), (false, Endpoint::Continue));
        assert_eq!(ep.push(&frame(2000, 100)), (true, Endpoint::Continue));
        assert_eq!(ep.push(&frame(0, 200)).1, Endpoint::Continue);
        assert_eq!(ep.push(&frame(0, 300)).1, Endpoint::Continue);
        assert_eq!(ep.push(&frame(0, 400)).1, Endpoint::EndOfSpeech);
    }

    #[test]
    fn test_endpointer_initial_silence_and_cap() {
        let mut ep = Endpointer::new(EndpointerConfig {
            initial_silence_timeout_ms: Some(200),
            ..Default::default()
        });
        ep.push(&frame(0, 0));
        assert_eq!(ep.push(&frame(0, 100)).1, Endpoint::InitialSilenceTimeout);

        let mut capped = Endpointer::new(EndpointerConfig {
            max_utterance_ms: 300,
            initial_silence_timeout_ms: None,
            ..Default::default()
        });
        capped.push(&frame(2000, 0));
        capped.push(&frame(2000, 100));
        assert_eq!(capped.push(&frame(2000, 200)).1, Endpoint::MaxDuration);
    }

    #[test]
    fn test_processing_flags() {
        assert!(!AudioProcessingOptions::default().voice_activity_detection());
        let opts = AudioProcessingOptions::new(AudioProcessingOptions::ENABLE_VOICE_ACTIVITY_DETECTION);
        assert!(opts.voice_activity_detection());
        assert_eq!(opts.flags(), 0x20);
    }
}
