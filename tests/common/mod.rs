// Shared helpers for integration tests
#![allow(dead_code)]

use speech_session::audio::{AudioFrame, PushAudioStream};
use std::path::Path;

pub const FRAME_MS: u64 = 100;
pub const SPEECH: i16 = 2000;

/// 100ms of 16kHz mono audio at a constant level
pub fn frame(level: i16, index: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![level; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: index * FRAME_MS,
    }
}

pub fn speech(index: u64) -> AudioFrame {
    frame(SPEECH, index)
}

pub fn silence(index: u64) -> AudioFrame {
    frame(0, index)
}

/// Push `speech_frames` loud frames followed by `silence_frames` quiet ones,
/// numbering from `start`; returns the next free index
pub async fn push_utterance(
    stream: &PushAudioStream,
    start: u64,
    speech_frames: u64,
    silence_frames: u64,
) -> u64 {
    let mut index = start;
    for _ in 0..speech_frames {
        stream.write(speech(index)).await.unwrap();
        index += 1;
    }
    for _ in 0..silence_frames {
        stream.write(silence(index)).await.unwrap();
        index += 1;
    }
    index
}

/// Write a 16-bit PCM WAV file
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}
