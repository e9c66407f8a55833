// Unit tests for audio input abstractions
//
// These tests verify the core audio types and interfaces work correctly.

use speech_session::audio::{
    frame_energy, normalize_frame, AudioConfig, AudioFrame, AudioProcessingOptions, Endpoint,
    Endpointer, EndpointerConfig,
};

#[test]
fn test_audio_frame_creation() {
    let frame = AudioFrame {
        samples: vec![100, 200, 300],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 1000,
    };

    assert_eq!(frame.samples.len(), 3);
    assert_eq!(frame.sample_rate, 16000);
    assert_eq!(frame.channels, 1);
    assert_eq!(frame.timestamp_ms, 1000);
}

#[test]
fn test_audio_frame_pcm_bytes_little_endian() {
    let frame = AudioFrame {
        samples: vec![1, -2],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    };
    assert_eq!(frame.pcm_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
}

#[test]
fn test_normalize_48k_stereo_to_16k_mono() {
    // 10ms of 48kHz stereo
    let frame = AudioFrame {
        samples: (0..960).map(|i| (i % 2) as i16 * 10 + 5).collect(),
        sample_rate: 48000,
        channels: 2,
        timestamp_ms: 250,
    };

    let out = normalize_frame(frame, 16000, 1);

    assert_eq!(out.sample_rate, 16000);
    assert_eq!(out.channels, 1);
    assert_eq!(out.samples.len(), 160);
    assert!(out.samples.iter().all(|&s| s == 20));
    assert_eq!(out.timestamp_ms, 250);
    assert_eq!(out.duration_ms(), 10);
}

#[test]
fn test_normalize_is_noop_for_target_format() {
    let frame = AudioFrame {
        samples: vec![7; 160],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    };
    assert_eq!(normalize_frame(frame.clone(), 16000, 1), frame);
}

#[test]
fn test_frame_energy() {
    let loud = AudioFrame {
        samples: vec![-400, 400, -400, 400],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    };
    assert!((frame_energy(&loud) - 400.0).abs() < f32::EPSILON);

    let empty = AudioFrame {
        samples: Vec::new(),
        ..loud
    };
    assert_eq!(frame_energy(&empty), 0.0);
}

#[test]
fn test_endpointer_no_initial_timeout_in_continuous() {
    let mut ep = Endpointer::new(EndpointerConfig {
        initial_silence_timeout_ms: None,
        ..Default::default()
    });
    let quiet = AudioFrame {
        samples: vec![0; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    };
    for _ in 0..100 {
        assert_eq!(ep.push(&quiet).1, Endpoint::Continue);
    }
    assert!(!ep.speech_seen());
    assert_eq!(ep.audio_ms(), 10_000);
}

#[tokio::test]
async fn test_push_audio_config() {
    let (config, stream) = AudioConfig::from_push_stream(8);
    let config = config.with_processing(AudioProcessingOptions::new(
        AudioProcessingOptions::ENABLE_VOICE_ACTIVITY_DETECTION,
    ));

    assert!(config.processing().voice_activity_detection());
    assert!(format!("{:?}", config).contains("push"));

    let other = stream.clone();
    stream.close();
    // Clones keep the stream open
    other
        .write(AudioFrame {
            samples: vec![0; 16],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        })
        .await
        .unwrap();
}
