use base64::Engine;
use speech_session::events::CancellationErrorCode;
use speech_session::nats::messages::{AudioFrameMessage, TranscriptMessage, UtteranceStartMessage};
use speech_session::nats::service_event;
use speech_session::transport::ServiceEvent;

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        session_id: "session-1".to_string(),
        utterance_id: 3,
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 100]),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("session-1"));
    assert!(json.contains("16000"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"utterance_id\":3"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.session_id, "session-1");
    assert_eq!(deserialized.utterance_id, 3);
    assert_eq!(deserialized.sample_rate, 16000);
    assert_eq!(deserialized.channels, 1);
    assert!(!deserialized.final_frame);
}

#[test]
fn test_audio_frame_final_marker_without_utterance() {
    // Older producers omit the utterance id
    let json = r#"{
        "session_id": "session-1",
        "sequence": 10,
        "pcm": "",
        "sample_rate": 16000,
        "channels": 1,
        "timestamp": "2025-10-27T14:30:00Z",
        "final": true
    }"#;

    let msg: AudioFrameMessage = serde_json::from_str(json).unwrap();
    assert!(msg.final_frame);
    assert!(msg.pcm.is_empty());
    assert_eq!(msg.sequence, 10);
    assert_eq!(msg.utterance_id, 0);
}

#[test]
fn test_utterance_start_defaults() {
    let json = r#"{
        "session_id": "session-1",
        "utterance_id": 1,
        "language": "en-US",
        "embedded_model": null,
        "authorization_token": null,
        "sample_rate": 16000,
        "channels": 1,
        "timestamp": "2025-10-27T14:30:00Z"
    }"#;

    let msg: UtteranceStartMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.language.as_deref(), Some("en-US"));
    assert!(msg.target_languages.is_empty());
    assert!(msg.intent_models.is_empty());
}

#[test]
fn test_transcript_deserialization() {
    let json = r#"{
        "session_id": "session-1",
        "utterance_id": 2,
        "text": "Hello world",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.95,
        "translations": {"de": "Hallo Welt"},
        "detected_language": "en-US"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.text, "Hello world");
    assert_eq!(msg.confidence, Some(0.95));
    assert!(msg.matches("session-1", 2));
    assert!(!msg.matches("session-1", 3));
    assert!(!msg.matches("session-2", 2));

    match service_event(msg) {
        ServiceEvent::Phrase(phrase) => {
            assert_eq!(phrase.text, "Hello world");
            assert_eq!(phrase.translations["de"], "Hallo Welt");
            assert_eq!(phrase.detected_language.as_deref(), Some("en-US"));
            assert!(phrase.intent.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_transcript_partial() {
    let json = r#"{
        "session_id": "session-1",
        "text": "This is a partial",
        "partial": true,
        "timestamp": "2025-10-27T14:30:05Z"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.confidence, None);
    // No utterance id: accepted for any utterance of the session
    assert!(msg.matches("session-1", 7));

    assert!(matches!(
        service_event(msg),
        ServiceEvent::Hypothesis { ref text, .. } if text == "This is a partial"
    ));
}

#[test]
fn test_transcript_error_wins() {
    let json = r#"{
        "session_id": "session-1",
        "utterance_id": 1,
        "text": "",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "error": {"code": "TooManyRequests", "message": "slow down"}
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(
        service_event(msg),
        ServiceEvent::Error {
            code: CancellationErrorCode::TooManyRequests,
            message: "slow down".to_string(),
        }
    );
}

#[test]
fn test_transcript_intent() {
    let json = r#"{
        "session_id": "session-1",
        "text": "play some jazz",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "intent": {"model_id": "home-app", "name": "PlayMusic"}
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    let ServiceEvent::Phrase(phrase) = service_event(msg) else {
        panic!("expected a phrase");
    };
    let intent = phrase.intent.unwrap();
    assert_eq!(intent.model_id, "home-app");
    assert_eq!(intent.name, "PlayMusic");
}

#[test]
fn test_pcm_encoding_roundtrip() {
    let original_samples: Vec<i16> = vec![100, -200, 300, -400];

    let pcm_bytes: Vec<u8> = original_samples.iter().flat_map(|&s| s.to_le_bytes()).collect();
    let msg = AudioFrameMessage {
        session_id: "session-1".to_string(),
        utterance_id: 1,
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode(&pcm_bytes),
        sample_rate: 16000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    let decoded_bytes = base64::engine::general_purpose::STANDARD
        .decode(&deserialized.pcm)
        .unwrap();

    let decoded_samples: Vec<i16> = decoded_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    assert_eq!(decoded_samples, original_samples);
}
