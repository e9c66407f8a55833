use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::TranscriptMessage;
use crate::events::CancellationErrorCode;
use crate::transport::{
    ConnectRequest, RecognitionTransport, ServiceEvent, ServicePhrase, TransportChannels,
    TransportCommand, TransportError,
};

/// Recognition transport backed by a NATS-connected STT service
///
/// Per utterance: a start message, base64 PCM frames on
/// `audio.frame.<session>`, then an empty frame marked final. Transcripts come
/// back on `stt.text.>`.
pub struct NatsTransport {
    client: NatsClient,
}

impl NatsTransport {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(NatsClient::connect(url).await?))
    }

    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

/// Map a transcript message to a service event
pub fn service_event(message: TranscriptMessage) -> ServiceEvent {
    if let Some(error) = message.error {
        return ServiceEvent::Error {
            code: error.code,
            message: error.message,
        };
    }
    if message.partial {
        return ServiceEvent::Hypothesis {
            text: message.text,
            translations: message.translations,
        };
    }
    ServiceEvent::Phrase(ServicePhrase {
        text: message.text,
        translations: message.translations,
        intent: message.intent,
        detected_language: message.detected_language,
        confidence: message.confidence,
    })
}

#[async_trait::async_trait]
impl RecognitionTransport for NatsTransport {
    async fn connect(&self, request: ConnectRequest) -> Result<TransportChannels, TransportError> {
        // Subscribe before announcing so no transcript is missed.
        let mut subscriber = self
            .client
            .subscribe_transcripts()
            .await
            .map_err(|e| TransportError::Connection(format!("{:#}", e)))?;

        self.client
            .publish_utterance_start(&request)
            .await
            .map_err(|e| TransportError::Connection(format!("{:#}", e)))?;

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<TransportCommand>(64);
        let (event_tx, event_rx) = mpsc::channel::<ServiceEvent>(64);
        let client = self.client.clone();

        tokio::spawn(async move {
            let session_id = request.session_id.clone();
            let utterance_id = request.utterance_id;
            let mut sequence: u32 = 0;
            let mut commands_open = true;

            loop {
                tokio::select! {
                    command = cmd_rx.recv(), if commands_open => match command {
                        Some(TransportCommand::Audio(frame)) => {
                            if let Err(e) = client
                                .publish_audio_frame(
                                    &session_id,
                                    utterance_id,
                                    &frame.pcm_bytes(),
                                    frame.sample_rate,
                                    frame.channels,
                                    sequence,
                                    false,
                                )
                                .await
                            {
                                let _ = event_tx
                                    .send(ServiceEvent::Error {
                                        code: CancellationErrorCode::ConnectionFailure,
                                        message: format!("{:#}", e),
                                    })
                                    .await;
                                break;
                            }
                            sequence += 1;
                        }
                        Some(TransportCommand::EndOfAudio) => {
                            if let Err(e) = client
                                .publish_audio_frame(
                                    &session_id,
                                    utterance_id,
                                    &[],
                                    request.sample_rate,
                                    request.channels,
                                    sequence,
                                    true,
                                )
                                .await
                            {
                                warn!("Failed to publish final frame: {:#}", e);
                            }
                        }
                        Some(TransportCommand::Disconnect) => break,
                        // The session may drop its sender once audio is done.
                        None => commands_open = false,
                    },
                    _ = event_tx.closed() => break,
                    message = subscriber.next() => {
                        let Some(message) = message else {
                            warn!("Transcript subscription closed");
                            break;
                        };
                        let transcript: TranscriptMessage = match serde_json::from_slice(&message.payload) {
                            Ok(transcript) => transcript,
                            Err(e) => {
                                warn!("Ignoring malformed transcript message: {}", e);
                                continue;
                            }
                        };
                        if !transcript.matches(&session_id, utterance_id) {
                            continue;
                        }
                        let event = service_event(transcript);
                        let last = !matches!(event, ServiceEvent::Hypothesis { .. });
                        if event_tx.send(event).await.is_err() || last {
                            break;
                        }
                    }
                }
            }

            if let Err(e) = subscriber.unsubscribe().await {
                debug!("Transcript unsubscribe failed: {}", e);
            }
            info!(
                "NATS utterance {} of {} finished after {} frames",
                utterance_id, session_id, sequence
            );
        });

        Ok(TransportChannels {
            commands: cmd_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}
