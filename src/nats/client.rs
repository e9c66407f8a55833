use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tracing::{debug, info};

use super::messages::{AudioFrameMessage, UtteranceStartMessage};
use crate::transport::ConnectRequest;

/// Subject prefix for audio frames; the session id is appended
pub const AUDIO_SUBJECT_PREFIX: &str = "audio.frame";
/// Subject prefix for utterance start messages
pub const START_SUBJECT_PREFIX: &str = "stt.start";
/// The STT service publishes to stt.text.partial and stt.text.final
pub const TRANSCRIPT_SUBJECT: &str = "stt.text.>";

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Announce a new utterance and its recognition settings
    pub async fn publish_utterance_start(&self, request: &ConnectRequest) -> Result<()> {
        let subject = format!("{}.{}", START_SUBJECT_PREFIX, request.session_id);

        let message = UtteranceStartMessage {
            session_id: request.session_id.clone(),
            utterance_id: request.utterance_id,
            language: request.language.clone(),
            candidate_languages: request.candidate_languages.clone(),
            target_languages: request.target_languages.clone(),
            intent_models: request.intent_models.clone(),
            embedded_model: request.embedded_model.clone(),
            authorization_token: request.authorization_token.clone(),
            sample_rate: request.sample_rate,
            channels: request.channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&message)?;
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish utterance start")?;

        info!(
            "Published utterance start to {} (utterance={})",
            subject, request.utterance_id
        );
        Ok(())
    }

    /// Publish audio frame to NATS
    pub async fn publish_audio_frame(
        &self,
        session_id: &str,
        utterance_id: u64,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("{}.{}", AUDIO_SUBJECT_PREFIX, session_id);

        let message = AudioFrameMessage {
            session_id: session_id.to_string(),
            utterance_id,
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, bytes={}, final={})",
            subject,
            sequence,
            pcm_bytes.len(),
            is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages
    ///
    /// All sessions share the subject; messages are filtered by session and
    /// utterance id in the payload.
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        debug!("Subscribing to transcripts on {}", TRANSCRIPT_SUBJECT);

        let subscriber = self
            .client
            .subscribe(TRANSCRIPT_SUBJECT)
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(subscriber)
    }

    /// Flush pending publishes
    pub async fn close(self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        Ok(())
    }
}
