//! Deterministic in-process stand-in for the recognition service
//!
//! Each connect consumes the next [`UtteranceScript`] (or repeats the
//! fallback script). Audio is recorded in a shared [`TransportLog`] so callers
//! can check exactly what was streamed.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    ConnectRequest, RecognitionTransport, ServiceEvent, ServiceIntent, ServicePhrase,
    TransportChannels, TransportCommand, TransportError,
};
use crate::audio::AudioFrame;
use crate::events::CancellationErrorCode;

#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    /// `connect` itself fails
    Refuse(TransportError),
    /// The service reports an error once this many frames arrived
    ServiceError {
        after_frames: usize,
        code: CancellationErrorCode,
        message: String,
    },
    /// The service hangs up at end of audio without a final phrase
    Hangup,
}

#[derive(Debug, Clone, Default)]
pub struct UtteranceScript {
    pub partials: Vec<String>,
    /// Emit the next partial after every `partial_every` frames
    pub partial_every: usize,
    pub phrase: ServicePhrase,
    pub synthesis: Option<Vec<u8>>,
    pub failure: Option<ScriptedFailure>,
}

impl UtteranceScript {
    pub fn recognized(text: impl Into<String>) -> Self {
        Self {
            phrase: ServicePhrase {
                text: text.into(),
                ..Default::default()
            },
            partial_every: 1,
            ..Default::default()
        }
    }

    pub fn failing(failure: ScriptedFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    pub fn with_partials<I, S>(mut self, partials: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partials = partials.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_translation(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.phrase.translations.insert(language.into(), text.into());
        self
    }

    pub fn with_intent(mut self, model_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.phrase.intent = Some(ServiceIntent {
            model_id: model_id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_detected_language(mut self, language: impl Into<String>) -> Self {
        self.phrase.detected_language = Some(language.into());
        self
    }

    pub fn with_synthesis(mut self, audio: Vec<u8>) -> Self {
        self.synthesis = Some(audio);
        self
    }
}

/// What the scripted service has seen so far
#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    pub requests: Vec<ConnectRequest>,
    pub frames: Vec<AudioFrame>,
    pub end_of_audio: usize,
    pub disconnects: usize,
}

#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<UtteranceScript>>,
    fallback: Option<UtteranceScript>,
    log: Arc<Mutex<TransportLog>>,
}

impl ScriptedTransport {
    pub fn new<I>(scripts: I) -> Self
    where
        I: IntoIterator<Item = UtteranceScript>,
    {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            fallback: None,
            log: Arc::new(Mutex::new(TransportLog::default())),
        }
    }

    /// Script used once the queue is empty
    pub fn repeating(script: UtteranceScript) -> Self {
        Self {
            fallback: Some(script),
            ..Self::new(Vec::new())
        }
    }

    pub fn log(&self) -> TransportLog {
        self.log.lock().clone()
    }

    fn next_script(&self) -> Option<UtteranceScript> {
        self.scripts.lock().pop_front().or_else(|| self.fallback.clone())
    }
}

fn filter_translations(
    translations: &BTreeMap<String, String>,
    targets: &[String],
) -> BTreeMap<String, String> {
    translations
        .iter()
        .filter(|(lang, _)| targets.iter().any(|t| t == *lang))
        .map(|(lang, text)| (lang.clone(), text.clone()))
        .collect()
}

#[async_trait::async_trait]
impl RecognitionTransport for ScriptedTransport {
    async fn connect(&self, request: ConnectRequest) -> Result<TransportChannels, TransportError> {
        let script = self
            .next_script()
            .ok_or_else(|| TransportError::Service("no scripted utterance left".to_string()))?;

        if let Some(ScriptedFailure::Refuse(err)) = &script.failure {
            return Err(err.clone());
        }

        let targets = request.target_languages.clone();
        self.log.lock().requests.push(request);

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<TransportCommand>(64);
        let (event_tx, event_rx) = mpsc::channel::<ServiceEvent>(64);
        let log = Arc::clone(&self.log);

        tokio::spawn(async move {
            let mut frames = 0usize;
            let mut partials = script.partials.iter();

            while let Some(command) = cmd_rx.recv().await {
                match command {
                    TransportCommand::Audio(frame) => {
                        log.lock().frames.push(frame);
                        frames += 1;

                        if let Some(ScriptedFailure::ServiceError {
                            after_frames,
                            code,
                            message,
                        }) = &script.failure
                        {
                            if frames >= *after_frames {
                                let _ = event_tx
                                    .send(ServiceEvent::Error {
                                        code: *code,
                                        message: message.clone(),
                                    })
                                    .await;
                                break;
                            }
                        }

                        if script.partial_every > 0 && frames % script.partial_every == 0 {
                            if let Some(text) = partials.next() {
                                let _ = event_tx
                                    .send(ServiceEvent::Hypothesis {
                                        text: text.clone(),
                                        translations: BTreeMap::new(),
                                    })
                                    .await;
                            }
                        }
                    }
                    TransportCommand::EndOfAudio => {
                        log.lock().end_of_audio += 1;
                        if matches!(script.failure, Some(ScriptedFailure::Hangup)) {
                            break;
                        }
                        if let Some(audio) = &script.synthesis {
                            let _ = event_tx.send(ServiceEvent::Synthesis(audio.clone())).await;
                        }
                        let mut phrase = script.phrase.clone();
                        phrase.translations = filter_translations(&phrase.translations, &targets);
                        let _ = event_tx.send(ServiceEvent::Phrase(phrase)).await;
                    }
                    TransportCommand::Disconnect => {
                        log.lock().disconnects += 1;
                        break;
                    }
                }
            }
            debug!("Scripted utterance finished after {} frames", frames);
        });

        Ok(TransportChannels {
            commands: cmd_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
