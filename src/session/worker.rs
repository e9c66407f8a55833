//! The per-run recognition task.
//!
//! One worker is spawned for every single-shot, continuous or keyword run. It
//! owns the audio receiver for the duration of the run and hands it back to
//! the recognizer when it finishes, so a later run continues where this one
//! stopped reading. All events of the run are published from this task.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::recognizer::Shared;
use super::settings::RecognitionSettings;
use super::state::{RecognitionMode, SessionState};
use crate::audio::{normalize_frame, AudioFrame, Endpoint, Endpointer};
use crate::error::SessionError;
use crate::events::{
    CancellationDetails, CancellationErrorCode, CancellationReason, CanceledNotice, FinalResult,
    KeywordNotice, PartialResult, RecognitionEvent, RecognitionResult, ResultReason,
};
use crate::keyword::{KeywordModel, KeywordSpotter};
use crate::transport::{ConnectRequest, ServiceEvent, ServicePhrase, TransportChannels, TransportCommand};

enum UtteranceOutcome {
    Recognized { result: FinalResult, input_ended: bool },
    /// The input closed before this utterance received any audio
    NoAudio,
    Canceled(CancellationDetails),
    Stopped,
}

pub(crate) struct WorkerHandle {
    pub cancel: CancellationToken,
    pub task: tokio::task::JoinHandle<()>,
}

pub(crate) struct RunRequest {
    pub mode: RecognitionMode,
    pub keyword: Option<Arc<KeywordModel>>,
    pub cancel: CancellationToken,
    pub ready: oneshot::Sender<Result<(), SessionError>>,
    pub result: Option<oneshot::Sender<RecognitionResult>>,
}

struct Worker {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    audio: mpsc::Receiver<AudioFrame>,
    /// Frames to replay before reading more input (keyword pre-roll)
    backlog: VecDeque<AudioFrame>,
}

pub(crate) async fn run(shared: Arc<Shared>, request: RunRequest) {
    let RunRequest {
        mode,
        keyword,
        cancel,
        ready,
        result,
    } = request;

    let audio = match shared.acquire_audio().await {
        Ok(audio) => audio,
        Err(e) => {
            error!("[{}] Failed to acquire audio input: {:#}", shared.session_id, e);
            shared.finish_state();
            let _ = ready.send(Err(SessionError::Audio(e)));
            return;
        }
    };

    shared.activate(mode);
    let _ = ready.send(Ok(()));
    info!("[{}] {:?} recognition started", shared.session_id, mode);

    let mut worker = Worker {
        shared: Arc::clone(&shared),
        cancel,
        audio,
        backlog: VecDeque::new(),
    };

    shared.emit(RecognitionEvent::SessionStarted {
        session_id: shared.session_id.clone(),
    });

    let outcome = match mode {
        RecognitionMode::SingleShot => Some(worker.run_single_shot().await),
        RecognitionMode::Continuous => {
            worker.run_continuous().await;
            None
        }
        RecognitionMode::Keyword => {
            match keyword {
                Some(model) => worker.run_keyword(model).await,
                None => warn!("[{}] Keyword run without a model", shared.session_id),
            }
            None
        }
    };

    let Worker { audio, backlog, .. } = worker;
    if !backlog.is_empty() {
        debug!("[{}] Dropping {} unsent pre-roll frames", shared.session_id, backlog.len());
    }
    shared.return_audio(audio).await;

    shared.emit(RecognitionEvent::SessionStopped {
        session_id: shared.session_id.clone(),
    });
    shared.finish_state();
    info!("[{}] {:?} recognition finished", shared.session_id, mode);

    if let (Some(tx), Some(outcome)) = (result, outcome) {
        let _ = tx.send(outcome);
    }
}

impl Worker {
    async fn run_single_shot(&mut self) -> RecognitionResult {
        match self.recognize_utterance(true).await {
            UtteranceOutcome::Recognized { result, .. } => RecognitionResult::Recognized(result),
            UtteranceOutcome::NoAudio => {
                let details = CancellationDetails::end_of_stream();
                self.cancel_with(None, details.clone());
                RecognitionResult::Canceled(details)
            }
            UtteranceOutcome::Canceled(details) => {
                let utterance = self.shared.current_utterance();
                self.cancel_with(Some(utterance), details.clone());
                RecognitionResult::Canceled(details)
            }
            UtteranceOutcome::Stopped => RecognitionResult::Canceled(CancellationDetails {
                reason: CancellationReason::CancelledByUser,
                error_code: CancellationErrorCode::NoError,
                error_details: None,
            }),
        }
    }

    async fn run_continuous(&mut self) {
        loop {
            match self.recognize_utterance(false).await {
                UtteranceOutcome::Recognized { input_ended: false, .. } => continue,
                UtteranceOutcome::Recognized { input_ended: true, .. } | UtteranceOutcome::NoAudio => {
                    self.cancel_with(None, CancellationDetails::end_of_stream());
                    return;
                }
                UtteranceOutcome::Canceled(details) => {
                    let utterance = self.shared.current_utterance();
                    self.cancel_with(Some(utterance), details);
                    return;
                }
                UtteranceOutcome::Stopped => return,
            }
        }
    }

    async fn run_keyword(&mut self, model: Arc<KeywordModel>) {
        let cancel = self.cancel.clone();
        let mut spotter: Option<KeywordSpotter> = None;

        let handoff = loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                frame = self.next_frame() => match frame {
                    Some(frame) => Some(frame),
                    None => {
                        self.cancel_with(None, CancellationDetails::end_of_stream());
                        None
                    }
                },
            };
            let Some(frame) = frame else {
                if let Some(spotter) = spotter.as_mut() {
                    spotter.stop();
                }
                return;
            };

            let frame = normalize_frame(frame, self.shared.config.sample_rate, self.shared.config.channels);
            let spotter = spotter.get_or_insert_with(|| {
                let frames = KeywordSpotter::pre_roll_frames_for(
                    self.shared.config.keyword_pre_roll,
                    frame.duration_ms(),
                );
                let mut spotter = KeywordSpotter::new(Arc::clone(&model), frames);
                spotter.start();
                spotter
            });

            if let Some(handoff) = spotter.push_frame(frame) {
                break handoff;
            }
        };

        info!(
            "[{}] Keyword '{}' detected at {}ms (confidence {:.2}), {} pre-roll frames",
            self.shared.session_id,
            handoff.keyword,
            handoff.match_timestamp_ms,
            handoff.confidence,
            handoff.frames.len()
        );
        self.shared.emit(RecognitionEvent::KeywordRecognized(KeywordNotice {
            session_id: self.shared.session_id.clone(),
            keyword: handoff.keyword.clone(),
            confidence: handoff.confidence,
            offset_ms: handoff.match_timestamp_ms,
        }));
        self.backlog.extend(handoff.frames);
        self.shared.transition(SessionState::ListeningForKeyword, SessionState::Listening);

        self.run_continuous().await;
    }

    fn cancel_with(&self, utterance_id: Option<u64>, details: CancellationDetails) {
        match details.reason {
            CancellationReason::EndOfStream => {
                info!("[{}] Audio input ended", self.shared.session_id)
            }
            _ => warn!(
                "[{}] Recognition canceled: {:?} {:?} {}",
                self.shared.session_id,
                details.reason,
                details.error_code,
                details.error_details.as_deref().unwrap_or("")
            ),
        }
        if details.reason != CancellationReason::EndOfStream {
            self.shared.transition_any(SessionState::Canceled);
        }
        self.shared.emit(RecognitionEvent::Canceled(CanceledNotice {
            session_id: self.shared.session_id.clone(),
            utterance_id,
            details,
        }));
    }

    async fn next_frame(&mut self) -> Option<AudioFrame> {
        if let Some(frame) = self.backlog.pop_front() {
            return Some(frame);
        }
        self.audio.recv().await
    }

    async fn recognize_utterance(&mut self, single_shot: bool) -> UtteranceOutcome {
        let cancel = self.cancel.clone();
        let shared = Arc::clone(&self.shared);

        // Don't connect until there is audio to send.
        let first_replayed = !self.backlog.is_empty();
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return UtteranceOutcome::Stopped,
            frame = self.next_frame() => match frame {
                Some(frame) => frame,
                None => return UtteranceOutcome::NoAudio,
            },
        };

        let settings = shared.settings_snapshot();
        let utterance_id = shared.next_utterance();
        let request = connect_request(&shared, &settings, utterance_id);

        debug!(
            "[{}] Connecting utterance {} via {}",
            shared.session_id,
            utterance_id,
            shared.transport.name()
        );
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return UtteranceOutcome::Stopped,
            connected = shared.transport.connect(request) => connected,
        };
        let TransportChannels {
            commands,
            mut events,
        } = match connected {
            Ok(channels) => channels,
            Err(e) => {
                return UtteranceOutcome::Canceled(CancellationDetails::error(e.error_code(), e.to_string()))
            }
        };

        let mut endpointer = Endpointer::new(shared.config.endpointer(single_shot));
        let vad = shared.processing.voice_activity_detection();
        let offset_ms = first.timestamp_ms;
        let mut end_ms = offset_ms;
        let mut audio_done = false;
        let mut input_ended = false;
        let mut deadline: Option<Instant> = None;

        let mut pending = Some((first, first_replayed));

        loop {
            // Feed the first frame before listening for anything else.
            if let Some((frame, replayed)) = pending.take() {
                end_ms = frame.timestamp_ms + frame.duration_ms();
                if self.send_frame(frame, &mut endpointer, vad && !replayed, &commands).await {
                    let _ = commands.send(TransportCommand::EndOfAudio).await;
                    audio_done = true;
                    deadline = Some(Instant::now() + shared.config.final_result_timeout);
                }
                continue;
            }

            let wait_until = deadline.unwrap_or_else(Instant::now);
            let replaying = !self.backlog.is_empty();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = commands.send(TransportCommand::Disconnect).await;
                    return UtteranceOutcome::Stopped;
                }
                event = events.recv() => match event {
                    Some(ServiceEvent::Hypothesis { text, translations }) => {
                        shared.emit(RecognitionEvent::Recognizing(PartialResult {
                            session_id: shared.session_id.clone(),
                            utterance_id,
                            text,
                            translations: translations
                                .into_iter()
                                .filter(|(lang, _)| settings.target_languages().contains(lang))
                                .collect(),
                            offset_ms,
                        }));
                    }
                    Some(ServiceEvent::Synthesis(audio)) => {
                        shared.emit(RecognitionEvent::Synthesizing {
                            session_id: shared.session_id.clone(),
                            utterance_id,
                            audio,
                        });
                    }
                    Some(ServiceEvent::Phrase(phrase)) => {
                        let _ = commands.send(TransportCommand::Disconnect).await;
                        let result = final_result(&shared, &settings, utterance_id, phrase, offset_ms, end_ms);
                        info!(
                            "[{}] Utterance {} recognized ({:?}): {}",
                            shared.session_id, utterance_id, result.reason, result.text
                        );
                        shared.emit(RecognitionEvent::Recognized(result.clone()));
                        return UtteranceOutcome::Recognized { result, input_ended };
                    }
                    Some(ServiceEvent::Error { code, message }) => {
                        let _ = commands.send(TransportCommand::Disconnect).await;
                        return UtteranceOutcome::Canceled(CancellationDetails::error(code, message));
                    }
                    None => {
                        return UtteranceOutcome::Canceled(CancellationDetails::disconnected(
                            "service closed the connection without a final result",
                        ));
                    }
                },
                frame = self.next_frame(), if !audio_done => {
                    let ended = match frame {
                        Some(frame) => {
                            end_ms = frame.timestamp_ms + frame.duration_ms();
                            self.send_frame(frame, &mut endpointer, vad && !replaying, &commands).await
                        }
                        None => {
                            input_ended = true;
                            true
                        }
                    };
                    if ended {
                        let _ = commands.send(TransportCommand::EndOfAudio).await;
                        audio_done = true;
                        deadline = Some(Instant::now() + shared.config.final_result_timeout);
                    }
                }
                _ = tokio::time::sleep_until(wait_until), if deadline.is_some() => {
                    let _ = commands.send(TransportCommand::Disconnect).await;
                    return UtteranceOutcome::Canceled(CancellationDetails::error(
                        CancellationErrorCode::ServiceTimeout,
                        "no final result before timeout",
                    ));
                }
            }
        }
    }

    /// Normalise and stream one frame; returns true when the utterance should end
    ///
    /// Keyword pre-roll is replayed with `vad` off so the hand-off audio
    /// reaches the service in full.
    async fn send_frame(
        &self,
        frame: AudioFrame,
        endpointer: &mut Endpointer,
        vad: bool,
        commands: &mpsc::Sender<TransportCommand>,
    ) -> bool {
        let frame = normalize_frame(frame, self.shared.config.sample_rate, self.shared.config.channels);
        let (_, endpoint) = endpointer.push(&frame);

        // With VAD on, leading silence is never transmitted.
        if !vad || endpointer.speech_seen() {
            if commands.send(TransportCommand::Audio(frame)).await.is_ok() {
                self.shared.frames_sent.fetch_add(1, Ordering::SeqCst);
            }
        }

        if endpoint != Endpoint::Continue {
            debug!(
                "[{}] Endpoint {:?} after {}ms of audio",
                self.shared.session_id,
                endpoint,
                endpointer.audio_ms()
            );
        }
        endpoint != Endpoint::Continue
    }
}

fn connect_request(shared: &Shared, settings: &RecognitionSettings, utterance_id: u64) -> ConnectRequest {
    ConnectRequest {
        session_id: shared.session_id.clone(),
        utterance_id,
        language: settings.language.clone(),
        candidate_languages: settings.candidate_languages.clone(),
        target_languages: settings.target_languages().to_vec(),
        intent_models: settings.intent_models(),
        embedded_model: shared.embedded_model.clone(),
        authorization_token: settings.authorization_token.clone(),
        sample_rate: shared.config.sample_rate,
        channels: shared.config.channels,
    }
}

fn final_result(
    shared: &Shared,
    settings: &RecognitionSettings,
    utterance_id: u64,
    phrase: ServicePhrase,
    offset_ms: u64,
    end_ms: u64,
) -> FinalResult {
    let intent_id = settings.resolve_intent(&phrase.text, phrase.intent.as_ref());
    let translations = phrase
        .translations
        .into_iter()
        .filter(|(lang, _)| settings.target_languages().contains(lang))
        .collect();

    let reason = if phrase.text.trim().is_empty() {
        ResultReason::NoMatch
    } else if intent_id.is_some() {
        ResultReason::RecognizedIntent
    } else if shared.is_translation {
        ResultReason::TranslatedSpeech
    } else {
        ResultReason::RecognizedSpeech
    };

    FinalResult {
        session_id: shared.session_id.clone(),
        utterance_id,
        reason,
        text: phrase.text,
        translations,
        intent_id,
        detected_language: phrase.detected_language,
        confidence: phrase.confidence,
        offset_ms,
        duration_ms: end_ms.saturating_sub(offset_ms),
    }
}
