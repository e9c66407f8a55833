//! Recognizer: one logical recognition session
//!
//! Coordinates single-shot, continuous and keyword-triggered recognition over
//! one audio input and one transport. Configuration (languages, intents,
//! token) can be changed while a run is live; a change applies from the next
//! utterance on.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{AutoDetectSourceLanguageConfig, RecognizerConfig, SessionConfig};
use super::settings::{validate_language_tag, LanguageUnderstandingModel, RecognitionSettings};
use super::state::{RecognitionMode, SessionState};
use super::stats::SessionStats;
use super::worker::{self, RunRequest, WorkerHandle};
use crate::audio::{AudioConfig, AudioFrame, AudioInput, AudioProcessingOptions};
use crate::error::{Result, SessionError};
use crate::events::{
    CancellationDetails, CancellationErrorCode, EventBus, EventKind, FinalResult, HandlerId,
    PartialResult, RecognitionEvent, RecognitionResult,
};
use crate::keyword::KeywordModel;
use crate::transport::RecognitionTransport;

/// Everything needed to construct a [`Recognizer`]
#[derive(Debug)]
pub struct RecognizerOptions {
    pub recognizer: RecognizerConfig,
    pub audio: AudioConfig,
    pub auto_detect: Option<AutoDetectSourceLanguageConfig>,
    pub session: SessionConfig,
}

impl RecognizerOptions {
    pub fn new(recognizer: RecognizerConfig, audio: AudioConfig) -> Self {
        Self {
            recognizer,
            audio,
            auto_detect: None,
            session: SessionConfig::default(),
        }
    }

    pub fn with_auto_detect(mut self, auto_detect: AutoDetectSourceLanguageConfig) -> Self {
        self.auto_detect = Some(auto_detect);
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

pub(crate) struct AudioFeed {
    input: Box<dyn AudioInput>,
    /// Receiver parked between runs
    receiver: Option<mpsc::Receiver<AudioFrame>>,
    started: bool,
}

/// State shared between the recognizer handle and its worker
pub(crate) struct Shared {
    pub session_id: String,
    pub config: SessionConfig,
    pub processing: AudioProcessingOptions,
    pub is_translation: bool,
    pub embedded_model: Option<String>,
    pub transport: Arc<dyn RecognitionTransport>,
    pub events: EventBus,
    pub frames_sent: AtomicUsize,

    settings: RwLock<Arc<RecognitionSettings>>,
    state: Mutex<SessionState>,
    /// A worker owns the session; only written under the `state` lock
    worker_live: AtomicBool,
    mode: Mutex<Option<RecognitionMode>>,
    audio: tokio::sync::Mutex<AudioFeed>,
    utterance_seq: AtomicU64,
    utterances_recognized: AtomicUsize,
    cancellations: AtomicUsize,
    keywords_detected: AtomicUsize,
    created_at: DateTime<Utc>,
}

impl Shared {
    pub fn emit(&self, event: RecognitionEvent) {
        match &event {
            RecognitionEvent::Recognized(_) => {
                self.utterances_recognized.fetch_add(1, Ordering::SeqCst);
            }
            RecognitionEvent::Canceled(_) => {
                self.cancellations.fetch_add(1, Ordering::SeqCst);
            }
            RecognitionEvent::KeywordRecognized(_) => {
                self.keywords_detected.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        self.events.publish(&event);
    }

    pub fn settings_snapshot(&self) -> Arc<RecognitionSettings> {
        self.settings.read().clone()
    }

    pub fn next_utterance(&self) -> u64 {
        self.utterance_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_utterance(&self) -> u64 {
        self.utterance_seq.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `to` only if still in `from`
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.lock();
        if *state == from {
            debug!("[{}] {:?} -> {:?}", self.session_id, from, to);
            *state = to;
            true
        } else {
            false
        }
    }

    /// Move to `to` unless a stop is in progress
    pub fn transition_any(&self, to: SessionState) {
        let mut state = self.state.lock();
        if *state != SessionState::Stopping {
            debug!("[{}] {:?} -> {:?}", self.session_id, *state, to);
            *state = to;
        }
    }

    pub fn activate(&self, mode: RecognitionMode) {
        self.transition(SessionState::Starting, mode.active_state());
    }

    /// Called by a worker on its way out; a concurrent stop owns the final transition
    ///
    /// Until this runs the session refuses new runs, even from `Canceled`.
    pub fn finish_state(&self) {
        let mut state = self.state.lock();
        if *state != SessionState::Stopping {
            debug!("[{}] {:?} -> {:?}", self.session_id, *state, SessionState::Idle);
            *state = SessionState::Idle;
        }
        self.worker_live.store(false, Ordering::SeqCst);
    }

    /// Whether a run is in progress or its worker has not finished yet
    pub fn is_running(&self) -> bool {
        let state = self.state.lock();
        state.is_active() || self.worker_live.load(Ordering::SeqCst)
    }

    pub async fn acquire_audio(&self) -> anyhow::Result<mpsc::Receiver<AudioFrame>> {
        let mut feed = self.audio.lock().await;
        if let Some(receiver) = feed.receiver.take() {
            return Ok(receiver);
        }
        if feed.started {
            anyhow::bail!("Audio input {} is already in use", feed.input.name());
        }
        let receiver = feed.input.start().await?;
        feed.started = true;
        info!("[{}] Audio input started: {}", self.session_id, feed.input.name());
        Ok(receiver)
    }

    pub async fn return_audio(&self, receiver: mpsc::Receiver<AudioFrame>) {
        self.audio.lock().await.receiver = Some(receiver);
    }

    fn update_settings<T>(&self, f: impl FnOnce(&mut RecognitionSettings) -> Result<T>) -> Result<T> {
        let mut guard = self.settings.write();
        f(Arc::make_mut(&mut *guard))
    }
}

/// A recognition session over one audio input
///
/// Events are delivered on the worker task through the recognizer's event
/// bus. Only one run (single-shot, continuous or keyword) may be active at a
/// time; starting another fails with [`SessionError::InvalidOperation`].
pub struct Recognizer {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Recognizer {
    /// Create a recognizer; must be called from within a tokio runtime
    pub fn new(options: RecognizerOptions, transport: Arc<dyn RecognitionTransport>) -> Result<Self> {
        let RecognizerOptions {
            recognizer,
            audio,
            auto_detect,
            session,
        } = options;

        if Handle::try_current().is_err() {
            return Err(SessionError::Runtime(
                "a recognizer must be created inside a tokio runtime".to_string(),
            ));
        }
        if session.sample_rate == 0 || session.channels == 0 {
            return Err(SessionError::InvalidArgument(
                "sample rate and channel count must be non-zero".to_string(),
            ));
        }

        let mut settings = RecognitionSettings::default();
        let mut embedded_model = None;
        match &recognizer {
            RecognizerConfig::Speech(speech) => {
                settings.language = speech.language.clone();
                settings.authorization_token = speech.authorization_token.clone();
            }
            RecognizerConfig::Translation(translation) => {
                settings.language = translation.language.clone();
                settings.authorization_token = translation.authorization_token.clone();
                for target in &translation.target_languages {
                    settings.add_target_language(target)?;
                }
            }
            RecognizerConfig::Embedded(embedded) => {
                if embedded.model_name.trim().is_empty() {
                    return Err(SessionError::InvalidArgument(
                        "embedded model name must not be empty".to_string(),
                    ));
                }
                settings.language = embedded.language.clone();
                embedded_model = Some(embedded.model_name.clone());
            }
        }
        if let Some(language) = &settings.language {
            validate_language_tag(language)?;
        }
        if let Some(auto_detect) = auto_detect {
            if auto_detect.languages.is_empty() {
                return Err(SessionError::InvalidArgument(
                    "auto-detect needs at least one candidate language".to_string(),
                ));
            }
            for language in &auto_detect.languages {
                validate_language_tag(language)?;
            }
            settings.candidate_languages = auto_detect.languages;
        }

        info!(
            "[{}] Recognizer created: {} transport, audio {}",
            session.session_id,
            transport.name(),
            audio.input.name()
        );

        let shared = Shared {
            session_id: session.session_id.clone(),
            processing: audio.processing,
            is_translation: recognizer.is_translation(),
            embedded_model,
            transport,
            events: EventBus::new(),
            frames_sent: AtomicUsize::new(0),
            settings: RwLock::new(Arc::new(settings)),
            state: Mutex::new(SessionState::Idle),
            worker_live: AtomicBool::new(false),
            mode: Mutex::new(None),
            audio: tokio::sync::Mutex::new(AudioFeed {
                input: audio.input,
                receiver: None,
                started: false,
            }),
            utterance_seq: AtomicU64::new(0),
            utterances_recognized: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            keywords_detected: AtomicUsize::new(0),
            created_at: Utc::now(),
            config: session,
        };

        Ok(Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.shared.session_id.clone(),
            state: self.shared.state(),
            created_at: self.shared.created_at,
            utterances_recognized: self.shared.utterances_recognized.load(Ordering::SeqCst),
            cancellations: self.shared.cancellations.load(Ordering::SeqCst),
            frames_sent: self.shared.frames_sent.load(Ordering::SeqCst),
            keywords_detected: self.shared.keywords_detected.load(Ordering::SeqCst),
        }
    }

    // ---- events ----

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&RecognitionEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    pub fn on_recognizing<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&PartialResult) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Recognizing, move |event| {
            if let RecognitionEvent::Recognizing(partial) = event {
                handler(partial);
            }
        })
    }

    pub fn on_recognized<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&FinalResult) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Recognized, move |event| {
            if let RecognitionEvent::Recognized(result) = event {
                handler(result);
            }
        })
    }

    pub fn on_canceled<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&CancellationDetails) + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Canceled, move |event| {
            if let RecognitionEvent::Canceled(notice) = event {
                handler(&notice.details);
            }
        })
    }

    // ---- recognition ----

    /// Recognize a single utterance and wait for its result
    ///
    /// Service failures are reported as [`RecognitionResult::Canceled`]; an
    /// `Err` means the call itself was invalid.
    pub async fn recognize_once(&self) -> Result<RecognitionResult> {
        let (result_tx, result_rx) = oneshot::channel();
        let ready = self.launch(RecognitionMode::SingleShot, None, Some(result_tx))?;
        if let Ok(Err(e)) = ready.await {
            return Err(e);
        }
        result_rx
            .await
            .map_err(|_| SessionError::Runtime("recognition worker ended without a result".to_string()))
    }

    /// Recognize a single utterance without waiting
    ///
    /// `handler` is invoked exactly once, on a worker task, with the result.
    pub fn recognize_once_with<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce(RecognitionResult) + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let ready = self.launch(RecognitionMode::SingleShot, None, Some(result_tx))?;

        let session_id = self.shared.session_id.clone();
        tokio::spawn(async move {
            let result = match ready.await {
                Ok(Err(e)) => RecognitionResult::Canceled(CancellationDetails::error(
                    CancellationErrorCode::RuntimeError,
                    e.to_string(),
                )),
                _ => result_rx.await.unwrap_or_else(|_| {
                    warn!("[{}] Recognition worker ended without a result", session_id);
                    RecognitionResult::Canceled(CancellationDetails::error(
                        CancellationErrorCode::RuntimeError,
                        "recognition worker ended without a result",
                    ))
                }),
            };
            handler(result);
        });
        Ok(())
    }

    /// Start continuous recognition; returns once the worker is listening
    pub async fn start_continuous_recognition(&self) -> Result<()> {
        let ready = self.launch(RecognitionMode::Continuous, None, None)?;
        match ready.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Runtime("recognition worker did not start".to_string())),
        }
    }

    /// Stop continuous recognition
    ///
    /// No-op when already stopped. Once this returns no further events for
    /// the run are delivered.
    pub async fn stop_continuous_recognition(&self) -> Result<()> {
        self.stop(RecognitionMode::Continuous).await
    }

    /// Listen locally for `model`'s keyword, then recognize continuously
    pub async fn start_keyword_recognition(&self, model: Arc<KeywordModel>) -> Result<()> {
        let ready = self.launch(RecognitionMode::Keyword, Some(model), None)?;
        match ready.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Runtime("recognition worker did not start".to_string())),
        }
    }

    /// Stop keyword listening, and any recognition it triggered
    ///
    /// Safe to call when not listening.
    pub async fn stop_keyword_recognition(&self) -> Result<()> {
        if *self.shared.mode.lock() != Some(RecognitionMode::Keyword) {
            debug!("[{}] Keyword recognition not active", self.shared.session_id);
            return Ok(());
        }
        self.stop(RecognitionMode::Keyword).await
    }

    /// Stop any active run and release the audio input
    pub async fn close(self) -> Result<()> {
        let mode = *self.shared.mode.lock();
        if let Some(mode) = mode {
            if self.shared.is_running() {
                self.stop(mode).await?;
            }
        }

        let mut feed = self.shared.audio.lock().await;
        if feed.input.is_capturing() {
            feed.input.stop().await.map_err(SessionError::Audio)?;
        }
        info!("[{}] Recognizer closed", self.shared.session_id);
        Ok(())
    }

    fn launch(
        &self,
        mode: RecognitionMode,
        keyword: Option<Arc<KeywordModel>>,
        result: Option<oneshot::Sender<RecognitionResult>>,
    ) -> Result<oneshot::Receiver<Result<()>>> {
        let handle = Handle::try_current()
            .map_err(|_| SessionError::Runtime("no tokio runtime available".to_string()))?;

        {
            let mut state = self.shared.state.lock();
            if !state.can_start() || self.shared.worker_live.load(Ordering::SeqCst) {
                return Err(SessionError::InvalidOperation(format!(
                    "cannot start {:?} recognition while {:?}",
                    mode, *state
                )));
            }
            *state = SessionState::Starting;
            self.shared.worker_live.store(true, Ordering::SeqCst);
            *self.shared.mode.lock() = Some(mode);
        }

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = handle.spawn(worker::run(
            Arc::clone(&self.shared),
            RunRequest {
                mode,
                keyword,
                cancel: cancel.clone(),
                ready: ready_tx,
                result,
            },
        ));
        *self.worker.lock() = Some(WorkerHandle { cancel, task });
        Ok(ready_rx)
    }

    async fn stop(&self, mode: RecognitionMode) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.can_start() && !self.shared.worker_live.load(Ordering::SeqCst) {
                debug!("[{}] Stop requested while {:?}", self.shared.session_id, *state);
                return Ok(());
            }
            let active = *self.shared.mode.lock();
            if active != Some(mode) && *state != SessionState::Stopping {
                return Err(SessionError::InvalidOperation(format!(
                    "cannot stop {:?} recognition while running {:?}",
                    mode, active
                )));
            }
            *state = SessionState::Stopping;
        }

        info!("[{}] Stopping {:?} recognition", self.shared.session_id, mode);
        let worker = self.worker.lock().take();
        let Some(WorkerHandle { cancel, task }) = worker else {
            // Another stop is joining the worker and owns the final transition.
            return Ok(());
        };
        cancel.cancel();
        if let Err(e) = task.await {
            error!("[{}] Recognition worker failed: {}", self.shared.session_id, e);
        }

        // A worker that panicked never cleared its flag.
        let mut state = self.shared.state.lock();
        *state = SessionState::Idle;
        self.shared.worker_live.store(false, Ordering::SeqCst);
        Ok(())
    }

    // ---- configuration ----

    /// Add a translation target; applies from the next utterance
    pub fn add_target_language(&self, language: &str) -> Result<bool> {
        self.require_translation("add_target_language")?;
        let added = self
            .shared
            .update_settings(|settings| settings.add_target_language(language))?;
        if added {
            info!("[{}] Target language added: {}", self.shared.session_id, language);
        }
        Ok(added)
    }

    pub fn remove_target_language(&self, language: &str) -> Result<bool> {
        self.require_translation("remove_target_language")?;
        let removed = self
            .shared
            .update_settings(|settings| settings.remove_target_language(language))?;
        if removed {
            info!("[{}] Target language removed: {}", self.shared.session_id, language);
        }
        Ok(removed)
    }

    pub fn target_languages(&self) -> Vec<String> {
        self.shared.settings_snapshot().target_languages().to_vec()
    }

    fn require_translation(&self, operation: &str) -> Result<()> {
        if self.shared.is_translation {
            Ok(())
        } else {
            Err(SessionError::InvalidOperation(format!(
                "{} requires a translation recognizer",
                operation
            )))
        }
    }

    pub fn add_intent_from_phrase(&self, phrase: &str, intent_id: Option<&str>) -> Result<()> {
        self.shared
            .update_settings(|settings| settings.add_intent_from_phrase(phrase, intent_id))
    }

    pub fn add_intent_from_model(
        &self,
        intent_name: &str,
        model: &LanguageUnderstandingModel,
        intent_id: Option<&str>,
    ) -> Result<()> {
        self.shared
            .update_settings(|settings| settings.add_intent_from_model(intent_name, model, intent_id))
    }

    pub fn add_all_intents_from_model(
        &self,
        model: &LanguageUnderstandingModel,
        intent_id: Option<&str>,
    ) -> Result<()> {
        self.shared
            .update_settings(|settings| settings.add_all_intents_from_model(model, intent_id))
    }

    pub fn authorization_token(&self) -> Option<String> {
        self.shared.settings_snapshot().authorization_token.clone()
    }

    pub fn set_authorization_token(&self, token: impl Into<String>) {
        Arc::make_mut(&mut *self.shared.settings.write()).authorization_token = Some(token.into());
        debug!("[{}] Authorization token updated", self.shared.session_id);
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.cancel.cancel();
        }
    }
}
