use serde::Serialize;

/// Lifecycle state of a recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Starting,
    /// Continuous recognition, including after a keyword hand-off
    Listening,
    /// Single-shot recognition in progress
    AwaitingUtterance,
    ListeningForKeyword,
    Stopping,
    /// The last run ended in an unrecoverable error; restartable like `Idle`
    Canceled,
}

impl SessionState {
    /// A new recognition may start from this state
    pub fn can_start(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Canceled)
    }

    pub fn is_active(&self) -> bool {
        !self.can_start()
    }
}

/// Which flavour of recognition a worker runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecognitionMode {
    SingleShot,
    Continuous,
    Keyword,
}

impl RecognitionMode {
    pub(crate) fn active_state(&self) -> SessionState {
        match self {
            RecognitionMode::SingleShot => SessionState::AwaitingUtterance,
            RecognitionMode::Continuous => SessionState::Listening,
            RecognitionMode::Keyword => SessionState::ListeningForKeyword,
        }
    }
}
