use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::SessionState;

/// Statistics about a recognizer
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the recognizer was created
    pub created_at: DateTime<Utc>,

    /// Final results delivered (including no-match results)
    pub utterances_recognized: usize,

    /// Canceled notices delivered
    pub cancellations: usize,

    /// Audio frames streamed to the service
    pub frames_sent: usize,

    /// Keyword matches handed off to recognition
    pub keywords_detected: usize,
}
