use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::model::{KeywordDetector, KeywordModel};
use crate::audio::AudioFrame;

/// Audio and match details handed to recognition when the keyword fires
#[derive(Debug, Clone)]
pub struct KeywordHandoff {
    pub keyword: String,
    pub confidence: f32,
    /// Index of the matching frame, counted from `start()`
    pub match_index: u64,
    pub match_timestamp_ms: u64,
    /// Pre-roll frames followed by the matching frame, oldest first
    pub frames: Vec<AudioFrame>,
}

/// Local keyword detection over a frame stream
///
/// Keeps the last `pre_roll_frames` frames so that recognition can start
/// from audio captured before the keyword boundary.
pub struct KeywordSpotter {
    model: Arc<KeywordModel>,
    detector: Box<dyn KeywordDetector>,
    pre_roll: VecDeque<AudioFrame>,
    pre_roll_frames: usize,
    frames_seen: u64,
    running: bool,
}

impl KeywordSpotter {
    pub fn new(model: Arc<KeywordModel>, pre_roll_frames: usize) -> Self {
        let detector = model.detector();
        Self {
            model,
            detector,
            pre_roll: VecDeque::with_capacity(pre_roll_frames + 1),
            pre_roll_frames,
            frames_seen: 0,
            running: false,
        }
    }

    /// Number of whole frames of `frame_ms` that cover `pre_roll`
    pub fn pre_roll_frames_for(pre_roll: Duration, frame_ms: u64) -> usize {
        if frame_ms == 0 {
            return 0;
        }
        let ms = pre_roll.as_millis() as u64;
        ms.div_ceil(frame_ms) as usize
    }

    pub fn start(&mut self) {
        // A fresh run must not see context from a previous one.
        self.detector.reset();
        self.pre_roll.clear();
        self.frames_seen = 0;
        self.running = true;
        info!(
            "Keyword spotter started: {} (pre-roll {} frames)",
            self.model.keyword(),
            self.pre_roll_frames
        );
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.pre_roll.clear();
        self.pre_roll.shrink_to_fit();
        self.detector.reset();
        info!("Keyword spotter stopped: {}", self.model.keyword());
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn model(&self) -> &Arc<KeywordModel> {
        &self.model
    }

    /// Frames currently held for pre-roll
    pub fn buffered_frames(&self) -> usize {
        self.pre_roll.len()
    }

    /// Evaluate one frame; on a match the spotter stops and hands off its buffer
    pub fn push_frame(&mut self, frame: AudioFrame) -> Option<KeywordHandoff> {
        if !self.running {
            return None;
        }

        let index = self.frames_seen;
        self.frames_seen += 1;

        let score = self.detector.evaluate(&frame);
        let timestamp_ms = frame.timestamp_ms;
        self.pre_roll.push_back(frame);
        while self.pre_roll.len() > self.pre_roll_frames + 1 {
            self.pre_roll.pop_front();
        }

        let confidence = score?;
        debug!(
            "Keyword {} matched at frame {} ({}ms, confidence {:.2})",
            self.model.keyword(),
            index,
            timestamp_ms,
            confidence
        );

        self.running = false;
        self.detector.reset();
        let frames: Vec<AudioFrame> = self.pre_roll.drain(..).collect();

        Some(KeywordHandoff {
            keyword: self.model.keyword().to_string(),
            confidence,
            match_index: index,
            match_timestamp_ms: timestamp_ms,
            frames,
        })
    }
}
