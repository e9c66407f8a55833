use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::audio::{frame_energy, AudioFrame};

#[derive(Debug, thiserror::Error)]
pub enum KeywordModelError {
    #[error("Failed to read keyword model: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed keyword model: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Invalid keyword model: {0}")]
    Invalid(String),
}

/// Frame-by-frame keyword evaluation
///
/// A detector is created per listening run and sees every frame in order.
pub trait KeywordDetector: Send {
    /// Returns the match confidence when the keyword ends on this frame
    fn evaluate(&mut self, frame: &AudioFrame) -> Option<f32>;

    /// Forget all accumulated context
    fn reset(&mut self);
}

type DetectorFactory = Arc<dyn Fn() -> Box<dyn KeywordDetector> + Send + Sync>;

/// Compiled keyword definition, shared by reference between recognizers
pub struct KeywordModel {
    id: String,
    keyword: String,
    factory: DetectorFactory,
}

#[derive(Debug, Deserialize)]
struct KeywordModelFile {
    keyword: String,
    #[serde(default)]
    id: Option<String>,
    threshold: f32,
    #[serde(default = "default_min_energy")]
    min_energy: f32,
    template: Vec<f32>,
}

fn default_min_energy() -> f32 {
    350.0
}

impl KeywordModel {
    /// Load an envelope-template model from a JSON model file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Arc<Self>, KeywordModelError> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        let file: KeywordModelFile = serde_json::from_slice(&raw)?;
        let id = file
            .id
            .clone()
            .unwrap_or_else(|| format!("kws-{}", file.keyword.to_lowercase().replace(' ', "-")));

        info!(
            "Loaded keyword model {} ({}) from {}",
            id,
            file.keyword,
            path.display()
        );

        Self::from_template(id, file.keyword, file.template, file.threshold, file.min_energy)
    }

    /// Build an envelope-template model in memory
    pub fn from_template(
        id: impl Into<String>,
        keyword: impl Into<String>,
        template: Vec<f32>,
        threshold: f32,
        min_energy: f32,
    ) -> Result<Arc<Self>, KeywordModelError> {
        let keyword = keyword.into();
        if keyword.trim().is_empty() {
            return Err(KeywordModelError::Invalid("keyword is empty".to_string()));
        }
        if template.is_empty() || template.iter().all(|v| *v == 0.0) {
            return Err(KeywordModelError::Invalid(
                "template must contain a non-zero value".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(KeywordModelError::Invalid(format!(
                "threshold {} outside 0.0..=1.0",
                threshold
            )));
        }

        let template: Arc<[f32]> = template.into();
        let factory: DetectorFactory = Arc::new(move || {
            Box::new(EnvelopeMatcher::new(Arc::clone(&template), threshold, min_energy))
                as Box<dyn KeywordDetector>
        });

        Ok(Arc::new(Self {
            id: id.into(),
            keyword,
            factory,
        }))
    }

    /// Wrap a custom detector implementation
    pub fn with_detector<F>(id: impl Into<String>, keyword: impl Into<String>, factory: F) -> Arc<Self>
    where
        F: Fn() -> Box<dyn KeywordDetector> + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: id.into(),
            keyword: keyword.into(),
            factory: Arc::new(factory),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn detector(&self) -> Box<dyn KeywordDetector> {
        (self.factory)()
    }
}

impl fmt::Debug for KeywordModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordModel")
            .field("id", &self.id)
            .field("keyword", &self.keyword)
            .finish()
    }
}

/// Matches the recent frame-energy envelope against a template
///
/// The window of the last `template.len()` frame energies is normalised by
/// its peak and compared with cosine similarity.
pub struct EnvelopeMatcher {
    template: Arc<[f32]>,
    threshold: f32,
    min_energy: f32,
    window: VecDeque<f32>,
}

impl EnvelopeMatcher {
    pub fn new(template: Arc<[f32]>, threshold: f32, min_energy: f32) -> Self {
        let len = template.len();
        Self {
            template,
            threshold,
            min_energy,
            window: VecDeque::with_capacity(len),
        }
    }

    fn similarity(&self) -> f32 {
        let peak = self.window.iter().copied().fold(0.0f32, f32::max);
        if peak < self.min_energy || peak <= 0.0 {
            return 0.0;
        }

        let mut dot = 0.0f32;
        let mut norm_w = 0.0f32;
        let mut norm_t = 0.0f32;
        for (w, t) in self.window.iter().zip(self.template.iter()) {
            let w = w / peak;
            dot += w * t;
            norm_w += w * w;
            norm_t += t * t;
        }
        if norm_w == 0.0 || norm_t == 0.0 {
            return 0.0;
        }
        dot / (norm_w.sqrt() * norm_t.sqrt())
    }
}

impl KeywordDetector for EnvelopeMatcher {
    fn evaluate(&mut self, frame: &AudioFrame) -> Option<f32> {
        self.window.push_back(frame_energy(frame));
        while self.window.len() > self.template.len() {
            self.window.pop_front();
        }
        if self.window.len() < self.template.len() {
            return None;
        }

        let score = self.similarity();
        if score >= self.threshold {
            self.window.clear();
            Some(score)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: i16) -> AudioFrame {
        AudioFrame {
            samples: vec![value; 160],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_envelope_matches_rising_shape() {
        let model = KeywordModel::from_template("kws", "hey", vec![0.0, 0.5, 1.0], 0.95, 100.0).unwrap();
        let mut detector = model.detector();

        assert!(detector.evaluate(&frame(0)).is_none());
        assert!(detector.evaluate(&frame(0)).is_none());
        assert!(detector.evaluate(&frame(0)).is_none());
        assert!(detector.evaluate(&frame(1000)).is_none());
        let score = detector.evaluate(&frame(2000)).expect("keyword should match");
        assert!(score > 0.95);
    }

    #[test]
    fn test_quiet_audio_never_matches() {
        let model = KeywordModel::from_template("kws", "hey", vec![1.0], 0.5, 350.0).unwrap();
        let mut detector = model.detector();
        for _ in 0..10 {
            assert!(detector.evaluate(&frame(100)).is_none());
        }
    }

    #[test]
    fn test_invalid_models_rejected() {
        assert!(KeywordModel::from_template("a", "", vec![1.0], 0.5, 0.0).is_err());
        assert!(KeywordModel::from_template("a", "hey", vec![0.0], 0.5, 0.0).is_err());
        assert!(KeywordModel::from_template("a", "hey", vec![1.0], 1.5, 0.0).is_err());
    }
}
