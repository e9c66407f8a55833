//! Local keyword spotting ahead of cloud recognition

mod model;
mod spotter;

pub use model::{EnvelopeMatcher, KeywordDetector, KeywordModel, KeywordModelError};
pub use spotter::{KeywordHandoff, KeywordSpotter};
