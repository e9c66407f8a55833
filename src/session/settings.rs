//! Mutable recognition settings: languages, intents and the auth token.
//!
//! The recognizer keeps an `Arc<RecognitionSettings>` behind a lock and
//! replaces it copy-on-write. Each utterance captures the `Arc` when it
//! starts, so mutations only ever affect the next utterance.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::transport::ServiceIntent;

/// Handle to a language-understanding model that resolves intents service-side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguageUnderstandingModel {
    id: String,
}

impl LanguageUnderstandingModel {
    pub fn from_app_id(app_id: impl Into<String>) -> Result<Self> {
        let id = app_id.into();
        if id.trim().is_empty() {
            return Err(SessionError::InvalidArgument("empty app id".to_string()));
        }
        Ok(Self { id })
    }

    pub fn from_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(SessionError::InvalidArgument(format!(
                "endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }
        Ok(Self { id: endpoint })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IntentTrigger {
    /// Normalised phrase matched against the final text
    Phrase(String),
    ModelIntent { model: String, name: String },
    AllFromModel { model: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IntentEntry {
    trigger: IntentTrigger,
    /// `None` means derive the id from the match
    intent_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecognitionSettings {
    pub language: Option<String>,
    pub candidate_languages: Vec<String>,
    target_languages: Vec<String>,
    intents: Vec<IntentEntry>,
    pub authorization_token: Option<String>,
}

/// Lower-case, strip punctuation, collapse whitespace
pub fn normalize_phrase(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Default intent id for a phrase registered without a custom id
pub fn default_intent_id(phrase: &str) -> String {
    normalize_phrase(phrase).replace(' ', "_")
}

/// Structural BCP-47 check: `lang[-subtag]*`, subtags 1-8 alphanumerics
pub fn validate_language_tag(tag: &str) -> Result<()> {
    let mut subtags = tag.split('-');
    let primary = subtags.next().unwrap_or_default();
    let primary_ok =
        (2..=8).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic());
    let rest_ok = subtags.all(|s| (1..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric()));

    if primary_ok && rest_ok {
        Ok(())
    } else {
        Err(SessionError::InvalidArgument(format!(
            "malformed language tag: {:?}",
            tag
        )))
    }
}

fn validate_intent_id(intent_id: Option<&str>) -> Result<()> {
    match intent_id {
        Some(id) if id.trim().is_empty() => Err(SessionError::InvalidArgument(
            "intent id must not be empty".to_string(),
        )),
        _ => Ok(()),
    }
}

impl RecognitionSettings {
    pub fn target_languages(&self) -> &[String] {
        &self.target_languages
    }

    /// Returns false when the language was already present
    pub fn add_target_language(&mut self, language: &str) -> Result<bool> {
        validate_language_tag(language)?;
        if self
            .target_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
        {
            return Ok(false);
        }
        self.target_languages.push(language.to_string());
        Ok(true)
    }

    /// Returns false when the language was not present
    pub fn remove_target_language(&mut self, language: &str) -> Result<bool> {
        validate_language_tag(language)?;
        let before = self.target_languages.len();
        self.target_languages
            .retain(|l| !l.eq_ignore_ascii_case(language));
        Ok(self.target_languages.len() != before)
    }

    pub fn add_intent_from_phrase(&mut self, phrase: &str, intent_id: Option<&str>) -> Result<()> {
        let normalized = normalize_phrase(phrase);
        if normalized.is_empty() {
            return Err(SessionError::InvalidArgument(
                "intent phrase must contain words".to_string(),
            ));
        }
        validate_intent_id(intent_id)?;
        self.upsert(IntentTrigger::Phrase(normalized), intent_id);
        Ok(())
    }

    pub fn add_intent_from_model(
        &mut self,
        intent_name: &str,
        model: &LanguageUnderstandingModel,
        intent_id: Option<&str>,
    ) -> Result<()> {
        if intent_name.trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "intent name must not be empty".to_string(),
            ));
        }
        validate_intent_id(intent_id)?;
        self.upsert(
            IntentTrigger::ModelIntent {
                model: model.id().to_string(),
                name: intent_name.to_string(),
            },
            intent_id,
        );
        Ok(())
    }

    pub fn add_all_intents_from_model(
        &mut self,
        model: &LanguageUnderstandingModel,
        intent_id: Option<&str>,
    ) -> Result<()> {
        validate_intent_id(intent_id)?;
        self.upsert(
            IntentTrigger::AllFromModel {
                model: model.id().to_string(),
            },
            intent_id,
        );
        Ok(())
    }

    // Re-adding a trigger replaces its id; the latest registration wins.
    fn upsert(&mut self, trigger: IntentTrigger, intent_id: Option<&str>) {
        let intent_id = intent_id.map(str::to_string);
        match self.intents.iter_mut().find(|e| e.trigger == trigger) {
            Some(entry) => entry.intent_id = intent_id,
            None => self.intents.push(IntentEntry { trigger, intent_id }),
        }
    }

    pub fn has_intents(&self) -> bool {
        !self.intents.is_empty()
    }

    /// Models whose intents the service should evaluate
    pub fn intent_models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for entry in &self.intents {
            let model = match &entry.trigger {
                IntentTrigger::Phrase(_) => continue,
                IntentTrigger::ModelIntent { model, .. } | IntentTrigger::AllFromModel { model } => model,
            };
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
        models
    }

    /// Map a final phrase to the configured intent id
    ///
    /// Phrase triggers take precedence over model intents; among model
    /// entries a specific intent beats an all-intents entry.
    pub fn resolve_intent(&self, text: &str, service_intent: Option<&ServiceIntent>) -> Option<String> {
        let normalized = normalize_phrase(text);
        if !normalized.is_empty() {
            for entry in &self.intents {
                if let IntentTrigger::Phrase(phrase) = &entry.trigger {
                    if *phrase == normalized {
                        return Some(
                            entry
                                .intent_id
                                .clone()
                                .unwrap_or_else(|| default_intent_id(phrase)),
                        );
                    }
                }
            }
        }

        let intent = service_intent?;
        let specific = self.intents.iter().find(|e| {
            matches!(&e.trigger, IntentTrigger::ModelIntent { model, name }
                if *model == intent.model_id && *name == intent.name)
        });
        let entry = specific.or_else(|| {
            self.intents.iter().find(|e| {
                matches!(&e.trigger, IntentTrigger::AllFromModel { model } if *model == intent.model_id)
            })
        })?;

        Some(entry.intent_id.clone().unwrap_or_else(|| intent.name.clone()))
    }
}
