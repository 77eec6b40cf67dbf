//! Ask-next decision policy

use super::{Field, SessionProfile};
use crate::config::ProfilingConfig;
use tracing::debug;

/// Decides whether an assistant reply solicits a given field
pub trait AskClassifier: Send + Sync {
    fn asks_for(&self, reply: &str, field: Field) -> bool;
}

/// Matches configured indicator phrases per field, case-insensitively
#[derive(Debug, Clone)]
pub struct KeywordAskClassifier {
    name: Vec<String>,
    email: Vec<String>,
    income: Vec<String>,
}

impl KeywordAskClassifier {
    pub fn from_config(config: &ProfilingConfig) -> Self {
        fn lower(items: &[String]) -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        }

        Self {
            name: lower(&config.name_indicators),
            email: lower(&config.email_indicators),
            income: lower(&config.income_indicators),
        }
    }

    fn indicators(&self, field: Field) -> &[String] {
        match field {
            Field::Name => &self.name,
            Field::Email => &self.email,
            Field::Income => &self.income,
        }
    }
}

impl Default for KeywordAskClassifier {
    fn default() -> Self {
        Self::from_config(&ProfilingConfig::default())
    }
}

impl AskClassifier for KeywordAskClassifier {
    fn asks_for(&self, reply: &str, field: Field) -> bool {
        let reply = reply.to_lowercase();
        self.indicators(field)
            .iter()
            .any(|phrase| reply.contains(phrase.as_str()))
    }
}

/// Applies the single-candidate ask policy to a profile
pub struct ProfileTracker {
    classifier: Box<dyn AskClassifier>,
}

impl ProfileTracker {
    pub fn new(classifier: Box<dyn AskClassifier>) -> Self {
        Self { classifier }
    }

    pub fn from_config(config: &ProfilingConfig) -> Self {
        Self::new(Box::new(KeywordAskClassifier::from_config(config)))
    }

    /// The field to softly ask for this turn: only when exactly one missing field is unasked
    pub fn next_ask(&self, profile: &SessionProfile) -> Option<Field> {
        match profile.candidates().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Record that `reply` asked for the field selected this turn
    ///
    /// Returns true when the asked set grew.
    pub fn observe_reply(
        &self,
        profile: &mut SessionProfile,
        selected: Option<Field>,
        reply: &str,
    ) -> bool {
        let Some(field) = selected else {
            return false;
        };
        if !self.classifier.asks_for(reply, field) {
            return false;
        }
        let added = profile.mark_asked(field);
        if added {
            debug!("Session {} asked for {}", profile.id, field);
        }
        added
    }
}

impl Default for ProfileTracker {
    fn default() -> Self {
        Self::new(Box::new(KeywordAskClassifier::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionResult;

    fn profile_missing(fields: &[Field]) -> SessionProfile {
        let mut profile = SessionProfile::new();
        let value = |f: Field| (!fields.contains(&f)).then(|| "known".to_string());
        profile.merge(&ExtractionResult {
            name: value(Field::Name),
            email: value(Field::Email),
            income: value(Field::Income),
        });
        profile
    }

    #[test]
    fn test_single_candidate_is_asked() {
        let tracker = ProfileTracker::default();
        let profile = profile_missing(&[Field::Income]);
        assert_eq!(tracker.next_ask(&profile), Some(Field::Income));
    }

    #[test]
    fn test_multiple_candidates_no_ask() {
        let tracker = ProfileTracker::default();
        let profile = profile_missing(&[Field::Email, Field::Income]);
        assert_eq!(tracker.next_ask(&profile), None);
    }

    #[test]
    fn test_asked_field_reduces_candidates() {
        let tracker = ProfileTracker::default();
        let mut profile = profile_missing(&[Field::Email, Field::Income]);
        profile.mark_asked(Field::Email);
        assert_eq!(tracker.next_ask(&profile), Some(Field::Income));
    }

    #[test]
    fn test_complete_profile_never_asks() {
        let tracker = ProfileTracker::default();
        let profile = profile_missing(&[]);
        assert!(profile.is_complete());
        assert_eq!(tracker.next_ask(&profile), None);
    }

    #[test]
    fn test_observe_reply_marks_only_selected_field() {
        let tracker = ProfileTracker::default();
        let mut profile = profile_missing(&[Field::Income]);

        assert!(!tracker.observe_reply(&mut profile, Some(Field::Income), "Great to meet you!"));
        assert!(profile.asked_fields.is_empty());

        assert!(tracker.observe_reply(
            &mut profile,
            Some(Field::Income),
            "What kind of BUDGET are you working with?"
        ));
        assert!(profile.asked_fields.contains(&Field::Income));
        assert_eq!(tracker.next_ask(&profile), None);
    }

    #[test]
    fn test_observe_reply_without_selection() {
        let tracker = ProfileTracker::default();
        let mut profile = profile_missing(&[Field::Email, Field::Income]);
        assert!(!tracker.observe_reply(&mut profile, None, "What's your email?"));
        assert!(profile.asked_fields.is_empty());
    }

    #[test]
    fn test_keyword_classifier() {
        let classifier = KeywordAskClassifier::default();
        assert!(classifier.asks_for("What should I call you?", Field::Name));
        assert!(classifier.asks_for("Can I send you the notes?", Field::Email));
        assert!(!classifier.asks_for("Can I send you the notes?", Field::Income));
    }
}
