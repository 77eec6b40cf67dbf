//! Session profiles
//!
//! A profile tracks three fields collected over a conversation plus the set of fields the
//! assistant has already asked for. Known fields never revert to unknown and the asked set only
//! grows.

mod tracker;

pub use tracker::{AskClassifier, KeywordAskClassifier, ProfileTracker};

use crate::extraction::ExtractionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A profile field the assistant collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    Email,
    Income,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Name, Field::Email, Field::Income];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Income => "income",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(Field::Name),
            "email" => Ok(Field::Email),
            "income" => Ok(Field::Income),
            other => Err(format!("unknown profile field: {}", other)),
        }
    }
}

/// Per-session profile state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub income: Option<String>,
    #[serde(default)]
    pub asked_fields: BTreeSet<Field>,
}

impl SessionProfile {
    /// Fresh profile with a random id
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            name: None,
            email: None,
            income: None,
            asked_fields: BTreeSet::new(),
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Name => self.name.as_deref(),
            Field::Email => self.email.as_deref(),
            Field::Income => self.income.as_deref(),
        }
    }

    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Name => &mut self.name,
            Field::Email => &mut self.email,
            Field::Income => &mut self.income,
        }
    }

    /// Apply extracted values; returns the fields that changed
    ///
    /// Blank values are ignored, so a known field is never cleared.
    pub fn merge(&mut self, extracted: &ExtractionResult) -> Vec<Field> {
        let incoming = [
            (Field::Name, extracted.name.as_deref()),
            (Field::Email, extracted.email.as_deref()),
            (Field::Income, extracted.income.as_deref()),
        ];

        let mut changed = Vec::new();
        for (field, value) in incoming {
            let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let slot = self.slot(field);
            if slot.as_deref() != Some(value) {
                *slot = Some(value.to_string());
                changed.push(field);
            }
        }
        changed
    }

    /// Fields with no value yet, in canonical order
    pub fn missing(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    /// Missing fields that have not been asked for
    pub fn candidates(&self) -> Vec<Field> {
        self.missing()
            .into_iter()
            .filter(|f| !self.asked_fields.contains(f))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Returns true when the field was not already marked
    pub fn mark_asked(&mut self, field: Field) -> bool {
        self.asked_fields.insert(field)
    }

    /// One line per known field, for the system prompt
    pub fn known_facts(&self) -> Vec<String> {
        let mut facts = Vec::new();
        if let Some(name) = &self.name {
            facts.push(format!("User's name is: {}", name));
        }
        if let Some(email) = &self.email {
            facts.push(format!("User's email is: {}", email));
        }
        if let Some(income) = &self.income {
            facts.push(format!("User's income level is: {}", income));
        }
        facts
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            income: self.income.clone(),
            created_at: self.created_at,
        }
    }
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Externally visible view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub income: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(name: Option<&str>, email: Option<&str>, income: Option<&str>) -> ExtractionResult {
        ExtractionResult {
            name: name.map(String::from),
            email: email.map(String::from),
            income: income.map(String::from),
        }
    }

    #[test]
    fn test_new_profile_is_empty() {
        let profile = SessionProfile::new();
        assert_eq!(profile.missing(), Field::ALL.to_vec());
        assert!(profile.asked_fields.is_empty());
        assert!(Uuid::parse_str(&profile.id).is_ok());
    }

    #[test]
    fn test_merge_overwrites_but_never_clears() {
        let mut profile = SessionProfile::new();
        profile.merge(&extracted(Some("Jane"), None, None));
        let changed = profile.merge(&extracted(Some("Jane Doe"), Some("  "), None));

        assert_eq!(changed, vec![Field::Name]);
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.email, None);

        profile.merge(&ExtractionResult::default());
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_merge_same_value_is_no_change() {
        let mut profile = SessionProfile::new();
        profile.merge(&extracted(None, Some("a@b.io"), None));
        assert!(profile.merge(&extracted(None, Some("a@b.io"), None)).is_empty());
    }

    #[test]
    fn test_candidates_exclude_asked() {
        let mut profile = SessionProfile::new();
        profile.merge(&extracted(Some("Jane"), None, None));
        assert!(profile.mark_asked(Field::Email));
        assert!(!profile.mark_asked(Field::Email));

        assert_eq!(profile.missing(), vec![Field::Email, Field::Income]);
        assert_eq!(profile.candidates(), vec![Field::Income]);
    }

    #[test]
    fn test_asked_survives_value_update() {
        let mut profile = SessionProfile::new();
        profile.mark_asked(Field::Income);
        profile.merge(&extracted(None, None, Some("50k")));
        profile.merge(&extracted(None, None, Some("60k")));

        assert!(profile.asked_fields.contains(&Field::Income));
        assert_eq!(profile.income.as_deref(), Some("60k"));
    }

    #[test]
    fn test_known_facts() {
        let mut profile = SessionProfile::new();
        profile.merge(&extracted(Some("Jane"), None, Some("85k")));
        assert_eq!(
            profile.known_facts(),
            vec![
                "User's name is: Jane".to_string(),
                "User's income level is: 85k".to_string()
            ]
        );
    }

    #[test]
    fn test_field_parse_and_serde() {
        assert_eq!("Email".parse::<Field>(), Ok(Field::Email));
        assert!("phone".parse::<Field>().is_err());
        assert_eq!(serde_json::to_string(&Field::Income).unwrap(), "\"income\"");
    }
}
