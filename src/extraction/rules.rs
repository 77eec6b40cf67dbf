//! Ordered, pre-compiled extraction rules
//!
//! Each field has a priority-ordered list of rules; the first rule that yields an accepted value
//! wins. Rules come from the `[extraction]` configuration section.

use crate::config::{ExtractionConfig, RuleConfig};
use crate::error::{GroundchatError, Result};
use regex::Regex;

/// Placeholder substituted for email addresses before income rules run
const EMAIL_MASK: &str = " ";

/// One compiled `(pattern, handler)` rule
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub name: String,
    pub regex: Regex,
    /// Capture group holding the value (0 = whole match)
    pub group: usize,
    /// Lower-cased first words that disqualify a match
    pub reject: Vec<String>,
}

impl ExtractionRule {
    fn compile(field: &str, config: &RuleConfig) -> Result<Self> {
        let regex = Regex::new(&config.pattern).map_err(|e| {
            GroundchatError::Config(format!(
                "Invalid {} rule '{}': {}",
                field, config.name, e
            ))
        })?;
        if config.group >= regex.captures_len() {
            return Err(GroundchatError::Config(format!(
                "{} rule '{}' has no capture group {}",
                field, config.name, config.group
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            regex,
            group: config.group,
            reject: config.reject.iter().map(|r| r.to_lowercase()).collect(),
        })
    }

    /// First accepted value in `text`, trimmed
    pub fn apply(&self, text: &str) -> Option<String> {
        self.regex.captures_iter(text).find_map(|caps| {
            let value = caps.get(self.group)?.as_str().trim();
            if value.is_empty() || self.is_rejected(value) {
                return None;
            }
            Some(value.to_string())
        })
    }

    fn is_rejected(&self, value: &str) -> bool {
        let first = value
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        self.reject.iter().any(|r| *r == first)
    }
}

/// Compiled rule registry for all three fields
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub email: Regex,
    pub income: Vec<ExtractionRule>,
    pub name: Vec<ExtractionRule>,
}

impl RuleSet {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let email = Regex::new(&config.email_pattern).map_err(|e| {
            GroundchatError::Config(format!("Invalid email pattern: {}", e))
        })?;

        let income = config
            .income_rules
            .iter()
            .map(|rule| ExtractionRule::compile("income", rule))
            .collect::<Result<Vec<_>>>()?;

        let name = config
            .name_rules
            .iter()
            .map(|rule| ExtractionRule::compile("name", rule))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            email,
            income,
            name,
        })
    }

    pub fn email(&self, text: &str) -> Option<String> {
        self.email.find(text).map(|m| m.as_str().to_string())
    }

    /// Income from the first matching rule, ignoring digits inside email addresses
    pub fn income(&self, text: &str) -> Option<String> {
        let masked = self.email.replace_all(text, EMAIL_MASK);
        self.income.iter().find_map(|rule| rule.apply(&masked))
    }

    pub fn name(&self, text: &str) -> Option<String> {
        self.name.iter().find_map(|rule| rule.apply(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::from_config(&ExtractionConfig::default()).unwrap()
    }

    #[test]
    fn test_email_first_match() {
        assert_eq!(
            rules().email("write a@b.io or c@d.org"),
            Some("a@b.io".to_string())
        );
        assert_eq!(rules().email("no address here"), None);
    }

    #[test]
    fn test_income_priority() {
        let rules = rules();
        assert_eq!(rules.income("I earn around 85k a year"), Some("85k".to_string()));
        assert_eq!(
            rules.income("my salary is $120,000 and I have 2 kids"),
            Some("$120,000".to_string())
        );
        assert_eq!(
            rules.income("about 50 thousand"),
            Some("50 thousand".to_string())
        );
        assert_eq!(rules.income("Probably 7500"), Some("7500".to_string()));
        assert_eq!(rules.income("no numbers"), None);
    }

    #[test]
    fn test_income_ignores_email_digits() {
        assert_eq!(rules().income("reach me at trader2024@example.com"), None);
    }

    #[test]
    fn test_name_rules() {
        let rules = rules();
        assert_eq!(rules.name("Hi, I'm Jane Doe, thanks"), Some("Jane Doe".to_string()));
        assert_eq!(rules.name("my name is Carlos"), Some("Carlos".to_string()));
        assert_eq!(rules.name("you can call me Mo"), Some("Mo".to_string()));
        assert_eq!(rules.name("Sam here, quick question"), Some("Sam".to_string()));
        assert_eq!(rules.name("i am fine"), None);
    }

    #[test]
    fn test_name_reject_list() {
        let rules = rules();
        assert_eq!(rules.name("Anyone here?"), None);
        assert_eq!(rules.name("I'm Interested in options"), None);
    }

    #[test]
    fn test_states_and_topics_are_not_names() {
        let rules = rules();
        assert_eq!(rules.name("Hi! I'm Good, thanks"), None);
        assert_eq!(rules.name("I'm Sorry, I meant bonds"), None);
        assert_eq!(rules.name("I am Back again"), None);
        assert_eq!(rules.name("Question here: how do fees work?"), None);
        assert_eq!(rules.name("Newbie here, be gentle"), None);
        assert_eq!(rules.name("Priya here, quick one"), Some("Priya".to_string()));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = ExtractionConfig::default();
        config.income_rules[0].pattern = "(".to_string();
        assert!(RuleSet::from_config(&config).is_err());
    }

    #[test]
    fn test_missing_group_rejected() {
        let mut config = ExtractionConfig::default();
        config.name_rules[0].group = 5;
        assert!(RuleSet::from_config(&config).is_err());
    }
}
