use crate::config::{Config, RuleConfig};
use crate::error::{GroundchatError, Result, ValidationError};
use regex::Regex;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_knowledge(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_extraction(config, &mut errors);
        Self::validate_daemon(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GroundchatError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_knowledge(config: &Config, errors: &mut Vec<ValidationError>) {
        let knowledge = &config.knowledge;
        if knowledge.chunk_size == 0 {
            errors.push(ValidationError::new(
                "knowledge.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if knowledge.chunk_overlap >= knowledge.chunk_size {
            errors.push(ValidationError::new(
                "knowledge.chunk_overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    knowledge.chunk_overlap, knowledge.chunk_size
                ),
            ));
        }

        if knowledge.source.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "knowledge.source",
                "Knowledge source path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.embedding.mode;
        if mode != "offline" && mode != "online" {
            errors.push(ValidationError::new(
                "embedding.mode",
                format!("Mode must be 'offline' or 'online', got '{}'", mode),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if config.llm.api_key_env.is_empty() {
            errors.push(ValidationError::new(
                "llm.api_key_env",
                "API key variable name cannot be empty",
            ));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;
        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if !(-1.0..=1.0).contains(&retrieval.min_similarity) {
            errors.push(ValidationError::new(
                "retrieval.min_similarity",
                format!(
                    "Minimum similarity must be between -1.0 and 1.0, got {}",
                    retrieval.min_similarity
                ),
            ));
        }

        for (field, value) in [
            ("retrieval.exact_phrase_boost", retrieval.exact_phrase_boost),
            ("retrieval.key_phrase_boost", retrieval.key_phrase_boost),
            ("retrieval.keyword_boost_weight", retrieval.keyword_boost_weight),
        ] {
            if value < 0.0 {
                errors.push(ValidationError::new(
                    field,
                    format!("Boost must not be negative, got {}", value),
                ));
            }
        }

        if retrieval.query_cache_capacity == 0 {
            errors.push(ValidationError::new(
                "retrieval.query_cache_capacity",
                "Query cache capacity must be greater than 0",
            ));
        }

        for (idx, rule) in retrieval.anchor_rules.iter().enumerate() {
            if rule.trigger.trim().is_empty() || rule.anchor.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("retrieval.anchor_rules[{}]", idx),
                    "Trigger and anchor phrases cannot be empty",
                ));
            }
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let generation = &config.generation;
        for (field, temp) in [
            ("generation.temperature_default", generation.temperature_default),
            ("generation.temperature_context", generation.temperature_context),
            ("generation.temperature_exact", generation.temperature_exact),
            (
                "extraction.fallback_temperature",
                config.extraction.fallback_temperature,
            ),
        ] {
            if !(0.0..=2.0).contains(&temp) {
                errors.push(ValidationError::new(
                    field,
                    format!("Temperature must be between 0.0 and 2.0, got {}", temp),
                ));
            }
        }
    }

    fn validate_extraction(config: &Config, errors: &mut Vec<ValidationError>) {
        let extraction = &config.extraction;
        if let Err(e) = Regex::new(&extraction.email_pattern) {
            errors.push(ValidationError::new(
                "extraction.email_pattern",
                format!("Invalid regex: {}", e),
            ));
        }

        Self::validate_rules("extraction.income_rules", &extraction.income_rules, errors);
        Self::validate_rules("extraction.name_rules", &extraction.name_rules, errors);
    }

    fn validate_rules(section: &str, rules: &[RuleConfig], errors: &mut Vec<ValidationError>) {
        for rule in rules {
            match Regex::new(&rule.pattern) {
                Ok(regex) if rule.group >= regex.captures_len() => {
                    errors.push(ValidationError::new(
                        format!("{}.{}", section, rule.name),
                        format!(
                            "Capture group {} does not exist (pattern has {})",
                            rule.group,
                            regex.captures_len() - 1
                        ),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    errors.push(ValidationError::new(
                        format!("{}.{}", section, rule.name),
                        format!("Invalid regex: {}", e),
                    ));
                }
            }
        }
    }

    fn validate_daemon(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.daemon.socket_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "daemon.socket_path",
                "Socket path cannot be empty",
            ));
        }

        if config.daemon.max_connections == 0 {
            errors.push(ValidationError::new(
                "daemon.max_connections",
                "Max connections must be greater than 0",
            ));
        }
    }
}
