//! Configuration management for Groundchat
//!
//! Loads the TOML configuration, applies profile and environment overrides, and validates the
//! result before any component is built from it.

use crate::error::{GroundchatError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub profiling: ProfilingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.groundchat"),
        }
    }
}

/// Knowledge source and chunking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Path of the single knowledge text file
    pub source: PathBuf,
    /// Window size in words
    pub chunk_size: usize,
    /// Words shared by consecutive windows
    pub chunk_overlap: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("knowledge.txt"),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "online" (OpenAI-compatible HTTP) or "offline" (local FastEmbed)
    pub mode: String,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: "online".to_string(),
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: None,
            batch_size: 64,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

/// A (trigger, anchor, bonus) ranking rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRule {
    /// Phrase that must appear in the query
    pub trigger: String,
    /// Phrase that must appear in the chunk
    pub anchor: String,
    /// Added to the chunk's key phrase boost when both match
    pub bonus: f32,
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_similarity: f32,
    pub exact_phrase_boost: f32,
    pub key_phrase_boost: f32,
    pub keyword_boost_weight: f32,
    /// Bigrams never used as key phrases
    pub stop_bigrams: Vec<String>,
    /// Maximum cached query embeddings
    pub query_cache_capacity: usize,
    pub anchor_rules: Vec<AnchorRule>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 7,
            min_similarity: 0.2,
            exact_phrase_boost: 0.4,
            key_phrase_boost: 0.25,
            keyword_boost_weight: 0.15,
            stop_bigrams: vec![
                "what is".to_string(),
                "about the".to_string(),
                "is the".to_string(),
            ],
            query_cache_capacity: 1024,
            anchor_rules: Vec::new(),
        }
    }
}

/// Prompt and sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Optional persona text file; the built-in persona is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_file: Option<PathBuf>,
    pub temperature_default: f32,
    pub temperature_context: f32,
    pub temperature_exact: f32,
    /// Query phrases that call for reproducing the knowledge text exactly
    pub exact_reproduction_triggers: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            persona_file: None,
            temperature_default: 0.6,
            temperature_context: 0.3,
            temperature_exact: 0.1,
            exact_reproduction_triggers: vec![
                "verbatim".to_string(),
                "word for word".to_string(),
                "exact quote".to_string(),
                "exact wording".to_string(),
            ],
        }
    }
}

/// Indicator phrases used to detect that a reply solicited a field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub name_indicators: Vec<String>,
    pub email_indicators: Vec<String>,
    pub income_indicators: Vec<String>,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        fn phrases(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            name_indicators: phrases(&["name", "call you", "handle", "who are you"]),
            email_indicators: phrases(&["email", "e-mail", "send you", "contact"]),
            income_indicators: phrases(&[
                "income",
                "capital",
                "budget",
                "working with",
                "trading budget",
                "capital are you",
            ]),
        }
    }
}

/// One ordered extraction rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub pattern: String,
    /// Capture group holding the value (0 = whole match)
    #[serde(default)]
    pub group: usize,
    /// Values (first word, case-insensitive) that must not be accepted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<String>,
}

impl RuleConfig {
    fn new(name: &str, pattern: &str, group: usize, reject: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            group,
            reject: reject.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Field extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Ask the LLM when the patterns find nothing
    pub fallback_enabled: bool,
    pub fallback_temperature: f32,
    pub email_pattern: String,
    pub income_rules: Vec<RuleConfig>,
    pub name_rules: Vec<RuleConfig>,
}

const NAME_REJECT: &[&str] = &[
    "not", "just", "so", "very", "really", "interested", "looking", "ready", "new", "curious",
    "trying", "going", "also", "still", "here", "a", "an", "the", "good", "fine", "well", "back",
    "sorry", "sure", "okay", "ok", "great", "glad", "happy", "doing", "alright",
];

const HERE_REJECT: &[&str] = &[
    "anyone", "someone", "everyone", "nobody", "somebody", "anybody", "everybody", "who", "is",
    "are", "hi", "hello", "hey", "i", "over", "right", "out", "from", "click", "start", "stop",
    "question", "questions", "help", "newbie", "beginner", "new", "stuck", "everything",
];

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            fallback_temperature: 0.1,
            email_pattern: r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}".to_string(),
            income_rules: vec![
                RuleConfig::new(
                    "shorthand_amount",
                    r"(?i)\$?\d{1,3}(?:,?\d{3})*(?:\.\d+)?\s*(?:k|thousand)\b",
                    0,
                    &[],
                ),
                RuleConfig::new(
                    "keyword_amount",
                    r"(?i)\b(?:income|make|earn|earning|salary|budget|capital)\b[^.;!?\n]*?(\$?\d[\d,]*(?:\.\d+)?(?:\s*(?:k|thousand)\b)?)",
                    1,
                    &[],
                ),
                RuleConfig::new("bare_number", r"\$?\b\d{2,6}\b", 0, &[]),
            ],
            name_rules: vec![
                RuleConfig::new(
                    "self_introduction",
                    r"\b(?i:i\s*am|i['’]m|name\s+is|call\s+me)\s+([A-Z][a-zA-Z'-]+(?:\s+[A-Z][a-zA-Z'-]+)*)",
                    1,
                    NAME_REJECT,
                ),
                RuleConfig::new(
                    "greeting_introduction",
                    r"\b(?i:hi|hey|hello),?\s*(?i:i['’]m|i\s+am)\s+([A-Z][a-zA-Z'-]+)",
                    1,
                    NAME_REJECT,
                ),
                RuleConfig::new("name_here", r"\b([A-Z][a-zA-Z'-]+)\s+here\b", 1, HERE_REJECT),
            ],
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("~/.groundchat/groundchat.sock"),
            max_connections: 32,
        }
    }
}

/// Delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Webhook receiving `{subject, body}`; the outbox is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Environment variable holding a bearer token for the webhook
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_token_env: Option<String>,
    pub outbox_dir: PathBuf,
    pub subject_prefix: String,
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_token_env: None,
            outbox_dir: PathBuf::from("~/.groundchat/outbox"),
            subject_prefix: "Groundchat Session".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_source: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GroundchatError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| GroundchatError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| GroundchatError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| GroundchatError::InvalidConfigValue {
                path: "profiles".to_string(),
                message: format!("Unknown profile '{}'", profile),
            })?;

        if let Some(mode) = overrides.embedding_mode {
            self.embedding.mode = mode;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(source) = overrides.knowledge_source {
            self.knowledge.source = source;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: GROUNDCHAT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("GROUNDCHAT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "EMBEDDING__MODE" => self.embedding.mode = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BASE_URL" => self.embedding.base_url = value.to_string(),
            "KNOWLEDGE__SOURCE" => self.knowledge.source = PathBuf::from(value),
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "DELIVERY__WEBHOOK_URL" => self.delivery.webhook_url = Some(value.to_string()),
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k = value.parse().map_err(|_| GroundchatError::InvalidConfigValue {
                    path: path.to_string(),
                    message: format!("Cannot parse '{}' as integer", value),
                })?;
            }
            "RETRIEVAL__MIN_SIMILARITY" => {
                self.retrieval.min_similarity =
                    value.parse().map_err(|_| GroundchatError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as float", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            GroundchatError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("groundchat").join("config.toml"))
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig::default(),
            knowledge: KnowledgeConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            profiling: ProfilingConfig::default(),
            extraction: ExtractionConfig::default(),
            daemon: DaemonConfig::default(),
            delivery: DeliveryConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
