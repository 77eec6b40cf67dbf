//! Profile field extraction from free-form user text
//!
//! Deterministic rules run first. Only when they find nothing does the extractor ask the chat
//! model for a JSON object, and any failure on that path degrades to the rule result.

mod rules;

pub use rules::{ExtractionRule, RuleSet};

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel, CompletionRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const FALLBACK_SYSTEM_PROMPT: &str =
    "You extract contact details from a single chat message. Reply with one JSON object only.";

/// Fields found in one utterance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income: Option<String>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.income.is_none()
    }

    /// Parse a fallback reply; `None` when it is not a JSON object
    fn from_model_output(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
        let object = value.as_object()?;

        let text_field = |key: &str| -> Option<String> {
            match object.get(key)? {
                Value::String(s) => non_blank(s),
                _ => None,
            }
        };

        let income = match object.get("income") {
            Some(Value::String(s)) => non_blank(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Some(Self {
            name: text_field("name"),
            email: text_field("email"),
            income,
        })
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Models sometimes wrap JSON in a markdown fence even in JSON mode
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn fallback_prompt(text: &str) -> String {
    format!(
        "Extract the person's name, email address and income level from the message below. \
         Return a JSON object with any of the keys \"name\", \"email\", \"income\" that are \
         present and omit the rest. Names may be first names, nicknames or full names. Income \
         may be written many ways (\"$50k\", \"50k\", \"fifty thousand\").\n\n\
         Message: \"{}\"",
        text
    )
}

/// Rule-first field extractor with an optional model fallback
pub struct FieldExtractor {
    rules: RuleSet,
    chat: Option<Arc<dyn ChatModel>>,
    fallback_temperature: f32,
    timeout: Duration,
}

impl FieldExtractor {
    /// Build from configuration; `chat` is ignored when the fallback is disabled
    pub fn new(
        config: &ExtractionConfig,
        chat: Option<Arc<dyn ChatModel>>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            rules: RuleSet::from_config(config)?,
            chat: chat.filter(|_| config.fallback_enabled),
            fallback_temperature: config.fallback_temperature,
            timeout,
        })
    }

    /// Deterministic rules only
    pub fn extract_fast(&self, text: &str) -> ExtractionResult {
        ExtractionResult {
            name: self.rules.name(text),
            email: self.rules.email(text),
            income: self.rules.income(text),
        }
    }

    /// Rules first, then the model when rules found nothing. Never fails.
    pub async fn extract_fields(&self, text: &str) -> ExtractionResult {
        let fast = self.extract_fast(text);
        if !fast.is_empty() || text.trim().is_empty() {
            return fast;
        }

        let Some(chat) = &self.chat else {
            return fast;
        };

        match self.fallback(chat.as_ref(), text).await {
            Ok(result) => {
                debug!("Fallback extraction found fields: {:?}", result);
                result
            }
            Err(reason) => {
                warn!("Fallback extraction failed: {}", reason);
                fast
            }
        }
    }

    async fn fallback(
        &self,
        chat: &dyn ChatModel,
        text: &str,
    ) -> std::result::Result<ExtractionResult, String> {
        let request = CompletionRequest::new(
            vec![
                ChatMessage::system(FALLBACK_SYSTEM_PROMPT),
                ChatMessage::user(fallback_prompt(text)),
            ],
            self.fallback_temperature,
        )
        .json();

        let raw = tokio::time::timeout(self.timeout, chat.complete(request))
            .await
            .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| e.to_string())?;

        ExtractionResult::from_model_output(&raw)
            .ok_or_else(|| format!("model returned non-object output: {:?}", raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GroundchatError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedChat {
        reply: std::result::Result<String, String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedChat {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("upstream 500".to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedChat {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.json_mode);
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(GroundchatError::Llm)
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn extractor(chat: Arc<ScriptedChat>) -> FieldExtractor {
        FieldExtractor::new(
            &ExtractionConfig::default(),
            Some(chat),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fast_path_skips_fallback() {
        let chat = ScriptedChat::replying(r#"{"name":"Wrong"}"#);
        let result = extractor(chat.clone())
            .extract_fields("Hi, I'm Jane Doe, email jane@example.com")
            .await;

        assert_eq!(result.name.as_deref(), Some("Jane Doe"));
        assert_eq!(result.email.as_deref(), Some("jane@example.com"));
        assert_eq!(result.income, None);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_used_when_rules_find_nothing() {
        let chat = ScriptedChat::replying(r#"{"name":"jamie","income":50000}"#);
        let result = extractor(chat.clone())
            .extract_fields("people usually call me jamie and I do ok")
            .await;

        assert_eq!(result.name.as_deref(), Some("jamie"));
        assert_eq!(result.income.as_deref(), Some("50000"));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fenced_fallback_output() {
        let chat = ScriptedChat::replying("```json\n{\"email\": \"x@y.co\"}\n```");
        let result = extractor(chat).extract_fields("write to me at x at y dot co").await;
        assert_eq!(result.email.as_deref(), Some("x@y.co"));
    }

    #[tokio::test]
    async fn test_malformed_fallback_degrades() {
        let chat = ScriptedChat::replying("Sure! The name is Bob.");
        let result = extractor(chat).extract_fields("nothing useful here").await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_failed_fallback_degrades() {
        let chat = ScriptedChat::failing();
        let result = extractor(chat.clone()).extract_fields("hello there").await;
        assert!(result.is_empty());
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_timeout_degrades() {
        let chat = Arc::new(ScriptedChat {
            reply: Ok(r#"{"name":"Late"}"#.to_string()),
            delay: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        });
        let extractor = FieldExtractor::new(
            &ExtractionConfig::default(),
            Some(chat),
            Duration::from_millis(50),
        )
        .unwrap();
        assert!(extractor.extract_fields("hmm").await.is_empty());
    }

    #[tokio::test]
    async fn test_blank_text_never_calls_model() {
        let chat = ScriptedChat::replying(r#"{"name":"Ghost"}"#);
        let result = extractor(chat.clone()).extract_fields("   ").await;
        assert!(result.is_empty());
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_fallback() {
        let chat = ScriptedChat::replying(r#"{"name":"Ghost"}"#);
        let config = ExtractionConfig {
            fallback_enabled: false,
            ..ExtractionConfig::default()
        };
        let extractor =
            FieldExtractor::new(&config, Some(chat.clone()), Duration::from_secs(1)).unwrap();
        assert!(extractor.extract_fields("nothing here").await.is_empty());
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_model_output_ignores_non_string_values() {
        let parsed =
            ExtractionResult::from_model_output(r#"{"name":42,"email":null,"income":" "}"#)
                .unwrap();
        assert!(parsed.is_empty());
        assert!(ExtractionResult::from_model_output("[1,2]").is_none());
    }
}
