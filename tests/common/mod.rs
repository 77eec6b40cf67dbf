// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use groundchat::config::Config;
use groundchat::embedding::{EmbeddingError, EmbeddingProvider};
use groundchat::error::{GroundchatError, Result};
use groundchat::llm::{ChatModel, CompletionRequest};
use groundchat::orchestrator::Orchestrator;
use groundchat::storage::Database;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Vocabulary of the bag-of-words embedder
pub const VOCABULARY: &[&str] = &[
    "volatility",
    "options",
    "premium",
    "stock",
    "dividend",
    "yield",
    "bond",
    "coupon",
    "risk",
    "hedge",
    "futures",
    "margin",
];

/// Word-count embeddings over [`VOCABULARY`] plus a small constant component
pub struct BagOfWords {
    pub calls: AtomicUsize,
}

impl BagOfWords {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut v: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect();
        v.push(0.05);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "bag-of-words"
    }
}

/// Embedder whose every call fails
pub struct Unreachable;

#[async_trait]
impl EmbeddingProvider for Unreachable {
    async fn embed_batch(
        &self,
        _texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Request("connection refused".to_string()))
    }

    fn model_name(&self) -> &str {
        "unreachable"
    }
}

/// Embeds corpus batches in 3 dimensions but single queries in 2
pub struct ShiftingDimension;

#[async_trait]
impl EmbeddingProvider for ShiftingDimension {
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let dimension = if texts.len() == 1 { 2 } else { 3 };
        Ok(texts.iter().map(|_| vec![1.0; dimension]).collect())
    }

    fn model_name(&self) -> &str {
        "shifting"
    }
}

/// Chat model that replays queued replies and records every request
///
/// JSON-mode requests (the extraction fallback) are answered with `json_reply` and do not consume
/// the queue.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<String>>,
    json_reply: String,
    delay: Duration,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedChat {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Self::build(replies, "{}", Duration::ZERO)
    }

    pub fn with_json(replies: &[&str], json_reply: &str) -> Arc<Self> {
        Self::build(replies, json_reply, Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(&[], "{}", delay)
    }

    fn build(replies: &[&str], json_reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            json_reply: json_reply.to_string(),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Requests that were not extraction fallbacks
    pub fn generation_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.json_mode)
            .cloned()
            .collect()
    }

    pub fn last_system_prompt(&self) -> String {
        self.generation_requests()
            .last()
            .and_then(|r| r.messages.first().map(|m| m.content.clone()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let json_mode = request.json_mode;
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if json_mode {
            return Ok(self.json_reply.clone());
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GroundchatError::Llm("no scripted reply left".to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub const KNOWLEDGE: &str = "Volatility measures how far a stock price swings. Options premium \
rises with volatility. A dividend yield is the annual dividend divided by the stock price. A bond \
pays a coupon until maturity. Futures require margin and can hedge risk.";

/// Config pointing at a knowledge file inside `dir`, with small chunks
pub fn test_config(dir: &Path) -> Config {
    let source = dir.join("knowledge.txt");
    std::fs::write(&source, KNOWLEDGE).unwrap();

    let mut config = Config::default();
    config.storage.data_dir = dir.join("data");
    config.knowledge.source = source;
    config.knowledge.chunk_size = 12;
    config.knowledge.chunk_overlap = 2;
    config.delivery.outbox_dir = dir.join("outbox");
    config
}

pub fn orchestrator(
    config: &Config,
    dir: &Path,
    chat: Arc<ScriptedChat>,
) -> (Orchestrator, Database) {
    orchestrator_with(config, dir, BagOfWords::new(), chat)
}

pub fn orchestrator_with(
    config: &Config,
    dir: &Path,
    provider: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
) -> (Orchestrator, Database) {
    let database = Database::new(&dir.join("sessions.sqlite")).unwrap();
    let orchestrator = Orchestrator::from_config(config, database.clone(), provider, chat).unwrap();
    (orchestrator, database)
}
