//! Per-turn orchestration
//!
//! One turn: resolve the session, extract fields and retrieve context concurrently, assemble the
//! system prompt, generate, then record whether the reply asked for the selected field.

mod prompt;

pub use prompt::{build_system_prompt, select_temperature, PromptParts, DEFAULT_PERSONA};

use crate::config::{expand_tilde, Config, GenerationConfig};
use crate::corpus::CorpusIndexer;
use crate::embedding::EmbeddingProvider;
use crate::error::{GroundchatError, Result};
use crate::extraction::FieldExtractor;
use crate::llm::{last_user_message, ChatMessage, ChatModel, CompletionRequest};
use crate::profile::{ProfileTracker, SessionProfile, SessionSummary};
use crate::retrieval::HybridRetriever;
use crate::storage::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reply text used when the model returns nothing
const EMPTY_REPLY: &str = "...";

/// Inbound turn: the conversation so far and an optional session id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub reply: ChatMessage,
    pub session_id: String,
}

pub struct Orchestrator {
    extractor: FieldExtractor,
    retriever: Arc<HybridRetriever>,
    tracker: ProfileTracker,
    chat: Arc<dyn ChatModel>,
    database: Database,
    persona: String,
    generation: GenerationConfig,
    generation_timeout: Duration,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: FieldExtractor,
        retriever: Arc<HybridRetriever>,
        tracker: ProfileTracker,
        chat: Arc<dyn ChatModel>,
        database: Database,
        persona: String,
        generation: GenerationConfig,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            extractor,
            retriever,
            tracker,
            chat,
            database,
            persona,
            generation,
            generation_timeout,
        }
    }

    /// Wire every component from configuration around the given collaborators
    pub fn from_config(
        config: &Config,
        database: Database,
        provider: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let indexer = Arc::new(CorpusIndexer::from_config(
            &config.knowledge,
            &config.embedding,
            Arc::clone(&provider),
        ));
        let retriever = Arc::new(HybridRetriever::new(
            indexer,
            provider,
            config.retrieval.clone(),
            Duration::from_secs(config.embedding.timeout_secs),
        ));
        let generation_timeout = Duration::from_secs(config.llm.timeout_secs);
        let extractor = FieldExtractor::new(
            &config.extraction,
            Some(Arc::clone(&chat)),
            generation_timeout,
        )?;
        let tracker = ProfileTracker::from_config(&config.profiling);
        let persona = load_persona(&config.generation)?;

        Ok(Self::new(
            extractor,
            retriever,
            tracker,
            chat,
            database,
            persona,
            config.generation.clone(),
            generation_timeout,
        ))
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        &self.retriever
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Existing session for `id`, or a fresh unsaved one when absent or unknown
    ///
    /// The flag is true for a fresh session; it is only stored once the turn persists it.
    fn resolve_session(&self, id: Option<&str>) -> Result<(SessionProfile, bool)> {
        if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) {
            if let Some(profile) = self.database.get_session(id)? {
                return Ok((profile, false));
            }
            debug!("Unknown session {}, starting a new one", id);
        }
        let profile = SessionProfile::new();
        info!("Started session {}", profile.id);
        Ok((profile, true))
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnReply> {
        let (mut profile, mut unsaved) = self.resolve_session(request.session_id.as_deref())?;
        let query = last_user_message(&request.messages)
            .unwrap_or_default()
            .to_string();

        let (extracted, passages) = tokio::join!(
            self.extractor.extract_fields(&query),
            self.retriever.retrieve_or_empty(&query)
        );

        let changed = profile.merge(&extracted);
        if !changed.is_empty() {
            profile = self.database.save_changes(&profile, &changed)?;
            unsaved = false;
        }

        let ask = self.tracker.next_ask(&profile);
        let anchors = if passages.is_empty() {
            Vec::new()
        } else {
            self.retriever.matched_anchor_rules(&query)
        };
        let system = build_system_prompt(&PromptParts {
            persona: &self.persona,
            profile: &profile,
            ask,
            passages: &passages,
            anchors: &anchors,
        });
        let temperature = select_temperature(&self.generation, !passages.is_empty(), &query);
        debug!(
            "Session {}: {} passages, ask {:?}, temperature {}",
            profile.id,
            passages.len(),
            ask,
            temperature
        );

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::system(system));
        messages.extend(request.messages);

        let content = tokio::time::timeout(
            self.generation_timeout,
            self.chat.complete(CompletionRequest::new(messages, temperature)),
        )
        .await
        .map_err(|_| GroundchatError::Timeout {
            operation: "generation".to_string(),
            secs: self.generation_timeout.as_secs(),
        })??;

        let content = if content.trim().is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            content
        };

        let asked = self.tracker.observe_reply(&mut profile, ask, &content);
        if asked || unsaved {
            // best effort once the reply exists
            if let Err(e) = self.database.save_changes(&profile, &[]) {
                warn!("Failed to persist session {}: {}", profile.id, e);
            }
        }

        Ok(TurnReply {
            reply: ChatMessage::assistant(content),
            session_id: profile.id,
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<SessionProfile> {
        self.database
            .get_session(id)?
            .ok_or_else(|| GroundchatError::SessionNotFound { id: id.to_string() })
    }

    pub fn lookup_session(&self, id: &str) -> Result<SessionSummary> {
        Ok(self.get_profile(id)?.summary())
    }
}

fn load_persona(config: &GenerationConfig) -> Result<String> {
    match &config.persona_file {
        Some(path) => {
            let path = expand_tilde(path);
            std::fs::read_to_string(&path).map_err(|e| GroundchatError::Io {
                source: e,
                context: format!("Failed to read persona file: {}", path.display()),
            })
        }
        None => Ok(DEFAULT_PERSONA.to_string()),
    }
}
