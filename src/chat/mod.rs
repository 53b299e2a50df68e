//! Grounded chat orchestration.
//!
//! A chat request walks a fixed degradation ladder: retrieval-grounded
//! generation, then transcript-grounded generation, then a templated answer
//! derived from the transcript, and finally an explicit cannot-answer
//! response. Every rung is a reduced capability, not an error; the
//! orchestrator never propagates a fault to the caller.

pub mod prompt;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backends::{
    BackendKind, BackendRegistry, GenerateOptions, SelectedBackend, generate_with_timeout,
};
use crate::config::Settings;
use crate::index::IndexStore;
use crate::retrieval::{Citation, RetrievalEngine, timestamp::parse_timestamp_seconds};
use crate::transcript::{TranscriptSource, extract_video_id};

/// Speaker of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One append-only conversation turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub citations: Vec<Citation>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            citations: Vec::new(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            citations,
            timestamp: Some(Utc::now()),
        }
    }
}

/// Append-only per-video conversation history.
///
/// Storage grows without bound; only the rendered prompt window is capped,
/// deterministically, to the most recent turns.
#[derive(Default)]
pub struct ConversationLog {
    turns: Mutex<FxHashMap<String, Vec<ChatTurn>>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, video_id: &str, turn: ChatTurn) {
        self.turns
            .lock()
            .entry(video_id.to_string())
            .or_default()
            .push(turn);
    }

    /// The `n` most recent turns for a video, oldest first.
    pub fn recent(&self, video_id: &str, n: usize) -> Vec<ChatTurn> {
        let turns = self.turns.lock();
        let Some(history) = turns.get(video_id) else {
            return Vec::new();
        };
        let skip = history.len().saturating_sub(n);
        history[skip..].to_vec()
    }

    pub fn len(&self, video_id: &str) -> usize {
        self.turns.lock().get(video_id).map_or(0, Vec::len)
    }
}

/// A single chat request from the presentation layer.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatRequest {
    /// Video URL or bare id.
    pub video_ref: String,
    pub message: String,
    /// Overrides the settings-level retrieval default when present.
    pub use_retrieval: Option<bool>,
    pub top_k: Option<usize>,
    pub window: Option<usize>,
    pub model: Option<String>,
    pub backend: Option<BackendKind>,
}

/// Which retrieval mode produced the citations, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Semantic,
    Timestamp,
}

/// Metadata describing how a response was produced.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMeta {
    pub backend: Option<BackendKind>,
    pub model: Option<String>,
    pub used_retrieval: bool,
    pub retrieval_mode: Option<RetrievalMode>,
    pub top_k: Option<usize>,
    pub window: Option<usize>,
    /// True when no backend produced text and a templated answer was used.
    pub fallback_used: bool,
}

/// The always-present response object for a chat request.
#[derive(Clone, Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub meta: ChatMeta,
}

/// Orchestrator for retrieval-grounded chat over a video transcript.
pub struct GroundedChat {
    settings: Settings,
    retrieval: RetrievalEngine,
    index_store: Arc<IndexStore>,
    registry: Arc<BackendRegistry>,
    transcripts: Arc<dyn TranscriptSource>,
    log: ConversationLog,
}

impl GroundedChat {
    pub fn new(
        settings: Settings,
        retrieval: RetrievalEngine,
        index_store: Arc<IndexStore>,
        registry: Arc<BackendRegistry>,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> Self {
        Self {
            settings,
            retrieval,
            index_store,
            registry,
            transcripts,
            log: ConversationLog::new(),
        }
    }

    pub fn conversation(&self) -> &ConversationLog {
        &self.log
    }

    /// Answer one chat request.
    ///
    /// Always returns a [`ChatResponse`]; failures along the way degrade the
    /// grounding instead of surfacing to the caller.
    pub async fn chat(&self, request: ChatRequest) -> ChatResponse {
        let video_id =
            extract_video_id(&request.video_ref).unwrap_or_else(|| request.video_ref.clone());

        let transcript_excerpt = match self.transcripts.fetch(&video_id).await {
            Ok(transcript) => {
                prompt::truncate_chars(&transcript.text, self.settings.transcript_excerpt_cap)
                    .to_string()
            }
            Err(err) => {
                warn!(video_id, error = %err, "transcript fetch failed; continuing without excerpt");
                String::new()
            }
        };

        let (citations, retrieval_mode, top_k, window) =
            self.retrieve_context(&request, &video_id).await;

        let history = self.log.recent(&video_id, self.settings.history_turns);
        let grounded_prompt = prompt::build_prompt(
            &citations,
            &transcript_excerpt,
            &history,
            &request.message,
        );

        let selected = self.select_backend(&request).await;
        let mut backend_kind = None;
        let mut model = None;
        let mut answer = None;
        if let Some(selected) = selected {
            let options = GenerateOptions {
                timeout: self.settings.generate_timeout,
                model: Some(selected.model.clone()),
                ..GenerateOptions::default()
            };
            match generate_with_timeout(selected.backend.as_ref(), &grounded_prompt, &options).await
            {
                Ok(text) => {
                    backend_kind = Some(selected.backend.kind());
                    model = Some(selected.model.clone());
                    answer = Some(text);
                }
                Err(err) => {
                    warn!(backend = %selected.backend.kind(), error = %err, "generation failed");
                }
            }
        }

        let fallback_used = answer.is_none();
        let answer = answer
            .unwrap_or_else(|| fallback_answer(&transcript_excerpt, &citations));

        self.log.append(&video_id, ChatTurn::user(&request.message));
        self.log
            .append(&video_id, ChatTurn::assistant(&answer, citations.clone()));

        info!(
            video_id,
            used_retrieval = retrieval_mode.is_some(),
            fallback_used,
            "chat answered"
        );

        ChatResponse {
            answer,
            citations,
            meta: ChatMeta {
                backend: backend_kind,
                model,
                used_retrieval: retrieval_mode.is_some(),
                retrieval_mode,
                top_k,
                window,
                fallback_used,
            },
        }
    }

    /// Decide retrieval usage and run the chosen mode.
    ///
    /// Request-level override beats the settings default; retrieval is only
    /// enabled when an index actually exists. Retrieval failures degrade to
    /// an empty citation list.
    async fn retrieve_context(
        &self,
        request: &ChatRequest,
        video_id: &str,
    ) -> (
        Vec<Citation>,
        Option<RetrievalMode>,
        Option<usize>,
        Option<usize>,
    ) {
        let wanted = request
            .use_retrieval
            .unwrap_or(self.settings.use_retrieval_default);
        if !wanted {
            return (Vec::new(), None, None, None);
        }

        let index_exists = match self.index_store.status(video_id).await {
            Ok(status) => status.exists,
            Err(err) => {
                warn!(video_id, error = %err, "index status check failed");
                false
            }
        };
        if !index_exists {
            return (Vec::new(), None, None, None);
        }

        if let Some(seconds) = parse_timestamp_seconds(&request.message) {
            let window = request.window.unwrap_or(self.settings.default_window);
            match self.retrieval.by_timestamp(video_id, seconds, window).await {
                Ok(citations) if !citations.is_empty() => {
                    return (
                        citations,
                        Some(RetrievalMode::Timestamp),
                        None,
                        Some(window),
                    );
                }
                Ok(_) => return (Vec::new(), None, None, Some(window)),
                Err(err) => {
                    warn!(video_id, error = %err, "timestamp retrieval failed");
                    return (Vec::new(), None, None, Some(window));
                }
            }
        }

        let top_k = request.top_k.unwrap_or(self.settings.default_top_k);
        match self.retrieval.semantic(video_id, &request.message, top_k).await {
            Ok(citations) if !citations.is_empty() => {
                (citations, Some(RetrievalMode::Semantic), Some(top_k), None)
            }
            Ok(_) => (Vec::new(), None, Some(top_k), None),
            Err(err) => {
                warn!(video_id, error = %err, "semantic retrieval failed");
                (Vec::new(), None, Some(top_k), None)
            }
        }
    }

    /// Explicit backend request beats auto-selection; an unknown or
    /// unavailable explicit choice falls back to the preference order.
    async fn select_backend(&self, request: &ChatRequest) -> Option<SelectedBackend> {
        if let Some(kind) = request.backend
            && let Some(backend) = self.registry.get(kind)
            && backend.is_available().await
        {
            let model = request
                .model
                .clone()
                .unwrap_or_else(|| backend.model().to_string());
            return Some(SelectedBackend { backend, model });
        }

        match self
            .registry
            .auto_select(&self.settings.backend_order, request.model.as_deref())
            .await
        {
            Ok(selected) => Some(selected),
            Err(err) => {
                warn!(error = %err, "no generation backend available");
                None
            }
        }
    }
}

/// Last rungs of the ladder: a templated answer from whatever context
/// exists, or an explicit cannot-answer response.
fn fallback_answer(transcript_excerpt: &str, citations: &[Citation]) -> String {
    if let Some(citation) = citations.first() {
        return format!(
            "No language model backend was reachable. The most relevant transcript passage is:\n{}",
            citation.text
        );
    }
    if !transcript_excerpt.is_empty() {
        let snippet = prompt::truncate_chars(transcript_excerpt, 400);
        return format!(
            "No language model backend was reachable. The transcript begins:\n{snippet}"
        );
    }
    "I could not access the transcript for this video, so the question cannot be answered."
        .to_string()
}
