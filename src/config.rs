//! Process-level configuration.
//!
//! All tunables are resolved once at startup into an immutable [`Settings`]
//! value that is passed explicitly into the orchestrator constructors. There
//! is no ambient global state; components only see the settings they were
//! built with.

use std::path::PathBuf;
use std::time::Duration;

use crate::backends::BackendKind;

/// Immutable runtime settings for the chat engine and pipeline.
///
/// Construct with [`Settings::from_env`] (reads `.env` via `dotenvy`, then
/// process environment) or start from [`Settings::default`] and override with
/// the `with_*` builders.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory holding per-video index files.
    pub data_dir: PathBuf,
    /// Character budget per chunk when splitting transcripts.
    pub chunk_char_limit: usize,
    /// Default number of chunks returned by semantic retrieval.
    pub default_top_k: usize,
    /// Default number of neighbor chunks on each side for timestamp retrieval.
    pub default_window: usize,
    /// Whether chat requests use retrieval when the request does not say.
    pub use_retrieval_default: bool,
    /// Hard cap (in characters) on the transcript excerpt used for
    /// ungrounded fallback context.
    pub transcript_excerpt_cap: usize,
    /// Number of most recent conversation turns rendered into the prompt.
    pub history_turns: usize,
    /// Backend preference order for auto-selection.
    pub backend_order: Vec<BackendKind>,
    /// Base URL of the local Ollama server.
    pub ollama_url: String,
    /// Default model for the Ollama backend.
    pub ollama_model: String,
    /// API key for the hosted Gemini backend, if configured.
    pub gemini_api_key: Option<String>,
    /// Default model for the Gemini backend.
    pub gemini_model: String,
    /// Embedding model name passed to the embedding endpoint.
    pub embedding_model: String,
    /// Request-level timeout applied to every generation call.
    pub generate_timeout: Duration,
    /// Maximum attempts for rate-limited hosted-API calls.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("vidrag_data"),
            chunk_char_limit: 800,
            default_top_k: 6,
            default_window: 1,
            use_retrieval_default: true,
            transcript_excerpt_cap: 15_000,
            history_turns: 6,
            backend_order: vec![BackendKind::Ollama, BackendKind::Gemini],
            ollama_url: "http://127.0.0.1:11434".to_string(),
            ollama_model: "qwen2.5:7b".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash-lite".to_string(),
            embedding_model: "all-minilm".to_string(),
            generate_timeout: Duration::from_secs(120),
            retry_attempts: 6,
            retry_base_delay: Duration::from_secs(2),
        }
    }
}

impl Settings {
    /// Resolve settings from the environment, falling back to defaults.
    ///
    /// Loads `.env` first so local development mirrors deployment. Only a
    /// handful of knobs are environment-driven; the rest are code-level
    /// defaults overridable through the builders.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("VIDRAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            ollama_url: std::env::var("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            gemini_api_key: std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("GOOGLE_API_KEY"))
                .ok()
                .filter(|key| !key.trim().is_empty()),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            embedding_model: std::env::var("VIDRAG_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            use_retrieval_default: std::env::var("VIDRAG_USE_RETRIEVAL")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.use_retrieval_default),
            ..defaults
        }
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_chunk_char_limit(mut self, limit: usize) -> Self {
        self.chunk_char_limit = limit;
        self
    }

    #[must_use]
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    #[must_use]
    pub fn with_use_retrieval_default(mut self, enabled: bool) -> Self {
        self.use_retrieval_default = enabled;
        self
    }

    #[must_use]
    pub fn with_backend_order(mut self, order: Vec<BackendKind>) -> Self {
        self.backend_order = order;
        self
    }

    #[must_use]
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    #[must_use]
    pub fn with_transcript_excerpt_cap(mut self, cap: usize) -> Self {
        self.transcript_excerpt_cap = cap;
        self
    }

    #[must_use]
    pub fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let settings = Settings::default()
            .with_chunk_char_limit(120)
            .with_default_top_k(3)
            .with_use_retrieval_default(false)
            .with_history_turns(2);
        assert_eq!(settings.chunk_char_limit, 120);
        assert_eq!(settings.default_top_k, 3);
        assert!(!settings.use_retrieval_default);
        assert_eq!(settings.history_turns, 2);
    }

    #[test]
    fn default_backend_order_prefers_local() {
        let settings = Settings::default();
        assert_eq!(settings.backend_order[0], BackendKind::Ollama);
    }
}
