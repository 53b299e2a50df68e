//! Language-model backends.
//!
//! Generation is polymorphic over the [`GenerationBackend`] capability: a
//! cheap availability probe plus a prompt-in/text-out call. The closed set of
//! variants (local Ollama server, hosted Gemini API) is selected through the
//! [`BackendRegistry`] rather than reflection, and every failure at this
//! layer is a typed [`BackendError`], never an unhandled fault reaching the
//! orchestrators.

mod gemini;
mod ollama;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

/// Closed set of backend variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    Gemini,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "gemini" => Ok(BackendKind::Gemini),
            other => Err(BackendError::UnknownBackend {
                name: other.to_string(),
            }),
        }
    }
}

/// Per-call generation options.
#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request-level timeout; expiry is treated as a backend failure.
    pub timeout: Duration,
    /// Model override; backends fall back to their configured default.
    pub model: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.3,
            timeout: Duration::from_secs(120),
            model: None,
        }
    }
}

/// Typed failures from backend probing and generation.
#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    #[error("backend {backend} unavailable: {message}")]
    #[diagnostic(
        code(vidrag::backend::unavailable),
        help("Check that the service is running and credentials are configured.")
    )]
    Unavailable {
        backend: &'static str,
        message: String,
    },

    #[error("backend {backend} rate limited: {message}")]
    #[diagnostic(code(vidrag::backend::rate_limited))]
    RateLimited {
        backend: &'static str,
        message: String,
    },

    #[error("backend {backend} request failed: {message}")]
    #[diagnostic(code(vidrag::backend::request))]
    Request {
        backend: &'static str,
        message: String,
    },

    #[error("backend {backend} returned a malformed response: {message}")]
    #[diagnostic(code(vidrag::backend::malformed))]
    Malformed {
        backend: &'static str,
        message: String,
    },

    #[error("backend {backend} timed out after {after:?}")]
    #[diagnostic(code(vidrag::backend::timeout))]
    Timeout {
        backend: &'static str,
        after: Duration,
    },

    #[error("backend {backend} exhausted {attempts} retry attempts")]
    #[diagnostic(code(vidrag::backend::retries_exhausted))]
    RetriesExhausted {
        backend: &'static str,
        attempts: u32,
    },

    #[error("unknown backend: {name}")]
    #[diagnostic(code(vidrag::backend::unknown))]
    UnknownBackend { name: String },

    #[error("no generation backend available")]
    #[diagnostic(
        code(vidrag::backend::none_available),
        help("Start a local Ollama server or configure a Gemini API key.")
    )]
    NoBackendAvailable,
}

/// Capability shared by all generation backends.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Default model this backend generates with.
    fn model(&self) -> &str;

    /// Cheap liveness/capability probe, run before generation is attempted.
    async fn is_available(&self) -> bool;

    /// Generate text for a prompt. Transient failures are retried inside
    /// the backend where the provider semantics call for it.
    async fn generate(&self, prompt: &str, options: &GenerateOptions)
    -> Result<String, BackendError>;
}

/// Bounded exponential backoff with jitter for transient provider failures.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based attempt: base delay
    /// doubling per attempt, plus jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = if self.max_jitter.is_zero() {
            0
        } else {
            rand::rng().random_range(0..=self.max_jitter.as_millis() as u64)
        };
        backoff + Duration::from_millis(jitter_ms)
    }
}

/// A backend chosen by the registry, bound to the model it should run.
#[derive(Clone)]
pub struct SelectedBackend {
    pub backend: Arc<dyn GenerationBackend>,
    pub model: String,
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("backend", &self.backend.kind())
            .field("model", &self.model)
            .finish()
    }
}

/// Registry of configured backends with ordered auto-selection.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn GenerationBackend>>,
}

impl BackendRegistry {
    pub fn new(backends: Vec<Arc<dyn GenerationBackend>>) -> Self {
        Self { backends }
    }

    /// Build the standard Ollama + Gemini pair from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let retry = RetryPolicy {
            attempts: settings.retry_attempts,
            base_delay: settings.retry_base_delay,
            ..RetryPolicy::default()
        };
        Self::new(vec![
            Arc::new(OllamaBackend::new(
                settings.ollama_url.clone(),
                settings.ollama_model.clone(),
            )),
            Arc::new(GeminiBackend::new(
                settings.gemini_api_key.clone(),
                settings.gemini_model.clone(),
                retry,
            )),
        ])
    }

    /// Look up a configured backend by kind.
    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn GenerationBackend>> {
        self.backends.iter().find(|b| b.kind() == kind).cloned()
    }

    /// Return the first available backend in preference order, bound to the
    /// requested model (or the backend default).
    pub async fn auto_select(
        &self,
        preferred_order: &[BackendKind],
        requested_model: Option<&str>,
    ) -> Result<SelectedBackend, BackendError> {
        for kind in preferred_order {
            let Some(backend) = self.get(*kind) else {
                continue;
            };
            if backend.is_available().await {
                let model = requested_model
                    .map(str::to_string)
                    .unwrap_or_else(|| backend.model().to_string());
                debug!(backend = %kind, model, "backend selected");
                return Ok(SelectedBackend { backend, model });
            }
            warn!(backend = %kind, "backend reported unavailable; trying next");
        }
        Err(BackendError::NoBackendAvailable)
    }
}

/// Run a generation call under its request-level timeout.
pub async fn generate_with_timeout(
    backend: &dyn GenerationBackend,
    prompt: &str,
    options: &GenerateOptions,
) -> Result<String, BackendError> {
    match tokio::time::timeout(options.timeout, backend.generate(prompt, options)).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout {
            backend: backend.kind().as_str(),
            after: options.timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend {
        kind: BackendKind,
        available: bool,
        reply: &'static str,
    }

    #[async_trait]
    impl GenerationBackend for FixedBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }
        fn model(&self) -> &str {
            "fixed"
        }
        async fn is_available(&self) -> bool {
            self.available
        }
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, BackendError> {
            Ok(self.reply.to_string())
        }
    }

    #[tokio::test]
    async fn auto_select_skips_unavailable_backend() {
        let registry = BackendRegistry::new(vec![
            Arc::new(FixedBackend {
                kind: BackendKind::Ollama,
                available: false,
                reply: "local",
            }),
            Arc::new(FixedBackend {
                kind: BackendKind::Gemini,
                available: true,
                reply: "hosted",
            }),
        ]);
        let selected = registry
            .auto_select(&[BackendKind::Ollama, BackendKind::Gemini], None)
            .await
            .unwrap();
        assert_eq!(selected.backend.kind(), BackendKind::Gemini);
    }

    #[tokio::test]
    async fn auto_select_with_nothing_available_is_typed() {
        let registry = BackendRegistry::new(vec![Arc::new(FixedBackend {
            kind: BackendKind::Ollama,
            available: false,
            reply: "",
        })]);
        let err = registry
            .auto_select(&[BackendKind::Ollama, BackendKind::Gemini], None)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NoBackendAvailable));
    }

    #[tokio::test]
    async fn requested_model_overrides_backend_default() {
        let registry = BackendRegistry::new(vec![Arc::new(FixedBackend {
            kind: BackendKind::Ollama,
            available: true,
            reply: "ok",
        })]);
        let selected = registry
            .auto_select(&[BackendKind::Ollama], Some("custom"))
            .await
            .unwrap();
        assert_eq!(selected.model, "custom");
    }

    #[tokio::test]
    async fn timeout_expiry_is_a_backend_failure() {
        struct SlowBackend;

        #[async_trait]
        impl GenerationBackend for SlowBackend {
            fn kind(&self) -> BackendKind {
                BackendKind::Ollama
            }
            fn model(&self) -> &str {
                "slow"
            }
            async fn is_available(&self) -> bool {
                true
            }
            async fn generate(
                &self,
                _prompt: &str,
                _options: &GenerateOptions,
            ) -> Result<String, BackendError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(String::new())
            }
        }

        let options = GenerateOptions {
            timeout: Duration::from_millis(20),
            ..GenerateOptions::default()
        };
        let err = generate_with_timeout(&SlowBackend, "hi", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
    }

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("Ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!("GEMINI".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert!("mistral".parse::<BackendKind>().is_err());
    }
}
