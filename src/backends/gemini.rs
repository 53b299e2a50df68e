//! Hosted-API backend (Gemini `generateContent` REST surface).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{BackendError, BackendKind, GenerateOptions, GenerationBackend, RetryPolicy};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Hosted Gemini backend.
///
/// Availability means a configured API key; no network probe is needed.
/// Rate-limit responses are retried with bounded exponential backoff and
/// jitter before surfacing as [`BackendError::RetriesExhausted`].
#[derive(Clone, Debug)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
    api_base: String,
}

impl GeminiBackend {
    pub fn new(api_key: Option<String>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
            retry,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point at a different API base, for tests against a mock server.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn extract_text(response: GeminiResponse) -> Option<String> {
        let parts = response
            .candidates?
            .into_iter()
            .next()?
            .content?
            .parts?;
        let text: String = parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        let key = self.api_key.as_deref().ok_or(BackendError::Unavailable {
            backend: "gemini",
            message: "no API key configured".to_string(),
        })?;
        let model = options.model.as_deref().unwrap_or(&self.model);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base.trim_end_matches('/'),
            model,
            key
        );
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        };

        for attempt in 0..self.retry.attempts {
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|err| BackendError::Unavailable {
                    backend: "gemini",
                    message: err.to_string(),
                })?;

            // No backoff after the last attempt; it would only delay the
            // RetriesExhausted error.
            let retries_left = attempt + 1 < self.retry.attempts;
            let status = response.status();
            if status.as_u16() == 429 {
                warn!(attempt, "gemini rate limited; backing off");
                if retries_left {
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                if body.contains("RESOURCE_EXHAUSTED") {
                    warn!(attempt, "gemini resources exhausted; backing off");
                    if retries_left {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                    continue;
                }
                return Err(BackendError::Request {
                    backend: "gemini",
                    message: format!("status {status}: {body}"),
                });
            }

            let parsed: GeminiResponse =
                response.json().await.map_err(|err| BackendError::Malformed {
                    backend: "gemini",
                    message: err.to_string(),
                })?;
            return Self::extract_text(parsed).ok_or(BackendError::Malformed {
                backend: "gemini",
                message: "response carried no candidate text".to_string(),
            });
        }

        Err(BackendError::RetriesExhausted {
            backend: "gemini",
            attempts: self.retry.attempts,
        })
    }
}
