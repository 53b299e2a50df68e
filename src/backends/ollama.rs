//! Locally-hosted model backend (Ollama REST API).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendError, BackendKind, GenerateOptions, GenerationBackend};

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: Option<String>,
}

/// Backend talking to a local Ollama server.
///
/// Availability is probed by listing installed models, mirroring how the
/// server's own CLI checks liveness.
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        match self.client.get(self.endpoint("api/tags")).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "ollama probe failed");
                false
            }
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let request = OllamaRequest {
            model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };
        let response = self
            .client
            .post(self.endpoint("api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|err| BackendError::Unavailable {
                backend: "ollama",
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(BackendError::Request {
                backend: "ollama",
                message: format!("status {}", response.status()),
            });
        }

        let parsed: OllamaResponse =
            response.json().await.map_err(|err| BackendError::Malformed {
                backend: "ollama",
                message: err.to_string(),
            })?;
        parsed.response.ok_or(BackendError::Malformed {
            backend: "ollama",
            message: "result missing 'response' field".to_string(),
        })
    }
}
