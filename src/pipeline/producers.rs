//! LLM-backed text producers.
//!
//! Each producer auto-selects a generation backend and turns the transcript
//! into one artifact section. Backend failures surface as [`ProducerError`]
//! so the pipeline's fail-soft step isolation applies per producer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backends::{BackendKind, BackendRegistry, GenerateOptions, generate_with_timeout};
use crate::chat::prompt::truncate_chars;

use super::{ProducerError, TextProducer};

const SUMMARY_INPUT_CAP: usize = 10_000;
const NOTES_INPUT_CAP: usize = 15_000;
const MINDMAP_INPUT_CAP: usize = 10_000;

async fn generate(
    registry: &BackendRegistry,
    order: &[BackendKind],
    prompt: String,
) -> Result<String, ProducerError> {
    let selected = registry
        .auto_select(order, None)
        .await
        .map_err(|err| ProducerError(err.to_string()))?;
    let options = GenerateOptions {
        model: Some(selected.model),
        ..GenerateOptions::default()
    };
    generate_with_timeout(selected.backend.as_ref(), &prompt, &options)
        .await
        .map_err(|err| ProducerError(err.to_string()))
}

/// Produces a short bullet-point summary of the transcript.
pub struct SummaryProducer {
    registry: Arc<BackendRegistry>,
    order: Vec<BackendKind>,
}

impl SummaryProducer {
    pub fn new(registry: Arc<BackendRegistry>, order: Vec<BackendKind>) -> Self {
        Self { registry, order }
    }
}

#[async_trait]
impl TextProducer for SummaryProducer {
    fn name(&self) -> &str {
        "summary"
    }

    async fn produce(&self, transcript_text: &str) -> Result<String, ProducerError> {
        let prompt = format!(
            "Summarize the following video transcript in 3-5 concise bullet points:\n\n{}",
            truncate_chars(transcript_text, SUMMARY_INPUT_CAP)
        );
        generate(&self.registry, &self.order, prompt).await
    }
}

/// Produces Markdown study notes from the transcript.
pub struct NotesProducer {
    registry: Arc<BackendRegistry>,
    order: Vec<BackendKind>,
}

impl NotesProducer {
    pub fn new(registry: Arc<BackendRegistry>, order: Vec<BackendKind>) -> Self {
        Self { registry, order }
    }
}

#[async_trait]
impl TextProducer for NotesProducer {
    fn name(&self) -> &str {
        "notes"
    }

    async fn produce(&self, transcript_text: &str) -> Result<String, ProducerError> {
        let prompt = format!(
            "Create detailed study notes from this transcript. Use Markdown formatting \
with headers and bullet points:\n\n{}",
            truncate_chars(transcript_text, NOTES_INPUT_CAP)
        );
        generate(&self.registry, &self.order, prompt).await
    }
}

/// Produces a Mermaid mindmap of the transcript's concepts.
pub struct MindmapProducer {
    registry: Arc<BackendRegistry>,
    order: Vec<BackendKind>,
}

impl MindmapProducer {
    pub fn new(registry: Arc<BackendRegistry>, order: Vec<BackendKind>) -> Self {
        Self { registry, order }
    }
}

#[async_trait]
impl TextProducer for MindmapProducer {
    fn name(&self) -> &str {
        "mindmap"
    }

    async fn produce(&self, transcript_text: &str) -> Result<String, ProducerError> {
        let prompt = format!(
            "Create a Mermaid.js mindmap for this content. Return ONLY the mermaid \
code block, starting with `mindmap`.\n\n{}",
            truncate_chars(transcript_text, MINDMAP_INPUT_CAP)
        );
        generate(&self.registry, &self.order, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendError, GenerationBackend};

    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Ollama
        }
        fn model(&self) -> &str {
            "echo"
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, BackendError> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test]
    async fn summary_prompt_caps_transcript_input() {
        let registry = Arc::new(BackendRegistry::new(vec![Arc::new(EchoBackend)]));
        let producer = SummaryProducer::new(registry, vec![BackendKind::Ollama]);
        let long_text = "x".repeat(SUMMARY_INPUT_CAP + 500);
        let out = producer.produce(&long_text).await.unwrap();
        assert!(out.starts_with("Summarize"));
        assert!(out.len() < long_text.len() + 200);
    }

    #[tokio::test]
    async fn mindmap_prompt_asks_for_mermaid_and_caps_input() {
        let registry = Arc::new(BackendRegistry::new(vec![Arc::new(EchoBackend)]));
        let producer = MindmapProducer::new(registry, vec![BackendKind::Ollama]);
        let long_text = "y".repeat(MINDMAP_INPUT_CAP + 500);
        let out = producer.produce(&long_text).await.unwrap();
        assert_eq!(producer.name(), "mindmap");
        assert!(out.contains("Mermaid.js mindmap"));
        assert!(out.len() < long_text.len() + 200);
    }

    #[tokio::test]
    async fn producer_failure_is_typed_when_no_backend() {
        let registry = Arc::new(BackendRegistry::new(Vec::new()));
        let producer = NotesProducer::new(registry, vec![BackendKind::Ollama]);
        let err = producer.produce("text").await.unwrap_err();
        assert!(err.0.contains("no generation backend"));
    }
}
