//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use vidrag::backends::{BackendError, BackendKind, GenerateOptions, GenerationBackend};
use vidrag::config::Settings;
use vidrag::embedder::{EmbedError, EmbeddingProvider};
use vidrag::pipeline::{
    ArtifactExporter, ArtifactSection, ExportError, ProducerError, RenderedArtifact, TextProducer,
};
use vidrag::transcript::{Transcript, TranscriptError, TranscriptSegment, TranscriptSource};

static TRACING: Once = Once::new();

/// Honor `RUST_LOG` in test output without double-initializing.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Settings rooted in a throwaway data directory.
pub fn test_settings(dir: &TempDir) -> Settings {
    Settings::default().with_data_dir(dir.path())
}

/// Two-topic timed transcript used across the retrieval suites.
///
/// The first segments discuss cooking, the later ones discuss rust, so
/// vocabulary-driven embeddings separate them cleanly.
pub fn timed_transcript() -> Transcript {
    Transcript::from_segments(vec![
        TranscriptSegment::new("welcome everyone to the cooking show", 0.0, 5.0),
        TranscriptSegment::new("today we prepare a tomato pasta sauce", 5.0, 5.0),
        TranscriptSegment::new("simmer the sauce gently for ten minutes", 10.0, 5.0),
        TranscriptSegment::new("now switching topics to the rust language", 15.0, 5.0),
        TranscriptSegment::new("the borrow checker enforces memory safety", 20.0, 5.0),
        TranscriptSegment::new("ownership moves values between bindings", 25.0, 5.0),
    ])
}

/// Transcript source serving canned transcripts from a map.
pub struct StaticTranscriptSource {
    transcripts: FxHashMap<String, Transcript>,
}

impl StaticTranscriptSource {
    pub fn new(entries: Vec<(&str, Transcript)>) -> Self {
        let mut transcripts = FxHashMap::default();
        for (id, transcript) in entries {
            transcripts.insert(id.to_string(), transcript);
        }
        Self { transcripts }
    }

    pub fn single(video_id: &str, transcript: Transcript) -> Self {
        Self::new(vec![(video_id, transcript)])
    }
}

#[async_trait]
impl TranscriptSource for StaticTranscriptSource {
    async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError> {
        self.transcripts
            .get(video_id)
            .cloned()
            .ok_or_else(|| TranscriptError::Unavailable {
                video_id: video_id.to_string(),
                reason: "no transcript fixture registered".to_string(),
            })
    }
}

/// Embedding provider that always fails, for degradation-path tests.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Unavailable {
            provider: "failing".to_string(),
            message: "embedder offline".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        384
    }

    fn id(&self) -> &str {
        "failing"
    }
}

/// Generation backend returning a fixed reply, optionally unavailable.
pub struct ScriptedBackend {
    kind: BackendKind,
    model: String,
    reply: Option<String>,
    available: bool,
    pub calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn replying(kind: BackendKind, reply: &str) -> Self {
        Self {
            kind,
            model: "scripted-model".to_string(),
            reply: Some(reply.to_string()),
            available: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(kind: BackendKind) -> Self {
        Self {
            kind,
            model: "scripted-model".to_string(),
            reply: None,
            available: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Available by probe, but every generation call errors.
    pub fn erroring(kind: BackendKind) -> Self {
        Self {
            kind,
            model: "scripted-model".to_string(),
            reply: None,
            available: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(BackendError::Request {
                backend: "scripted",
                message: "scripted failure".to_string(),
            }),
        }
    }
}

/// Text producer returning a fixed body.
pub struct StaticProducer {
    name: String,
    body: String,
}

impl StaticProducer {
    pub fn new(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl TextProducer for StaticProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, _transcript_text: &str) -> Result<String, ProducerError> {
        Ok(self.body.clone())
    }
}

/// Text producer that always fails.
pub struct FailingProducer {
    name: String,
}

impl FailingProducer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl TextProducer for FailingProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, _transcript_text: &str) -> Result<String, ProducerError> {
        Err(ProducerError(format!("{} producer offline", self.name)))
    }
}

/// Exporter that always fails, forcing the plain-text baseline.
pub struct FailingExporter;

#[async_trait]
impl ArtifactExporter for FailingExporter {
    async fn render(
        &self,
        _sections: &[ArtifactSection],
    ) -> Result<RenderedArtifact, ExportError> {
        Err(ExportError("renderer crashed".to_string()))
    }
}

/// Poll a job until it reaches a terminal state.
pub async fn wait_terminal(pipeline: &vidrag::pipeline::Pipeline, job_id: &str) -> vidrag::Job {
    for _ in 0..200 {
        let job = pipeline.job(job_id).await.expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

/// Chunk, embed, and publish an index for a fixture transcript.
pub async fn build_index_for(
    store: &vidrag::IndexStore,
    embedder: &dyn EmbeddingProvider,
    video_id: &str,
    transcript: &Transcript,
    chunk_char_limit: usize,
) -> vidrag::index::BuildOutcome {
    let segments = transcript.segments.as_deref().expect("timed fixture");
    let chunks = vidrag::chunker::chunk_segments(segments, chunk_char_limit);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = vidrag::embedder::embed_normalized(embedder, &texts)
        .await
        .expect("embedding fixture");
    let index = vidrag::VideoIndex::new(
        video_id,
        vidrag::index::transcript_hash(&transcript.text),
        embedder.dimension(),
        vectors,
        chunks,
    )
    .expect("index fixture");
    store.build(index, false).await.expect("index publish")
}

/// Arc helper to keep call sites short.
pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
