//! Artifact-generation pipeline with fail-soft step isolation.
//!
//! A job moves `queued → running → (succeeded | failed)` and never leaves a
//! terminal state. Steps run in order: resolve the video id, fetch the
//! transcript, build the retrieval index, run the text producers, render an
//! artifact, and store it. Index-build and individual-producer failures
//! degrade the job rather than failing it; the job fails only when nothing
//! can be produced at all, or when a step error escapes the fail-soft
//! wrappers, in which case the error text is captured verbatim on the job.

mod memory;
mod producers;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chunker::{self, Chunk};
use crate::config::Settings;
use crate::embedder::{EmbedError, EmbeddingProvider, embed_normalized};
use crate::index::{BuildOutcome, IndexError, IndexStore, VideoIndex, transcript_hash};
use crate::transcript::{Transcript, TranscriptError, TranscriptSource, extract_video_id};

pub use memory::{InMemoryArtifactStore, InMemoryJobStore};
pub use producers::{MindmapProducer, NotesProducer, SummaryProducer};

/// Job lifecycle states. `Succeeded` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// Persistent record of one pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_ref: String,
    pub video_id: Option<String>,
    pub status: JobStatus,
    /// Artifact references accumulated as export steps succeed.
    pub artifact_refs: FxHashMap<String, String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn queued(source_ref: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            source_ref: source_ref.into(),
            video_id: None,
            status: JobStatus::Queued,
            artifact_refs: FxHashMap::default(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Pagination and filtering for job listings.
#[derive(Clone, Debug)]
pub struct JobFilter {
    pub video_id: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            video_id: None,
            offset: 0,
            limit: 50,
        }
    }
}

/// Failures from the job metadata collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum JobStoreError {
    #[error("job not found: {id}")]
    #[diagnostic(code(vidrag::jobs::not_found))]
    NotFound { id: String },

    #[error("illegal job transition {from:?} -> {to:?}")]
    #[diagnostic(
        code(vidrag::jobs::illegal_transition),
        help("Terminal job states absorb all further transitions.")
    )]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

/// Failure of a single text producer.
#[derive(Debug, Error, Diagnostic)]
#[error("text producer failed: {0}")]
#[diagnostic(code(vidrag::pipeline::producer))]
pub struct ProducerError(pub String);

/// Failures from the artifact exporter collaborator.
#[derive(Debug, Error, Diagnostic)]
#[error("artifact export failed: {0}")]
#[diagnostic(code(vidrag::pipeline::export))]
pub struct ExportError(pub String);

/// Failures from the artifact storage collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum ArtifactStoreError {
    #[error("artifact not found: {artifact_ref}")]
    #[diagnostic(code(vidrag::artifacts::not_found))]
    NotFound { artifact_ref: String },

    #[error("artifact store failure: {0}")]
    #[diagnostic(code(vidrag::artifacts::store))]
    Storage(String),
}

/// Fatal pipeline failures; everything here transitions the job to `failed`.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Transcript(#[from] TranscriptError),

    #[error("no artifact could be produced: every text producer failed")]
    #[diagnostic(
        code(vidrag::pipeline::no_artifact),
        help("At least one producer must succeed for the job to have output.")
    )]
    NoArtifact,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Artifacts(#[from] ArtifactStoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Jobs(#[from] JobStoreError),
}

/// One titled block of produced text headed for export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSection {
    pub title: String,
    pub body: String,
}

/// Bytes ready for storage, with their rendered format.
#[derive(Clone, Debug)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub extension: String,
    pub content_type: String,
}

/// External text producer (summary, structured notes, concept map, ...).
#[async_trait]
pub trait TextProducer: Send + Sync {
    /// Stable step name, used as the section title and artifact key.
    fn name(&self) -> &str;

    async fn produce(&self, transcript_text: &str) -> Result<String, ProducerError>;
}

/// External export/rendering collaborator.
#[async_trait]
pub trait ArtifactExporter: Send + Sync {
    async fn render(&self, sections: &[ArtifactSection]) -> Result<RenderedArtifact, ExportError>;
}

/// External durable artifact storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, content_type: &str)
    -> Result<String, ArtifactStoreError>;

    async fn retrieve(&self, artifact_ref: &str) -> Result<Vec<u8>, ArtifactStoreError>;
}

/// External job metadata store.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: Job) -> Result<(), JobStoreError>;

    async fn get(&self, id: &str) -> Result<Job, JobStoreError>;

    /// Transition a job's status, enforcing the state machine. `error` is
    /// recorded verbatim when present.
    async fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), JobStoreError>;

    async fn set_video_id(&self, id: &str, video_id: &str) -> Result<(), JobStoreError>;

    async fn add_artifact(
        &self,
        id: &str,
        kind: &str,
        artifact_ref: &str,
    ) -> Result<(), JobStoreError>;

    /// List jobs newest first, honoring the filter's pagination.
    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError>;
}

/// Baseline plain-text renderer used when the preferred exporter fails.
///
/// Joins the produced sections into a single text document so every job
/// exits with at least one downloadable artifact.
pub struct PlainTextExporter;

impl PlainTextExporter {
    /// Infallible rendering; the pipeline's export fallback relies on this
    /// never failing.
    pub fn render_plain(sections: &[ArtifactSection]) -> RenderedArtifact {
        let body = sections
            .iter()
            .map(|s| format!("# {}\n\n{}", s.title, s.body))
            .collect::<Vec<_>>()
            .join("\n\n");
        RenderedArtifact {
            bytes: body.into_bytes(),
            extension: "txt".to_string(),
            content_type: "text/plain".to_string(),
        }
    }
}

#[async_trait]
impl ArtifactExporter for PlainTextExporter {
    async fn render(&self, sections: &[ArtifactSection]) -> Result<RenderedArtifact, ExportError> {
        Ok(Self::render_plain(sections))
    }
}

/// Orchestrator sequencing chunking/indexing, text production, export, and
/// storage into one background job per source reference.
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    settings: Settings,
    transcripts: Arc<dyn TranscriptSource>,
    embedder: Arc<dyn EmbeddingProvider>,
    index_store: Arc<IndexStore>,
    producers: Vec<Arc<dyn TextProducer>>,
    exporter: Arc<dyn ArtifactExporter>,
    artifacts: Arc<dyn ArtifactStore>,
    jobs: Arc<dyn JobStore>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        transcripts: Arc<dyn TranscriptSource>,
        embedder: Arc<dyn EmbeddingProvider>,
        index_store: Arc<IndexStore>,
        producers: Vec<Arc<dyn TextProducer>>,
        exporter: Arc<dyn ArtifactExporter>,
        artifacts: Arc<dyn ArtifactStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                settings,
                transcripts,
                embedder,
                index_store,
                producers,
                exporter,
                artifacts,
                jobs,
            }),
        }
    }

    /// Enqueue a job and return its id immediately.
    ///
    /// The run itself executes as a background task; its only handle is the
    /// job id, through which every terminal state is observable.
    pub async fn enqueue(&self, source_ref: &str) -> Result<String, JobStoreError> {
        self.enqueue_with_options(source_ref, false).await
    }

    /// Enqueue with an explicit force-reindex request.
    pub async fn enqueue_with_options(
        &self,
        source_ref: &str,
        force_reindex: bool,
    ) -> Result<String, JobStoreError> {
        let job = Job::queued(source_ref);
        let job_id = job.id.clone();
        self.inner.jobs.create(job).await?;

        let inner = Arc::clone(&self.inner);
        let spawned_id = job_id.clone();
        let source = source_ref.to_string();
        tokio::spawn(async move {
            inner.run(&spawned_id, &source, force_reindex).await;
        });

        info!(job_id, source_ref, "pipeline job enqueued");
        Ok(job_id)
    }

    pub async fn job(&self, id: &str) -> Result<Job, JobStoreError> {
        self.inner.jobs.get(id).await
    }

    pub async fn jobs(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError> {
        self.inner.jobs.list(filter).await
    }
}

impl PipelineInner {
    /// Run one job to a terminal state. All exits are through `succeeded`
    /// or an explicit failure capture; no job is left `running`.
    async fn run(&self, job_id: &str, source_ref: &str, force_reindex: bool) {
        if let Err(err) = self
            .jobs
            .update_status(job_id, JobStatus::Running, None)
            .await
        {
            error!(job_id, error = %err, "could not mark job running");
            return;
        }

        match self.execute(job_id, source_ref, force_reindex).await {
            Ok(()) => {
                if let Err(err) = self
                    .jobs
                    .update_status(job_id, JobStatus::Succeeded, None)
                    .await
                {
                    error!(job_id, error = %err, "could not mark job succeeded");
                }
            }
            Err(err) => {
                warn!(job_id, error = %err, "pipeline job failed");
                if let Err(store_err) = self
                    .jobs
                    .update_status(job_id, JobStatus::Failed, Some(err.to_string()))
                    .await
                {
                    error!(job_id, error = %store_err, "could not mark job failed");
                }
            }
        }
    }

    async fn execute(
        &self,
        job_id: &str,
        source_ref: &str,
        force_reindex: bool,
    ) -> Result<(), PipelineError> {
        // 1) Stable video identifier.
        let video_id = extract_video_id(source_ref).unwrap_or_else(|| source_ref.to_string());
        self.jobs.set_video_id(job_id, &video_id).await?;

        // 2) Transcript. Absence is fatal; missing segments only degrade.
        let transcript = self.transcripts.fetch(&video_id).await?;
        info!(
            job_id,
            video_id,
            chars = transcript.text.len(),
            timed = transcript.segments.is_some(),
            "transcript acquired"
        );

        // 3) Retrieval index. Failure degrades the job to no-retrieval.
        match self.build_index(&video_id, &transcript, force_reindex).await {
            Ok(Some(BuildOutcome::Built { chunk_count })) => {
                info!(job_id, video_id, chunk_count, "index built");
            }
            Ok(Some(BuildOutcome::Unchanged { chunk_count })) => {
                info!(job_id, video_id, chunk_count, "index unchanged");
            }
            Ok(None) => {
                warn!(job_id, video_id, "empty transcript; no index built");
            }
            Err(err) => {
                warn!(job_id, video_id, error = %err, "index build failed; continuing without retrieval");
            }
        }

        // 4) Text producers, each isolated.
        let mut sections = Vec::new();
        for producer in &self.producers {
            match producer.produce(&transcript.text).await {
                Ok(body) => sections.push(ArtifactSection {
                    title: producer.name().to_string(),
                    body,
                }),
                Err(err) => {
                    warn!(job_id, producer = producer.name(), error = %err, "text producer failed");
                }
            }
        }
        if sections.is_empty() {
            return Err(PipelineError::NoArtifact);
        }

        // 5) Export, falling back to the baseline renderer.
        let rendered = match self.exporter.render(&sections).await {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(job_id, error = %err, "preferred exporter failed; using plain-text baseline");
                PlainTextExporter::render_plain(&sections)
            }
        };

        // 6) Durable storage; the reference lands on the job record.
        let artifact_ref = self
            .artifacts
            .store(rendered.bytes, &rendered.content_type)
            .await?;
        self.jobs
            .add_artifact(job_id, &rendered.extension, &artifact_ref)
            .await?;
        info!(job_id, artifact_ref, "artifact stored");

        Ok(())
    }

    /// Chunk, embed, and publish the retrieval index for a video.
    ///
    /// Returns `Ok(None)` when the transcript yields no chunks at all.
    async fn build_index(
        &self,
        video_id: &str,
        transcript: &Transcript,
        force: bool,
    ) -> Result<Option<BuildOutcome>, IndexBuildError> {
        let chunks: Vec<Chunk> = match &transcript.segments {
            Some(segments) if !segments.is_empty() => {
                chunker::chunk_segments(segments, self.settings.chunk_char_limit)
            }
            _ => chunker::chunk_text(&transcript.text, self.settings.chunk_char_limit),
        };
        if chunks.is_empty() {
            return Ok(None);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_normalized(self.embedder.as_ref(), &texts).await?;
        let index = VideoIndex::new(
            video_id,
            transcript_hash(&transcript.text),
            self.embedder.dimension(),
            vectors,
            chunks,
        )?;
        Ok(Some(self.index_store.build(index, force).await?))
    }
}

/// Degrading failures inside the index-build step.
#[derive(Debug, Error, Diagnostic)]
enum IndexBuildError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),
}
