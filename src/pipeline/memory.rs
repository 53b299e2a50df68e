//! In-memory collaborator implementations, used in tests and small
//! single-process deployments.

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use super::{ArtifactStore, ArtifactStoreError, Job, JobFilter, JobStatus, JobStore, JobStoreError};

/// Job metadata store backed by a process-local map.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<FxHashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<(), JobStoreError> {
        self.jobs.lock().insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Job, JobStoreError> {
        self.jobs
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| JobStoreError::NotFound { id: id.to_string() })
    }

    async fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobStoreError::NotFound { id: id.to_string() })?;
        if !job.status.can_transition(status) {
            return Err(JobStoreError::IllegalTransition {
                from: job.status,
                to: status,
            });
        }
        job.status = status;
        job.error = error;
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn set_video_id(&self, id: &str, video_id: &str) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobStoreError::NotFound { id: id.to_string() })?;
        job.video_id = Some(video_id.to_string());
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn add_artifact(
        &self,
        id: &str,
        kind: &str,
        artifact_ref: &str,
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| JobStoreError::NotFound { id: id.to_string() })?;
        job.artifact_refs
            .insert(kind.to_string(), artifact_ref.to_string());
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.lock();
        let mut matched: Vec<Job> = jobs
            .values()
            .filter(|job| match &filter.video_id {
                Some(video_id) => job.video_id.as_deref() == Some(video_id.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        // Newest first; id breaks created_at ties for a stable order.
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }
}

/// Artifact bytes held in a process-local map keyed by generated reference.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<FxHashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn store(
        &self,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, ArtifactStoreError> {
        let artifact_ref = Uuid::new_v4().to_string();
        self.artifacts.lock().insert(artifact_ref.clone(), bytes);
        Ok(artifact_ref)
    }

    async fn retrieve(&self, artifact_ref: &str) -> Result<Vec<u8>, ArtifactStoreError> {
        self.artifacts
            .lock()
            .get(artifact_ref)
            .cloned()
            .ok_or_else(|| ArtifactStoreError::NotFound {
                artifact_ref: artifact_ref.to_string(),
            })
    }
}
