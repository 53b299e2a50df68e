//! Filesystem persistence for per-video indices.
//!
//! One JSON document per video under the data directory. Publication is
//! write-temp-then-rename, so concurrent readers observe either the old
//! complete index or the new complete index, never a partial file. Builds
//! take a per-video advisory lock; reads never lock.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::chunker::Chunk;

use super::{IndexError, VideoIndex};

/// Result of a build request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A new index was written.
    Built { chunk_count: usize },
    /// An index with the same transcript hash already exists; nothing was
    /// touched on disk.
    Unchanged { chunk_count: usize },
}

/// Existence and size of a video's index, for the exposed status surface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub exists: bool,
    pub chunk_count: usize,
}

/// Store managing one index file per video id.
pub struct IndexStore {
    data_dir: PathBuf,
    locks: Mutex<FxHashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IndexStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    fn index_path(&self, video_id: &str) -> PathBuf {
        let safe: String = video_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.data_dir.join(format!("{safe}.index.json"))
    }

    fn lock_for(&self, video_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(video_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Persist an index atomically under its video id.
    ///
    /// Skips the write when an index with the same transcript hash already
    /// exists, unless `force` is set. The per-video lock makes builds
    /// single-writer; readers are unaffected because publication is a
    /// rename.
    pub async fn build(&self, index: VideoIndex, force: bool) -> Result<BuildOutcome, IndexError> {
        let video_id = index.video_id.clone();
        let lock = self.lock_for(&video_id);
        let _guard = lock.lock().await;

        if !force {
            match self.load(&video_id).await {
                Ok(existing) if existing.transcript_hash == index.transcript_hash => {
                    debug!(video_id, "transcript unchanged; skipping re-index");
                    return Ok(BuildOutcome::Unchanged {
                        chunk_count: existing.chunk_count(),
                    });
                }
                Ok(_) | Err(IndexError::NotFound { .. }) => {}
                // A corrupted index on disk is replaced by the rebuild.
                Err(IndexError::Corrupted { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.index_path(&video_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&index)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        info!(video_id, chunks = index.chunk_count(), "index published");
        Ok(BuildOutcome::Built {
            chunk_count: index.chunk_count(),
        })
    }

    /// Load a video's index, verifying the parity invariant.
    pub async fn load(&self, video_id: &str) -> Result<VideoIndex, IndexError> {
        let path = self.index_path(video_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(IndexError::NotFound {
                    video_id: video_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let index: VideoIndex = serde_json::from_slice(&bytes)?;
        index.validate()
    }

    /// Search a video's index. Missing index surfaces as [`IndexError::NotFound`].
    pub async fn search(
        &self,
        video_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(usize, f32)>, IndexError> {
        let index = self.load(video_id).await?;
        index.search(query, k)
    }

    /// Whether an index exists for the video, and how many chunks it holds.
    pub async fn status(&self, video_id: &str) -> Result<IndexStatus, IndexError> {
        match self.load(video_id).await {
            Ok(index) => Ok(IndexStatus {
                exists: true,
                chunk_count: index.chunk_count(),
            }),
            Err(IndexError::NotFound { .. }) => Ok(IndexStatus::default()),
            Err(err) => Err(err),
        }
    }

    /// All chunk metadata for a video, in index order.
    pub async fn chunks(&self, video_id: &str) -> Result<Vec<Chunk>, IndexError> {
        Ok(self.load(video_id).await?.chunks)
    }
}
