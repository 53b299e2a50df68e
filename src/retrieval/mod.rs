//! Dual-mode retrieval over a video's index.
//!
//! Semantic mode embeds the query and ranks chunks by inner-product
//! similarity; timestamp mode selects the chunk containing (or nearest to) a
//! point in time and expands a window of neighbors for context. Timestamp
//! results are positional, so their citations carry no score.
//!
//! A missing index yields an empty result set rather than an error; the chat
//! orchestrator treats that as "degrade to transcript-only grounding".

pub mod timestamp;

use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::chunker::Chunk;
use crate::embedder::{EmbedError, EmbeddingProvider, embed_normalized};
use crate::index::{IndexError, IndexStore, VideoIndex};

/// A reference from an answer back to a specific chunk.
///
/// `score` is similarity-based for semantic retrieval and `None` for
/// timestamp-window retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_index: usize,
    pub text: String,
    pub start_seconds: Option<f64>,
    pub end_seconds: Option<f64>,
    pub score: Option<f32>,
}

impl Citation {
    fn from_chunk(chunk: &Chunk, score: Option<f32>) -> Self {
        Self {
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
            start_seconds: chunk.start_seconds,
            end_seconds: chunk.end_seconds,
            score,
        }
    }
}

/// Failures during retrieval. Missing indices are not errors; they produce
/// empty results.
#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),
}

/// Query engine combining the index store with an embedding provider.
pub struct RetrievalEngine {
    index_store: Arc<IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl RetrievalEngine {
    pub fn new(index_store: Arc<IndexStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index_store,
            embedder,
        }
    }

    async fn load_or_empty(&self, video_id: &str) -> Result<Option<VideoIndex>, RetrievalError> {
        match self.index_store.load(video_id).await {
            Ok(index) => Ok(Some(index)),
            Err(IndexError::NotFound { .. }) => {
                debug!(video_id, "no index; retrieval degrades to empty");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Rank chunks by semantic similarity to the query text.
    pub async fn semantic(
        &self,
        video_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Citation>, RetrievalError> {
        let Some(index) = self.load_or_empty(video_id).await? else {
            return Ok(Vec::new());
        };
        let query_vectors = embed_normalized(self.embedder.as_ref(), &[query.to_string()]).await?;
        let results = index.search(&query_vectors[0], top_k.min(index.chunk_count()))?;
        Ok(results
            .into_iter()
            .map(|(idx, score)| Citation::from_chunk(&index.chunks[idx], Some(score)))
            .collect())
    }

    /// Select the chunk containing `t` (falling back to the nearest start)
    /// plus `window` neighbors on each side, clamped to valid indices.
    pub async fn by_timestamp(
        &self,
        video_id: &str,
        t: f64,
        window: usize,
    ) -> Result<Vec<Citation>, RetrievalError> {
        let Some(index) = self.load_or_empty(video_id).await? else {
            return Ok(Vec::new());
        };
        let chunks = &index.chunks;
        let anchor = match find_anchor(chunks, t) {
            Some(anchor) => anchor,
            None => return Ok(Vec::new()),
        };

        let first = anchor.saturating_sub(window);
        let last = (anchor + window).min(chunks.len().saturating_sub(1));
        Ok(chunks[first..=last]
            .iter()
            .map(|chunk| Citation::from_chunk(chunk, None))
            .collect())
    }
}

/// Index of the chunk whose `[start, end)` contains `t`, or the chunk with
/// the closest `start_seconds`. `None` when no chunk carries timing.
fn find_anchor(chunks: &[Chunk], t: f64) -> Option<usize> {
    if let Some(idx) = chunks.iter().position(|c| c.contains(t)) {
        return Some(idx);
    }
    chunks
        .iter()
        .enumerate()
        .filter_map(|(idx, chunk)| {
            chunk
                .start_seconds
                .map(|start| (idx, (start - t).abs()))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(idx, _)| idx)
}
