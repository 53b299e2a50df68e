//! Per-video vector index.
//!
//! A [`VideoIndex`] owns exactly one flat vector table and one ordered chunk
//! metadata list for a video, plus the transcript content hash that drives
//! re-index skipping. The index is replaced wholesale on rebuild; there is
//! no partial update path.
//!
//! Search is flat inner product over L2-normalized vectors, which
//! approximates cosine similarity. Ties are broken by lowest chunk index so
//! result ordering is reproducible.

mod store;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::chunker::Chunk;

pub use store::{BuildOutcome, IndexStatus, IndexStore};

/// Failures in index construction, persistence, and search.
#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    /// No index has been built for this video.
    #[error("no index found for video {video_id}")]
    #[diagnostic(
        code(vidrag::index::not_found),
        help("Run the pipeline (or an explicit re-index) for this video first.")
    )]
    NotFound { video_id: String },

    /// Vector table and chunk metadata disagree in length.
    #[error("corrupted index for video {video_id}: {vectors} vectors vs {chunks} chunks")]
    #[diagnostic(
        code(vidrag::index::corrupted),
        help("Force a rebuild; partial indices are never valid.")
    )]
    Corrupted {
        video_id: String,
        vectors: usize,
        chunks: usize,
    },

    /// Query or stored vector has the wrong dimension.
    #[error("vector dimension mismatch: index has {expected}, got {got}")]
    #[diagnostic(code(vidrag::index::dimension_mismatch))]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index i/o error: {0}")]
    #[diagnostic(code(vidrag::index::io))]
    Io(#[from] std::io::Error),

    #[error("index serialization error: {0}")]
    #[diagnostic(code(vidrag::index::serde))]
    Serde(#[from] serde_json::Error),
}

/// One video's similarity index with its chunk metadata sidecar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoIndex {
    pub video_id: String,
    pub transcript_hash: String,
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
    pub chunks: Vec<Chunk>,
}

impl VideoIndex {
    /// Assemble an index, enforcing the vector/metadata parity invariant.
    pub fn new(
        video_id: impl Into<String>,
        transcript_hash: impl Into<String>,
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<Chunk>,
    ) -> Result<Self, IndexError> {
        let video_id = video_id.into();
        if vectors.len() != chunks.len() {
            return Err(IndexError::Corrupted {
                video_id,
                vectors: vectors.len(),
                chunks: chunks.len(),
            });
        }
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    got: vector.len(),
                });
            }
        }
        Ok(Self {
            video_id,
            transcript_hash: transcript_hash.into(),
            dimension,
            vectors,
            chunks,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Inner-product search returning the `k` best `(chunk_index, score)`
    /// pairs, highest score first, ties broken by lowest chunk index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| {
                let score: f32 = vector.iter().zip(query).map(|(a, b)| a * b).sum();
                (idx, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Verify parity after deserialization; loaded files are untrusted.
    fn validate(self) -> Result<Self, IndexError> {
        if self.vectors.len() != self.chunks.len() {
            return Err(IndexError::Corrupted {
                video_id: self.video_id,
                vectors: self.vectors.len(),
                chunks: self.chunks.len(),
            });
        }
        Ok(self)
    }
}

/// Content hash of a transcript, used to skip unchanged re-indexing.
pub fn transcript_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
