//! # Vidrag: Retrieval-grounded Chat over Video Transcripts
//!
//! Vidrag turns long-form video transcripts into a chunked, embedded,
//! per-video retrieval index and answers questions about the video with
//! citations back into the transcript timeline. A fail-soft pipeline
//! orchestrates the full flow from transcript acquisition to stored
//! artifacts (summaries, notes) produced by pluggable text producers.
//!
//! ## Core Concepts
//!
//! - **Transcript**: raw text plus optional timed segments from a
//!   [`transcript::TranscriptSource`]
//! - **Chunks**: timestamp-carrying slices produced by [`chunker`]
//! - **Index**: per-video L2-normalized vectors persisted atomically by
//!   [`index::IndexStore`], searched by flat inner-product scan
//! - **Retrieval**: semantic and timestamp-anchored lookup via
//!   [`retrieval::RetrievalEngine`]
//! - **Chat**: the [`chat::GroundedChat`] degradation ladder, which always
//!   returns an answer
//! - **Pipeline**: background jobs in [`pipeline::Pipeline`] that isolate
//!   step failures so partial output still ships
//!
//! ## Chunking and Searching
//!
//! ```
//! use vidrag::chunker;
//! use vidrag::transcript::TranscriptSegment;
//!
//! let segments = vec![
//!     TranscriptSegment::new("welcome to the talk", 0.0, 5.0),
//!     TranscriptSegment::new("today we cover retrieval", 5.0, 6.0),
//! ];
//! let chunks = chunker::chunk_segments(&segments, 800);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].start_seconds, Some(0.0));
//! assert_eq!(chunks[0].end_seconds, Some(11.0));
//! ```
//!
//! ## Embedding without a Model Server
//!
//! [`embedder::HashEmbeddingProvider`] gives a deterministic local
//! embedding, useful for tests and offline operation:
//!
//! ```
//! use vidrag::embedder::{EmbeddingProvider, HashEmbeddingProvider, embed_normalized};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let provider = HashEmbeddingProvider::default();
//! let vectors = embed_normalized(&provider, &["hello world".to_string()])
//!     .await
//!     .unwrap();
//! assert_eq!(vectors[0].len(), provider.dimension());
//! let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
//! assert!((norm - 1.0).abs() < 1e-5);
//! # });
//! ```

pub mod backends;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod index;
pub mod pipeline;
pub mod retrieval;
pub mod transcript;

pub use backends::{BackendKind, BackendRegistry, GenerationBackend};
pub use chat::{ChatRequest, ChatResponse, GroundedChat};
pub use chunker::Chunk;
pub use config::Settings;
pub use embedder::EmbeddingProvider;
pub use index::{IndexStore, VideoIndex};
pub use pipeline::{Job, JobStatus, Pipeline};
pub use retrieval::{Citation, RetrievalEngine};
pub use transcript::{Transcript, TranscriptSource};
