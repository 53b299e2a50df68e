//! End-to-end retrieval over a chunked, embedded transcript index.

mod common;

use std::sync::Arc;

use tempfile::TempDir;

use common::{build_index_for, timed_transcript};
use vidrag::embedder::{EmbeddingProvider, HashEmbeddingProvider};
use vidrag::index::{BuildOutcome, IndexStore, transcript_hash};
use vidrag::retrieval::RetrievalEngine;
use vidrag::{Transcript, VideoIndex};

const VIDEO: &str = "dQw4w9WgXcQ";
const CHUNK_LIMIT: usize = 80;

async fn engine_with_index(dir: &TempDir) -> RetrievalEngine {
    let store = Arc::new(IndexStore::new(dir.path()));
    let embedder = Arc::new(HashEmbeddingProvider::default());
    build_index_for(
        &store,
        embedder.as_ref(),
        VIDEO,
        &timed_transcript(),
        CHUNK_LIMIT,
    )
    .await;
    RetrievalEngine::new(store, embedder)
}

#[tokio::test]
async fn semantic_retrieval_ranks_on_topic_chunks_first() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with_index(&dir).await;

    let citations = engine
        .semantic(VIDEO, "how do I make the tomato pasta sauce", 3)
        .await
        .unwrap();
    assert_eq!(citations.len(), 3);
    assert!(citations[0].text.contains("sauce"));
    assert!(citations[0].score.unwrap() >= citations[1].score.unwrap());
    assert!(citations[1].score.unwrap() >= citations[2].score.unwrap());
}

#[tokio::test]
async fn timestamp_retrieval_anchors_on_containing_chunk() {
    let dir = TempDir::new().unwrap();
    let engine = engine_with_index(&dir).await;

    // 12 seconds falls inside the chunk starting at 10.0.
    let citations = engine.by_timestamp(VIDEO, 12.0, 1).await.unwrap();
    assert_eq!(citations.len(), 3);
    assert_eq!(citations[1].start_seconds, Some(10.0));
    assert!(citations.iter().all(|c| c.score.is_none()));

    // Window clamps at the start of the video.
    let head = engine.by_timestamp(VIDEO, 0.5, 2).await.unwrap();
    assert_eq!(head[0].chunk_index, 0);

    // And at the end: a far-future timestamp anchors on the last chunk and
    // only the in-range neighbors are returned.
    let all = engine.by_timestamp(VIDEO, 0.0, 100).await.unwrap();
    let last_index = all.last().unwrap().chunk_index;
    let tail = engine.by_timestamp(VIDEO, 999.0, 2).await.unwrap();
    assert_eq!(tail.len(), 3);
    assert_eq!(tail.last().unwrap().chunk_index, last_index);
    assert_eq!(tail[0].chunk_index, last_index - 2);
}

#[tokio::test]
async fn missing_index_degrades_to_empty_results() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(IndexStore::new(dir.path()));
    let engine = RetrievalEngine::new(store, Arc::new(HashEmbeddingProvider::default()));

    assert!(engine.semantic("nosuchvideo", "anything", 5).await.unwrap().is_empty());
    assert!(engine.by_timestamp("nosuchvideo", 10.0, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn rebuild_with_same_transcript_is_skipped() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(IndexStore::new(dir.path()));
    let embedder = HashEmbeddingProvider::default();
    let transcript = timed_transcript();

    let first = build_index_for(&store, &embedder, VIDEO, &transcript, CHUNK_LIMIT).await;
    let BuildOutcome::Built { chunk_count } = first else {
        panic!("first build should write the index");
    };
    assert!(chunk_count > 1);

    let second = build_index_for(&store, &embedder, VIDEO, &transcript, CHUNK_LIMIT).await;
    assert!(matches!(second, BuildOutcome::Unchanged { .. }));

    // A changed transcript replaces the index.
    let changed = Transcript::from_segments(
        timed_transcript()
            .segments
            .unwrap()
            .into_iter()
            .skip(1)
            .collect(),
    );
    let third = build_index_for(&store, &embedder, VIDEO, &changed, CHUNK_LIMIT).await;
    assert!(matches!(third, BuildOutcome::Built { .. }));
}

#[tokio::test]
async fn stored_vectors_are_unit_norm_and_match_chunks() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(IndexStore::new(dir.path()));
    let embedder = HashEmbeddingProvider::default();
    build_index_for(&store, &embedder, VIDEO, &timed_transcript(), CHUNK_LIMIT).await;

    let index = store.load(VIDEO).await.unwrap();
    assert_eq!(index.vectors.len(), index.chunks.len());
    for vector in &index.vectors {
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    // Chunks tile the timeline in order with non-overlapping spans.
    for pair in index.chunks.windows(2) {
        assert!(pair[0].end_seconds.unwrap() <= pair[1].start_seconds.unwrap());
        assert_eq!(pair[0].chunk_index + 1, pair[1].chunk_index);
    }
}

#[tokio::test]
async fn identical_query_and_chunk_text_scores_near_one() {
    let dir = TempDir::new().unwrap();
    let embedder = HashEmbeddingProvider::default();
    let transcript = timed_transcript();
    let store = Arc::new(IndexStore::new(dir.path()));
    build_index_for(&store, &embedder, VIDEO, &transcript, CHUNK_LIMIT).await;

    let index = store.load(VIDEO).await.unwrap();
    let exact = index.chunks[2].text.clone();
    let query =
        vidrag::embedder::embed_normalized(&embedder, &[exact]).await.unwrap();
    let hits = index.search(&query[0], 1).unwrap();
    assert_eq!(hits[0].0, 2);
    assert!((hits[0].1 - 1.0).abs() < 1e-4);
}

#[test]
fn transcript_hash_is_stable_and_content_sensitive() {
    let a = transcript_hash("same text");
    let b = transcript_hash("same text");
    let c = transcript_hash("different text");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn index_construction_rejects_vector_chunk_mismatch() {
    let embedder = HashEmbeddingProvider::default();
    let chunks = vidrag::chunker::chunk_text("short transcript body", 10);
    let err = VideoIndex::new(
        VIDEO,
        transcript_hash("short transcript body"),
        embedder.dimension(),
        Vec::new(),
        chunks,
    )
    .unwrap_err();
    assert!(matches!(err, vidrag::index::IndexError::Corrupted { .. }));
}
