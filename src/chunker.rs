//! Transcript chunking.
//!
//! Chunks are the retrieval unit: bounded spans of transcript text with
//! optional start/end timing. Segment-aware chunking never splits a source
//! segment, so chunk time ranges are monotonically increasing and
//! non-overlapping. When timing is unavailable the fallback slices raw text
//! greedily at the character limit with no time metadata.
//!
//! Both paths are deterministic for identical input and limit.

use serde::{Deserialize, Serialize};

use crate::transcript::TranscriptSegment;

/// Bounded span of transcript text, the unit of retrieval.
///
/// `start_seconds`/`end_seconds` are present only for segment-aware chunks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_index: usize,
    pub text: String,
    pub start_seconds: Option<f64>,
    pub end_seconds: Option<f64>,
}

impl Chunk {
    /// Whether `t` falls inside this chunk's `[start, end)` range.
    pub fn contains(&self, t: f64) -> bool {
        match (self.start_seconds, self.end_seconds) {
            (Some(start), Some(end)) => t >= start && t < end,
            _ => false,
        }
    }
}

/// Split timed segments into chunks of at most `char_limit` characters.
///
/// Segment texts are accumulated in order and flushed when adding the next
/// segment would exceed the limit. A single segment longer than the limit is
/// emitted alone rather than split. Empty input yields an empty list.
pub fn chunk_segments(segments: &[TranscriptSegment], char_limit: usize) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut acc: Vec<&str> = Vec::new();
    let mut acc_len = 0usize;
    let mut current_start: Option<f64> = None;
    let mut last_end: Option<f64> = None;

    let mut flush = |acc: &mut Vec<&str>,
                     acc_len: &mut usize,
                     start: &mut Option<f64>,
                     end: Option<f64>,
                     chunks: &mut Vec<Chunk>| {
        if acc.is_empty() {
            return;
        }
        chunks.push(Chunk {
            chunk_index: chunks.len(),
            text: acc.join(" "),
            start_seconds: *start,
            end_seconds: end,
        });
        acc.clear();
        *acc_len = 0;
        *start = None;
    };

    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        let joiner = usize::from(!acc.is_empty());
        if acc_len + text.chars().count() + joiner > char_limit {
            flush(&mut acc, &mut acc_len, &mut current_start, last_end, &mut chunks);
        }
        if current_start.is_none() {
            current_start = Some(segment.start_seconds);
        }
        acc_len += text.chars().count() + usize::from(!acc.is_empty());
        acc.push(text);
        last_end = Some(segment.end_seconds());
    }
    flush(&mut acc, &mut acc_len, &mut current_start, last_end, &mut chunks);

    chunks
}

/// Greedy fixed-size slicing of raw text at the character limit.
///
/// Produces chunks with no time metadata. Empty input yields an empty list.
pub fn chunk_text(text: &str, char_limit: usize) -> Vec<Chunk> {
    if text.is_empty() || char_limit == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + char_limit).min(chars.len());
        let slice: String = chars[start..end].iter().collect();
        let trimmed = slice.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                chunk_index: chunks.len(),
                text: trimmed.to_string(),
                start_seconds: None,
                end_seconds: None,
            });
        }
        start = end;
    }
    chunks
}
