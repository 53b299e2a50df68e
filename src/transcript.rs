//! Transcript data model and the acquisition seam.
//!
//! Transcript acquisition is an external collaborator: the engine only
//! depends on the [`TranscriptSource`] trait and the shapes it returns.
//! Segments carry the source timing used for timestamp-aware chunking.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Atomic timed unit from the source transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            text: text.into(),
            start_seconds,
            duration_seconds,
        }
    }

    /// Exclusive end time of this segment.
    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }
}

/// A fetched transcript: full text plus timed segments when the source has
/// them. Missing segments degrade chunking to text-only mode; they are never
/// an error by themselves.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    pub text: String,
    pub segments: Option<Vec<TranscriptSegment>>,
}

impl Transcript {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            segments: None,
        }
    }

    /// Build a transcript from segments, deriving the joined text.
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            text,
            segments: Some(segments),
        }
    }
}

/// Failures surfaced by transcript collaborators.
#[derive(Debug, Error, Diagnostic)]
pub enum TranscriptError {
    /// The source has no transcript for this video.
    #[error("transcript unavailable for video {video_id}: {reason}")]
    #[diagnostic(
        code(vidrag::transcript::unavailable),
        help("The video may have no captions, or the source may be unreachable.")
    )]
    Unavailable { video_id: String, reason: String },
}

/// External transcript collaborator.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the transcript for a resolved video identifier.
    async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError>;
}

/// Extract the 11-character video identifier from a watch URL or a bare id.
///
/// Accepts `watch?v=`, `youtu.be/`, `/embed/`, `/shorts/` URLs and bare ids.
/// Returns `None` when no identifier can be found; callers decide whether to
/// fall back to using the raw reference as the key.
pub fn extract_video_id(reference: &str) -> Option<String> {
    fn grab(reference: &str, marker: &str) -> Option<String> {
        let at = reference.find(marker)? + marker.len();
        let id: String = reference[at..]
            .chars()
            .take(11)
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        (id.len() == 11).then_some(id)
    }

    for marker in ["v=", "youtu.be/", "/embed/", "/shorts/"] {
        if let Some(id) = grab(reference, marker) {
            return Some(id);
        }
    }

    let trimmed = reference.trim();
    if trimmed.len() == 11
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Some(trimmed.to_string());
    }
    None
}
