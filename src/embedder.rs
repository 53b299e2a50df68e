//! Embedding providers.
//!
//! Maps text to fixed-dimension vectors behind the [`EmbeddingProvider`]
//! seam. Normalization is applied by [`embed_normalized`] after inference
//! rather than assumed from the model, so every vector entering the index
//! satisfies the unit-norm invariant regardless of provider.

use std::hash::Hasher;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Epsilon guarding against division by zero on all-zero vectors.
const NORM_EPSILON: f32 = 1e-12;

/// Failures surfaced by embedding providers.
#[derive(Debug, Error, Diagnostic)]
pub enum EmbedError {
    /// The embedding backend cannot be reached or refused the request.
    #[error("embedding provider {provider} unavailable: {message}")]
    #[diagnostic(
        code(vidrag::embed::unavailable),
        help("Check that the embedding service is running and reachable.")
    )]
    Unavailable { provider: String, message: String },

    /// The provider returned a vector of unexpected length.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    #[diagnostic(code(vidrag::embed::dimension_mismatch))]
    DimensionMismatch { expected: usize, got: usize },

    /// The provider returned a different number of vectors than texts.
    #[error("embedding count mismatch: sent {sent} texts, received {received} vectors")]
    #[diagnostic(code(vidrag::embed::count_mismatch))]
    CountMismatch { sent: usize, received: usize },
}

/// Capability to map batches of text to fixed-dimension vectors.
///
/// Implementations must be deterministic: embedding the same text twice with
/// the same model yields the same (or near-identical) vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Fixed output dimension of this provider.
    fn dimension(&self) -> usize;

    /// Stable identifier (model name) for logging and index metadata.
    fn id(&self) -> &str;
}

/// L2-normalize a vector in place (`v / (||v|| + eps)`).
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt() + NORM_EPSILON;
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

/// Embed a batch and enforce the dimension and unit-norm invariants.
pub async fn embed_normalized(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut vectors = provider.embed(texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::CountMismatch {
            sent: texts.len(),
            received: vectors.len(),
        });
    }
    for vector in &mut vectors {
        if vector.len() != provider.dimension() {
            return Err(EmbedError::DimensionMismatch {
                expected: provider.dimension(),
                got: vector.len(),
            });
        }
        l2_normalize(vector);
    }
    Ok(vectors)
}

/// Deterministic local provider projecting token hashes into a fixed space.
///
/// Not a semantic model: it exists for offline operation and reproducible
/// tests. Identical texts always produce identical vectors, and texts
/// sharing vocabulary land near each other, which is enough to exercise the
/// retrieval path end to end.
#[derive(Clone, Debug)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub const DEFAULT_DIMENSION: usize = 384;

    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = FxHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn id(&self) -> &str {
        "hash-projection"
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Remote embedding provider speaking the Ollama `/api/embed` shape.
#[derive(Clone, Debug)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            dimension,
        }
    }

    fn unavailable(&self, message: impl Into<String>) -> EmbedError {
        EmbedError::Unavailable {
            provider: self.model.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|err| self.unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(self.unavailable(format!("status {}", response.status())));
        }
        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|err| self.unavailable(err.to_string()))?;
        Ok(parsed.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn vectors_are_unit_norm_after_normalization() {
        let provider = HashEmbeddingProvider::new(64);
        let texts = vec!["alpha beta gamma".to_string(), "delta".to_string()];
        let vectors = embed_normalized(&provider, &texts).await.unwrap();
        for v in &vectors {
            assert!((norm(v) - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let provider = HashEmbeddingProvider::default();
        let texts = vec!["recursion base case".to_string()];
        let a = provider.embed(&texts).await.unwrap();
        let b = provider.embed(&texts).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn all_zero_vector_survives_normalization() {
        let provider = HashEmbeddingProvider::new(16);
        // No alphanumeric tokens, so the raw vector is all zeros.
        let texts = vec!["!!! ???".to_string()];
        let vectors = embed_normalized(&provider, &texts).await.unwrap();
        assert!(vectors[0].iter().all(|x| x.is_finite()));
        assert!(norm(&vectors[0]) < 1e-6);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_typed() {
        struct BadProvider;

        #[async_trait]
        impl EmbeddingProvider for BadProvider {
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
                Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
            }
            fn dimension(&self) -> usize {
                3
            }
            fn id(&self) -> &str {
                "bad"
            }
        }

        let err = embed_normalized(&BadProvider, &["x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[tokio::test]
    async fn http_provider_reports_unavailable() {
        // Nothing listens on this port.
        let provider = HttpEmbeddingProvider::new("http://127.0.0.1:9", "mini", 8);
        let err = provider.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::Unavailable { .. }));
    }
}
