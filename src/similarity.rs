//! Pluggable similarity scoring for free-text search.

/// An embedding-based similarity collaborator.
///
/// Implementations turn text into vectors; the default
/// [`similarity`](Self::similarity) compares them by cosine. Embedding
/// must be synchronous: discovery calls it while holding the registry's
/// read lock.
pub trait Similarity: Send + Sync {
    /// Embeds `text` as a vector.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Scores two embeddings in [0, 1].
    fn similarity(&self, a: &[f32], b: &[f32]) -> f64 {
        cosine_similarity(a, b).max(0.0)
    }
}

/// Cosine similarity of two vectors.
///
/// Returns 0 for empty, mismatched, or zero-length vectors.
///
/// # Examples
///
/// ```
/// use agentmesh::cosine_similarity;
///
/// assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
/// ```
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
