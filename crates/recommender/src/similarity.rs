//! Vector math for preference profiles
//!
//! Embeddings are stored as `f32`; similarities and centroid sums are
//! accumulated in `f64`.

use tracing::warn;

/// Cosine similarity of two vectors in [-1, 1].
///
/// Returns 0.0 when the lengths differ, either vector is empty, or either
/// vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Element-wise mean of a set of vectors.
///
/// The dimension is taken from the first vector; vectors of any other
/// length are skipped. Returns `None` for an empty input.
pub fn centroid(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dimension = first.len();

    let mut sums = vec![0.0f64; dimension];
    let mut used = 0usize;

    for vector in vectors {
        if vector.len() != dimension {
            warn!(
                expected = dimension,
                actual = vector.len(),
                "Skipping embedding with mismatched dimension"
            );
            continue;
        }
        for (sum, &value) in sums.iter_mut().zip(vector) {
            *sum += f64::from(value);
        }
        used += 1;
    }

    let count = used as f64;
    Some(sums.into_iter().map(|sum| (sum / count) as f32).collect())
}

/// Profile confidence: `min(liked_count / saturation, 1)`.
///
/// A non-positive saturation means any signal is full confidence.
pub fn confidence(liked_count: usize, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return if liked_count > 0 { 1.0 } else { 0.0 };
    }
    (liked_count as f64 / saturation).min(1.0)
}
