//! Cosine similarity over fingerprints.
//!
//! Convention: a zero-norm operand (or a length mismatch) has similarity 0,
//! so a degraded fingerprint can never clear a duplicate threshold.

/// Cosine similarity in [-1, 1]; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_finite() {
        sim.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Cosine distance, `1 - similarity`, matching pgvector's `<=>` operator.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// Convert a distance reported by the index into a similarity.
///
/// Non-finite distances (pgvector yields NaN for zero vectors) map to 0.
pub fn similarity_from_distance(distance: f64) -> f64 {
    if distance.is_finite() {
        1.0 - distance
    } else {
        0.0
    }
}

/// True when every component is zero or the vector is empty.
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}
