//! Vector similarity helpers for backends that rank in-process.

/// Cosine similarity of two vectors.
///
/// Returns `None` when either vector is empty or has zero norm, when the
/// dimensions differ, or when the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    score.is_finite().then_some(score)
}

/// Sort key for a similarity; unrankable pairs sort last.
pub fn rank_score(score: Option<f32>) -> f32 {
    score.unwrap_or(f32::NEG_INFINITY)
}
