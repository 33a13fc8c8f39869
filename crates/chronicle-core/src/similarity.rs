//! ============================================================================
//! Similarity Primitives - cosine similarity and recency decay
//! ============================================================================

use chrono::{DateTime, Utc};

/// Default half-life for recency weighting
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 30.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Cosine similarity between two vectors.
///
/// Mismatched lengths and zero-norm inputs score 0.0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
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
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Exponential recency weight: 1.0 now, 0.5 after one half-life.
///
/// Returns `None` when the timestamp is missing or the half-life is not
/// positive. Future timestamps count as age zero.
pub fn recency_decay(
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> Option<f32> {
    let timestamp = timestamp?;
    if !(half_life_days > 0.0) {
        return None;
    }

    let age_days = ((now - timestamp).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    Some((-std::f64::consts::LN_2 * age_days / half_life_days).exp() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cosine_identity_and_orthogonal() {
        let v = vec![0.3, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = vec![0.1, 0.7, -0.2, 0.5];
        let b = vec![0.9, -0.3, 0.4, 0.05];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_recency_half_life() {
        let now = Utc::now();
        let fresh = recency_decay(Some(now), now, 30.0).unwrap();
        let month = recency_decay(Some(now - Duration::days(30)), now, 30.0).unwrap();
        let two_months = recency_decay(Some(now - Duration::days(60)), now, 30.0).unwrap();

        assert!((fresh - 1.0).abs() < 1e-6);
        assert!((month - 0.5).abs() < 1e-4);
        assert!((two_months - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_recency_edge_cases() {
        let now = Utc::now();
        assert_eq!(recency_decay(None, now, 30.0), None);
        assert_eq!(recency_decay(Some(now), now, 0.0), None);
        let future = recency_decay(Some(now + Duration::days(3)), now, 30.0).unwrap();
        assert!((future - 1.0).abs() < 1e-6);
    }
}
