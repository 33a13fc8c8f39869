//! Maximal Marginal Relevance selection.
//!
//! Greedily picks the candidate maximizing
//! `λ·sim(candidate, query) − (1−λ)·max sim(candidate, already picked)`.

use crate::similarity::cosine_similarity;

/// Relevance/diversity trade-off used by the graph index
pub const DEFAULT_MMR_LAMBDA: f32 = 0.7;

/// Select up to `k` candidate positions in pick order.
pub fn mmr_select(query: &[f32], candidates: &[&[f32]], k: usize, lambda: f32) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(c, query))
        .collect();

    // Highest similarity to anything selected so far, per candidate
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut picked = vec![false; candidates.len()];
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for i in 0..candidates.len() {
            if picked[i] {
                continue;
            }
            let penalty = if selected.is_empty() { 0.0 } else { redundancy[i] };
            let score = lambda * relevance[i] - (1.0 - lambda) * penalty;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((chosen, _)) = best else { break };
        picked[chosen] = true;
        selected.push(chosen);

        for i in 0..candidates.len() {
            if !picked[i] {
                let sim = cosine_similarity(candidates[i], candidates[chosen]);
                redundancy[i] = redundancy[i].max(sim);
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lambda_one_is_similarity_ranking() {
        let query = vec![1.0, 0.0];
        let a = vec![0.2, 1.0];
        let b = vec![1.0, 0.05];
        let c = vec![1.0, 0.5];
        let d = vec![1.0, 0.06];
        let candidates: Vec<&[f32]> = vec![&a, &b, &c, &d];

        assert_eq!(mmr_select(&query, &candidates, 4, 1.0), vec![1, 3, 2, 0]);
        assert_eq!(mmr_select(&query, &candidates, 2, 1.0), vec![1, 3]);
    }

    #[test]
    fn test_diversity_skips_near_duplicate() {
        let query = vec![1.0, 0.0];
        let best = vec![1.0, 0.1];
        let duplicate = vec![1.0, 0.11];
        let different = vec![0.8, -0.6];
        let candidates: Vec<&[f32]> = vec![&best, &duplicate, &different];

        let picks = mmr_select(&query, &candidates, 2, 0.5);
        assert_eq!(picks, vec![0, 2]);
    }

    #[test]
    fn test_identical_candidates_bounded_by_k_and_count() {
        let query = vec![0.3, 0.7];
        let same = vec![1.0, 1.0];
        let candidates: Vec<&[f32]> = vec![&same, &same, &same];

        let picks = mmr_select(&query, &candidates, 2, DEFAULT_MMR_LAMBDA);
        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0], 0);

        let all = mmr_select(&query, &candidates, 10, DEFAULT_MMR_LAMBDA);
        assert_eq!(all.len(), 3);
        let mut sorted = all.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(mmr_select(&[1.0], &[], 3, 0.7).is_empty());
        let v = vec![1.0];
        assert!(mmr_select(&[1.0], &[&v], 0, 0.7).is_empty());
    }
}
