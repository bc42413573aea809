//! Maximal marginal relevance re-ranking.
//!
//! Given a query vector and a list of candidates (already ordered by the
//! store, nearest first), [`select`] greedily picks results that score well on
//!
//! ```text
//! lambda * sim(candidate, query) - (1 - lambda) * max(sim(candidate, picked))
//! ```
//!
//! where `sim` is cosine similarity. The first pick is the candidate most
//! similar to the query. Ties go to the earlier candidate.

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::vectorstore::cosine_similarity;

/// Default number of candidates fetched before re-ranking.
pub const DEFAULT_FETCH_K: usize = 20;

/// Default balance between relevance and diversity.
pub const DEFAULT_LAMBDA_MULT: f32 = 0.5;

/// Reject a `lambda_mult` outside `[0, 1]`.
pub fn validate_lambda(lambda_mult: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&lambda_mult) {
        return Err(RagError::ConfigError(format!(
            "lambda_mult ({lambda_mult}) must be between 0 and 1"
        )));
    }
    Ok(())
}

/// Pick up to `k` of `candidates` by maximal marginal relevance.
///
/// Results are returned in selection order and keep the distance score the
/// store assigned them. With `lambda_mult == 1.0` redundancy carries no
/// weight, so the store's own order is kept as is.
pub fn select(
    query: &[f32],
    candidates: Vec<SearchResult>,
    k: usize,
    lambda_mult: f32,
) -> Vec<SearchResult> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }
    if lambda_mult >= 1.0 {
        let mut candidates = candidates;
        candidates.truncate(k);
        return candidates;
    }

    let relevance: Vec<f32> =
        candidates.iter().map(|c| cosine_similarity(query, &c.chunk.embedding)).collect();

    let mut picked: Vec<usize> = Vec::with_capacity(k);
    // Highest similarity to anything picked so far, per candidate.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];

    let first = argmax(relevance.iter().copied().enumerate());
    picked.push(first);

    while picked.len() < k {
        let last = &candidates[picked[picked.len() - 1]].chunk.embedding;
        for (i, candidate) in candidates.iter().enumerate() {
            let sim = cosine_similarity(&candidate.chunk.embedding, last);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }

        let next = argmax(
            relevance
                .iter()
                .enumerate()
                .filter(|(i, _)| !picked.contains(i))
                .map(|(i, &rel)| (i, lambda_mult * rel - (1.0 - lambda_mult) * redundancy[i])),
        );
        picked.push(next);
    }

    let mut slots: Vec<Option<SearchResult>> = candidates.into_iter().map(Some).collect();
    picked.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Index of the first maximal score.
fn argmax(scores: impl Iterator<Item = (usize, f32)>) -> usize {
    let mut best: Option<(usize, f32)> = None;
    for (i, score) in scores {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i).unwrap_or(0)
}
