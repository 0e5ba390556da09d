//! Candidate scoring and ranking
//!
//! score = pref_sim, minus `avoid_sim * penalty` when `avoid_sim` exceeds the
//! avoidance threshold, times profile confidence, plus a small random jitter.

use crate::profile::PreferenceProfile;
use crate::similarity::cosine_similarity;
use crate::store::{Candidate, ProposalSummary};
use catalyst_common::config::RecommendationConfig;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

/// Tunable scoring constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    /// Avoidance similarity above which the penalty applies (strict)
    pub avoidance_threshold: f64,
    /// Multiplier on avoidance similarity when penalized
    pub avoidance_penalty: f64,
    /// Jitter is drawn from `[0, jitter_max)`
    pub jitter_max: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            avoidance_threshold: 0.6,
            avoidance_penalty: 0.5,
            jitter_max: 0.1,
        }
    }
}

impl From<&RecommendationConfig> for ScoringWeights {
    fn from(config: &RecommendationConfig) -> Self {
        Self {
            avoidance_threshold: config.avoidance_threshold,
            avoidance_penalty: config.avoidance_penalty,
            jitter_max: config.jitter_max,
        }
    }
}

/// A ranked proposal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecommendation {
    pub proposal_id: Uuid,
    pub proposal: ProposalSummary,
    /// Raw composite score, not clamped
    pub score: f64,
    pub preference_similarity: f64,
    pub avoidance_similarity: f64,
    pub confidence: f64,
}

/// Deterministic part of the score (everything but jitter)
pub fn base_score(
    preference_similarity: f64,
    avoidance_similarity: f64,
    confidence: f64,
    weights: &ScoringWeights,
) -> f64 {
    let mut score = preference_similarity;
    if avoidance_similarity > weights.avoidance_threshold {
        score -= avoidance_similarity * weights.avoidance_penalty;
    }
    score * confidence
}

/// Score candidates against a profile, most relevant first.
///
/// Candidates without a vector or without a resolvable proposal are skipped.
pub fn score_candidates<R: Rng + ?Sized>(
    candidates: Vec<Candidate>,
    profile: &PreferenceProfile,
    weights: &ScoringWeights,
    rng: &mut R,
) -> Vec<ScoredRecommendation> {
    let mut scored: Vec<ScoredRecommendation> = candidates
        .into_iter()
        .filter(|c| !c.vector.is_empty())
        .filter_map(|c| {
            let proposal = c.proposal?;

            let preference_similarity = cosine_similarity(&c.vector, &profile.preference_vector);
            let avoidance_similarity = profile
                .avoidance_vector
                .as_deref()
                .map(|avoid| cosine_similarity(&c.vector, avoid))
                .unwrap_or(0.0);

            let score = base_score(
                preference_similarity,
                avoidance_similarity,
                profile.confidence,
                weights,
            ) + jitter(rng, weights.jitter_max);

            Some(ScoredRecommendation {
                proposal_id: proposal.id,
                proposal,
                score,
                preference_similarity,
                avoidance_similarity,
                confidence: profile.confidence,
            })
        })
        .collect();

    sort_by_score(&mut scored);
    scored
}

/// Sort descending by score; NaN sorts last
pub fn sort_by_score(scored: &mut [ScoredRecommendation]) {
    scored.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (false, false) => b.score.total_cmp(&a.score),
        (nan_a, nan_b) => nan_a.cmp(&nan_b),
    });
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, max: f64) -> f64 {
    if max > 0.0 {
        rng.gen_range(0.0..max)
    } else {
        0.0
    }
}
