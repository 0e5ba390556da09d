//! Embedding coverage diagnostics
//!
//! Recommendations only reach proposals that have a `combined` embedding,
//! so operators watch what share of the catalogue is covered.

use serde::Serialize;

/// Coverage above this percentage is rated good
pub const GOOD_COVERAGE_PERCENT: f64 = 50.0;

/// Coverage above this percentage is rated moderate
pub const MODERATE_COVERAGE_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageRating {
    Good,
    Moderate,
    Poor,
}

impl CoverageRating {
    pub fn from_percent(percent: f64) -> Self {
        if percent > GOOD_COVERAGE_PERCENT {
            CoverageRating::Good
        } else if percent > MODERATE_COVERAGE_PERCENT {
            CoverageRating::Moderate
        } else {
            CoverageRating::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingCoverage {
    pub total_proposals: u64,
    pub proposals_with_embeddings: u64,
    /// Rounded to two decimals
    pub coverage_percentage: f64,
    pub status: CoverageRating,
    pub advice: Vec<&'static str>,
}

impl EmbeddingCoverage {
    pub fn new(total_proposals: u64, proposals_with_embeddings: u64) -> Self {
        let percent = if total_proposals == 0 {
            0.0
        } else {
            proposals_with_embeddings as f64 / total_proposals as f64 * 100.0
        };

        let advice = if percent < GOOD_COVERAGE_PERCENT {
            vec![
                "Consider running embedding generation for more proposals",
                "AI recommendations work best with 50%+ embedding coverage",
            ]
        } else {
            vec!["Good embedding coverage for AI recommendations"]
        };

        Self {
            total_proposals,
            proposals_with_embeddings,
            coverage_percentage: (percent * 100.0).round() / 100.0,
            status: CoverageRating::from_percent(percent),
            advice,
        }
    }
}
