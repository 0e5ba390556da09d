//! Catalyst Explorer Recommendation Engine
//!
//! Ranks funding proposals for a user from their swipe history:
//! - Preference profile: centroids of liked and disliked proposal embeddings
//! - Candidate search: nearest neighbors of the preference centroid
//! - Scoring: preference similarity, avoidance penalty, confidence, jitter
//! - Search enhancement: boosts externally ranked search results
//! - Coverage: share of proposals with a `combined` embedding

pub mod coverage;
pub mod engine;
pub mod profile;
pub mod scorer;
pub mod search;
pub mod similarity;
pub mod store;

pub use coverage::{CoverageRating, EmbeddingCoverage};
pub use engine::{apply_ai_scores, RecommendationEngine, RecommendationRequest};
pub use profile::{PreferenceProfile, ProfileBuilder};
pub use scorer::{ScoredRecommendation, ScoringWeights};
pub use search::CandidateSearch;
pub use store::{
    BookmarkSource, Candidate, EmbeddingRepository, InMemoryStore, NeighborQuery, PgStore,
    ProposalSummary, StoredVector,
};
