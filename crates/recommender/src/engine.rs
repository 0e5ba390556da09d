//! Recommendation orchestration
//!
//! Flow: swipe collections -> liked/disliked ids -> preference profile ->
//! candidate search (over-fetched) -> scoring -> truncate to limit.

use crate::profile::ProfileBuilder;
use crate::scorer::{score_candidates, ScoredRecommendation, ScoringWeights};
use crate::search::CandidateSearch;
use crate::store::{BookmarkSource, EmbeddingRepository};
use catalyst_common::config::RecommendationConfig;
use catalyst_common::db::models::{Vote, PROPOSAL_ENTITY};
use catalyst_common::errors::Result;
use catalyst_common::metrics;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Inputs for one recommendation computation
#[derive(Debug, Clone, Default)]
pub struct RecommendationRequest {
    /// Collection holding right swipes (vote = yes)
    pub liked_collection: Option<Uuid>,
    /// Collection holding left swipes (vote = no)
    pub disliked_collection: Option<Uuid>,
    pub exclude_ids: Vec<Uuid>,
    pub exclude_slugs: Vec<String>,
    pub limit: usize,
}

/// Recommendation engine shared across requests
#[derive(Clone)]
pub struct RecommendationEngine {
    bookmarks: Arc<dyn BookmarkSource>,
    profiles: ProfileBuilder,
    search: CandidateSearch,
    weights: ScoringWeights,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(
        embeddings: Arc<dyn EmbeddingRepository>,
        bookmarks: Arc<dyn BookmarkSource>,
        config: RecommendationConfig,
    ) -> Self {
        Self::with_entity_type(embeddings, bookmarks, config, PROPOSAL_ENTITY)
    }

    /// Engine over embeddings tagged with a custom entity type
    pub fn with_entity_type(
        embeddings: Arc<dyn EmbeddingRepository>,
        bookmarks: Arc<dyn BookmarkSource>,
        config: RecommendationConfig,
        entity_type: &str,
    ) -> Self {
        let profiles = ProfileBuilder::new(
            embeddings.clone(),
            entity_type,
            config.embedding_field.clone(),
            config.confidence_saturation,
        );
        let search = CandidateSearch::new(
            embeddings,
            entity_type,
            config.embedding_field.clone(),
            config.candidate_threshold,
        );

        Self {
            bookmarks,
            profiles,
            search,
            weights: ScoringWeights::from(&config),
            config,
        }
    }

    /// Ranked proposals for the swipe history in `request`
    pub async fn get_recommended_proposals(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<ScoredRecommendation>> {
        let mut rng = StdRng::from_entropy();
        self.recommend_with_rng(request, &mut rng).await
    }

    /// Same as [`Self::get_recommended_proposals`] with a caller-supplied RNG
    #[instrument(skip(self, request, rng), fields(limit = request.limit))]
    pub async fn recommend_with_rng<R: Rng + Send + ?Sized>(
        &self,
        request: &RecommendationRequest,
        rng: &mut R,
    ) -> Result<Vec<ScoredRecommendation>> {
        let start = Instant::now();

        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let liked_ids = self.collection_ids(request.liked_collection, Vote::Yes).await?;
        let disliked_ids = self
            .collection_ids(request.disliked_collection, Vote::No)
            .await?;

        let Some(profile) = self.profiles.build(&liked_ids, &disliked_ids).await? else {
            debug!("No preference signal, returning no recommendations");
            metrics::record_recommendation(start.elapsed().as_secs_f64(), "no_signal", 0, 0);
            return Ok(Vec::new());
        };

        let candidates = self
            .search
            .find(
                &profile.preference_vector,
                request.limit.saturating_mul(self.config.overfetch_factor.max(1)),
                &request.exclude_ids,
                &request.exclude_slugs,
            )
            .await?;
        let candidate_count = candidates.len();

        let mut ranked = score_candidates(candidates, &profile, &self.weights, rng);
        ranked.truncate(request.limit);

        metrics::record_recommendation(
            start.elapsed().as_secs_f64(),
            "ranked",
            candidate_count,
            ranked.len(),
        );
        info!(
            liked = profile.liked_count,
            disliked = profile.disliked_count,
            confidence = profile.confidence,
            candidates = candidate_count,
            returned = ranked.len(),
            "Computed recommendations"
        );

        Ok(ranked)
    }

    /// Decorate externally ranked search results with recommendation scores.
    ///
    /// Results are returned unchanged when there is no recommendation signal.
    pub async fn enhance_search_results(
        &self,
        results: Vec<Map<String, Value>>,
        liked_collection: Option<Uuid>,
        disliked_collection: Option<Uuid>,
    ) -> Result<Vec<Map<String, Value>>> {
        let mut rng = StdRng::from_entropy();
        self.enhance_with_rng(results, liked_collection, disliked_collection, &mut rng)
            .await
    }

    /// Same as [`Self::enhance_search_results`] with a caller-supplied RNG
    pub async fn enhance_with_rng<R: Rng + Send + ?Sized>(
        &self,
        mut results: Vec<Map<String, Value>>,
        liked_collection: Option<Uuid>,
        disliked_collection: Option<Uuid>,
        rng: &mut R,
    ) -> Result<Vec<Map<String, Value>>> {
        let request = RecommendationRequest {
            liked_collection,
            disliked_collection,
            limit: results.len() + self.config.enhance_headroom,
            ..Default::default()
        };

        let recommendations = self.recommend_with_rng(&request, rng).await?;
        if recommendations.is_empty() {
            return Ok(results);
        }

        let scores: HashMap<Uuid, f64> = recommendations
            .iter()
            .map(|r| (r.proposal_id, r.score))
            .collect();

        apply_ai_scores(&mut results, &scores, self.config.search_boost);
        Ok(results)
    }
}

impl RecommendationEngine {
    async fn collection_ids(&self, collection: Option<Uuid>, vote: Vote) -> Result<Vec<Uuid>> {
        match collection {
            Some(id) => self.bookmarks.proposal_ids(id, vote).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Set `ai_score` on every result and boost `ranking_total` of scored ones.
///
/// A result whose string `id` parses to a scored proposal id gets
/// `ai_score = score` and `ranking_total += score * boost`; every other result
/// gets `ai_score = 0` with `ranking_total` untouched.
pub fn apply_ai_scores(results: &mut [Map<String, Value>], scores: &HashMap<Uuid, f64>, boost: f64) {
    for result in results.iter_mut() {
        let score = result
            .get("id")
            .and_then(result_id)
            .and_then(|id| scores.get(&id).copied());

        match score {
            Some(score) => {
                let total = result.get("ranking_total").and_then(numeric).unwrap_or(0.0)
                    + score * boost;

                if let Some(n) = Number::from_f64(score) {
                    result.insert("ai_score".to_string(), Value::Number(n));
                }
                if let Some(n) = Number::from_f64(total) {
                    result.insert("ranking_total".to_string(), Value::Number(n));
                }
            }
            None => {
                result.insert("ai_score".to_string(), Value::from(0));
            }
        }
    }
}

/// Numbers, or strings holding a number
fn numeric(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

fn result_id(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s.trim()).ok())
}
