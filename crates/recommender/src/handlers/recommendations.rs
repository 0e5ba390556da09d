//! Recommendation handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use super::status_of;
use crate::AppState;
use catalyst_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
};
use catalyst_recommender::{RecommendationRequest, ScoredRecommendation};

/// Recommendation request
#[derive(Debug, Deserialize, Validate)]
pub struct RecommendationBody {
    /// Collection of right swipes
    pub liked_collection_id: Option<Uuid>,

    /// Collection of left swipes
    pub disliked_collection_id: Option<Uuid>,

    #[serde(default)]
    pub exclude_ids: Vec<Uuid>,

    #[serde(default)]
    pub exclude_slugs: Vec<String>,

    /// Maximum results to return
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

impl RecommendationBody {
    fn into_request(self, default_limit: usize) -> RecommendationRequest {
        RecommendationRequest {
            liked_collection: self.liked_collection_id,
            disliked_collection: self.disliked_collection_id,
            exclude_ids: self.exclude_ids,
            exclude_slugs: self.exclude_slugs,
            limit: self.limit.unwrap_or(default_limit),
        }
    }
}

/// Recommendation response
#[derive(Serialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<ScoredRecommendation>,
    pub count: usize,
}

/// Search enhancement request
#[derive(Debug, Deserialize, Validate)]
pub struct EnhanceBody {
    #[validate(length(max = 500))]
    pub results: Vec<Map<String, Value>>,

    pub liked_collection_id: Option<Uuid>,

    pub disliked_collection_id: Option<Uuid>,
}

/// Search enhancement response
#[derive(Serialize)]
pub struct EnhanceResponse {
    pub results: Vec<Map<String, Value>>,
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|f| f.to_string()),
    }
}

/// Recommend proposals from swipe history
pub async fn recommend(
    State(state): State<AppState>,
    Json(body): Json<RecommendationBody>,
) -> Result<Json<RecommendationResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/v1/recommendations");
    let result = run_recommend(&state, body).await;
    request_metrics.finish(status_of(&result));
    result
}

async fn run_recommend(
    state: &AppState,
    body: RecommendationBody,
) -> Result<Json<RecommendationResponse>> {
    body.validate().map_err(validation_error)?;

    let request = body.into_request(state.config.recommendation.default_limit);
    let recommendations = state.engine.get_recommended_proposals(&request).await?;

    Ok(Json(RecommendationResponse {
        count: recommendations.len(),
        recommendations,
    }))
}

/// Add AI scores to externally ranked search results
pub async fn enhance_search(
    State(state): State<AppState>,
    Json(body): Json<EnhanceBody>,
) -> Result<Json<EnhanceResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/v1/search/enhance");
    let result = run_enhance(&state, body).await;
    request_metrics.finish(status_of(&result));
    result
}

async fn run_enhance(state: &AppState, body: EnhanceBody) -> Result<Json<EnhanceResponse>> {
    body.validate().map_err(validation_error)?;

    let results = state
        .engine
        .enhance_search_results(
            body.results,
            body.liked_collection_id,
            body.disliked_collection_id,
        )
        .await?;

    Ok(Json(EnhanceResponse { results }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_defaults() {
        let body: RecommendationBody = serde_json::from_value(json!({
            "liked_collection_id": "7f1c6d2e-59a4-4a8e-9a39-2f8c1b7e3d10"
        }))
        .unwrap();
        assert!(body.validate().is_ok());

        let request = body.into_request(20);
        assert_eq!(request.limit, 20);
        assert!(request.liked_collection.is_some());
        assert!(request.disliked_collection.is_none());
        assert!(request.exclude_ids.is_empty());
    }

    #[test]
    fn test_limit_bounds() {
        let zero: RecommendationBody = serde_json::from_value(json!({"limit": 0})).unwrap();
        assert!(zero.validate().is_err());

        let too_many: RecommendationBody = serde_json::from_value(json!({"limit": 101})).unwrap();
        let err = validation_error(too_many.validate().unwrap_err());
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "limit"));

        let ok: RecommendationBody = serde_json::from_value(json!({"limit": 100})).unwrap();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_enhance_body() {
        let body: EnhanceBody = serde_json::from_value(json!({
            "results": [{"id": "a", "ranking_total": 1}, {"id": "b"}]
        }))
        .unwrap();
        assert!(body.validate().is_ok());
        assert_eq!(body.results.len(), 2);
        assert!(body.liked_collection_id.is_none());
    }

    #[test]
    fn test_status_of() {
        assert_eq!(status_of(&Ok::<_, AppError>(())), 200);
        let err: Result<()> = Err(AppError::Validation {
            message: "bad".to_string(),
            field: None,
        });
        assert_eq!(status_of(&err), 400);
    }
}
