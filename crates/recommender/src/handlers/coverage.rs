//! Embedding coverage handler

use axum::{extract::State, Json};
use catalyst_common::{
    config::COMBINED_FIELD, db::models::PROPOSAL_ENTITY, errors::Result, metrics::RequestMetrics,
};
use catalyst_recommender::EmbeddingCoverage;
use serde::Serialize;

use super::status_of;
use crate::AppState;

#[derive(Serialize)]
pub struct CoverageResponse {
    pub coverage: EmbeddingCoverage,
}

/// Share of proposals that carry a `combined` embedding
pub async fn embedding_coverage(State(state): State<AppState>) -> Result<Json<CoverageResponse>> {
    let request_metrics = RequestMetrics::start("GET", "/v1/embeddings/coverage");
    let result = run_coverage(&state).await;
    request_metrics.finish(status_of(&result));
    result
}

async fn run_coverage(state: &AppState) -> Result<Json<CoverageResponse>> {
    let total = state.repository.count_proposals().await?;
    let embedded = state
        .repository
        .count_embedded(PROPOSAL_ENTITY, COMBINED_FIELD)
        .await?;

    let coverage = EmbeddingCoverage::new(total, embedded);
    tracing::debug!(
        total,
        embedded,
        percentage = coverage.coverage_percentage,
        "Embedding coverage computed"
    );

    Ok(Json(CoverageResponse { coverage }))
}
