//! Candidate retrieval by similarity to a preference vector

use crate::store::{Candidate, EmbeddingRepository, NeighborQuery};
use catalyst_common::errors::Result;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Nearest-neighbor search over stored proposal embeddings
#[derive(Clone)]
pub struct CandidateSearch {
    repository: Arc<dyn EmbeddingRepository>,
    entity_type: String,
    field: String,
    threshold: f64,
}

impl CandidateSearch {
    pub fn new(
        repository: Arc<dyn EmbeddingRepository>,
        entity_type: impl Into<String>,
        field: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Self {
            repository,
            entity_type: entity_type.into(),
            field: field.into(),
            threshold,
        }
    }

    /// Up to `limit` candidates at least `threshold` similar to `vector`.
    ///
    /// An empty vector yields no candidates without querying the store.
    #[instrument(skip(self, vector, exclude_ids, exclude_slugs), fields(dimension = vector.len()))]
    pub async fn find(
        &self,
        vector: &[f32],
        limit: usize,
        exclude_ids: &[Uuid],
        exclude_slugs: &[String],
    ) -> Result<Vec<Candidate>> {
        if vector.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query = NeighborQuery {
            vector,
            entity_type: &self.entity_type,
            field: &self.field,
            limit,
            threshold: self.threshold,
            exclude_ids,
            exclude_slugs,
        };

        let candidates = self.repository.nearest_neighbors(&query).await?;
        debug!(count = candidates.len(), "Retrieved candidates");

        Ok(candidates)
    }
}
