//! Preference profile builder
//!
//! Aggregates the embeddings of a user's liked and disliked proposals into
//! a preference centroid and an optional avoidance centroid.

use crate::similarity::{centroid, confidence};
use crate::store::EmbeddingRepository;
use catalyst_common::errors::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Aggregated swipe signal for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceProfile {
    /// Centroid of liked embeddings
    pub preference_vector: Vec<f32>,
    /// Centroid of disliked embeddings, if any were found
    pub avoidance_vector: Option<Vec<f32>>,
    /// Number of liked ids supplied
    pub liked_count: usize,
    /// Number of disliked ids supplied
    pub disliked_count: usize,
    /// `min(liked_count / saturation, 1)`
    pub confidence: f64,
}

impl PreferenceProfile {
    /// Build a profile from already fetched vectors.
    ///
    /// Returns `None` when there is no liked vector to aggregate.
    pub fn from_vectors(
        liked_count: usize,
        liked_vectors: &[Vec<f32>],
        disliked_count: usize,
        disliked_vectors: &[Vec<f32>],
        confidence_saturation: f64,
    ) -> Option<Self> {
        let preference_vector = centroid(liked_vectors)?;

        Some(Self {
            preference_vector,
            avoidance_vector: centroid(disliked_vectors),
            liked_count,
            disliked_count,
            confidence: confidence(liked_count, confidence_saturation),
        })
    }
}

/// Builds preference profiles from stored embeddings
#[derive(Clone)]
pub struct ProfileBuilder {
    repository: Arc<dyn EmbeddingRepository>,
    entity_type: String,
    field: String,
    confidence_saturation: f64,
}

impl ProfileBuilder {
    pub fn new(
        repository: Arc<dyn EmbeddingRepository>,
        entity_type: impl Into<String>,
        field: impl Into<String>,
        confidence_saturation: f64,
    ) -> Self {
        Self {
            repository,
            entity_type: entity_type.into(),
            field: field.into(),
            confidence_saturation,
        }
    }

    /// Build the profile for the given liked and disliked proposal ids.
    ///
    /// `Ok(None)` means there is no usable signal: no liked ids, or none of
    /// them has a stored embedding.
    #[instrument(skip(self, liked_ids, disliked_ids), fields(liked = liked_ids.len(), disliked = disliked_ids.len()))]
    pub async fn build(
        &self,
        liked_ids: &[Uuid],
        disliked_ids: &[Uuid],
    ) -> Result<Option<PreferenceProfile>> {
        if liked_ids.is_empty() {
            debug!("No liked proposals, skipping profile");
            return Ok(None);
        }

        let liked = self.fetch_vectors(liked_ids).await?;
        if liked.is_empty() {
            debug!("No embeddings for liked proposals");
            return Ok(None);
        }

        let disliked = if disliked_ids.is_empty() {
            Vec::new()
        } else {
            self.fetch_vectors(disliked_ids).await?
        };

        let profile = PreferenceProfile::from_vectors(
            liked_ids.len(),
            &liked,
            disliked_ids.len(),
            &disliked,
            self.confidence_saturation,
        );

        if let Some(ref p) = profile {
            debug!(
                dimension = p.preference_vector.len(),
                has_avoidance = p.avoidance_vector.is_some(),
                confidence = p.confidence,
                "Built preference profile"
            );
        }

        Ok(profile)
    }

    async fn fetch_vectors(&self, ids: &[Uuid]) -> Result<Vec<Vec<f32>>> {
        Ok(self
            .repository
            .fetch_by_entities(&self.entity_type, ids, &self.field)
            .await?
            .into_iter()
            .map(|stored| stored.vector)
            .filter(|vector| !vector.is_empty())
            .collect())
    }
}
