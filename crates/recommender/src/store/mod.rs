//! Data access seams for the recommendation engine
//!
//! The engine talks to two stores:
//! - [`EmbeddingRepository`]: stored vectors and nearest-neighbor search
//! - [`BookmarkSource`]: proposal ids in a swipe collection by vote
//!
//! [`PgStore`] serves both from Postgres/pgvector; [`InMemoryStore`] serves
//! both from memory for tests and local runs.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use catalyst_common::db::models::Vote;
use catalyst_common::errors::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored embedding vector for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVector {
    pub entity_id: Uuid,
    pub vector: Vec<f32>,
}

/// Fund reference attached to a proposal summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundRef {
    pub id: Uuid,
    pub title: Option<String>,
}

/// Campaign reference attached to a proposal summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRef {
    pub id: Uuid,
    pub title: Option<String>,
}

/// Proposal fields returned with a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSummary {
    pub id: Uuid,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub fund: Option<FundRef>,
    pub campaign: Option<CampaignRef>,
}

/// Nearest-neighbor search hit
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entity_id: Uuid,
    pub vector: Vec<f32>,
    /// Similarity to the query vector as computed by the store
    pub similarity: f64,
    /// `None` when the owning proposal no longer resolves
    pub proposal: Option<ProposalSummary>,
}

/// Parameters for a nearest-neighbor search
#[derive(Debug, Clone, Copy)]
pub struct NeighborQuery<'a> {
    pub vector: &'a [f32],
    pub entity_type: &'a str,
    pub field: &'a str,
    pub limit: usize,
    /// Minimum cosine similarity (inclusive)
    pub threshold: f64,
    pub exclude_ids: &'a [Uuid],
    pub exclude_slugs: &'a [String],
}

/// Stored embedding vectors and similarity search
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Vectors stored for the given entities under `field`.
    ///
    /// Entities without a stored vector are absent from the result.
    async fn fetch_by_entities(
        &self,
        entity_type: &str,
        entity_ids: &[Uuid],
        field: &str,
    ) -> Result<Vec<StoredVector>>;

    /// Up to `query.limit` entities whose vector is at least
    /// `query.threshold` similar to `query.vector`, most similar first.
    async fn nearest_neighbors(&self, query: &NeighborQuery<'_>) -> Result<Vec<Candidate>>;
}

/// Swipe collections
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Proposal ids in the collection recorded with `vote`
    async fn proposal_ids(&self, collection_id: Uuid, vote: Vote) -> Result<Vec<Uuid>>;
}
