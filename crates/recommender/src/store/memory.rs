//! In-memory store
//!
//! Same contract as the Postgres store with brute-force cosine search.

use super::{
    BookmarkSource, Candidate, EmbeddingRepository, NeighborQuery, ProposalSummary, StoredVector,
};
use crate::similarity::cosine_similarity;
use async_trait::async_trait;
use catalyst_common::db::models::Vote;
use catalyst_common::errors::Result;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct EmbeddingEntry {
    entity_type: String,
    entity_id: Uuid,
    field: String,
    vector: Vec<f32>,
}

#[derive(Debug, Clone)]
struct BookmarkEntry {
    collection_id: Uuid,
    proposal_id: Uuid,
    vote: Vote,
}

/// Embeddings, proposals and swipe collections held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    embeddings: Vec<EmbeddingEntry>,
    proposals: HashMap<Uuid, ProposalSummary>,
    bookmarks: Vec<BookmarkEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stored embedding
    pub fn with_embedding(
        mut self,
        entity_type: &str,
        entity_id: Uuid,
        field: &str,
        vector: Vec<f32>,
    ) -> Self {
        self.embeddings.push(EmbeddingEntry {
            entity_type: entity_type.to_string(),
            entity_id,
            field: field.to_string(),
            vector,
        });
        self
    }

    /// Register the proposal that an embedding's entity id resolves to
    pub fn with_proposal(mut self, proposal: ProposalSummary) -> Self {
        self.proposals.insert(proposal.id, proposal);
        self
    }

    /// Record a swipe in a collection
    pub fn with_bookmark(mut self, collection_id: Uuid, proposal_id: Uuid, vote: Vote) -> Self {
        self.bookmarks.push(BookmarkEntry {
            collection_id,
            proposal_id,
            vote,
        });
        self
    }
}

#[async_trait]
impl EmbeddingRepository for InMemoryStore {
    async fn fetch_by_entities(
        &self,
        entity_type: &str,
        entity_ids: &[Uuid],
        field: &str,
    ) -> Result<Vec<StoredVector>> {
        Ok(self
            .embeddings
            .iter()
            .filter(|e| {
                e.entity_type == entity_type
                    && e.field == field
                    && entity_ids.contains(&e.entity_id)
            })
            .map(|e| StoredVector {
                entity_id: e.entity_id,
                vector: e.vector.clone(),
            })
            .collect())
    }

    async fn nearest_neighbors(&self, query: &NeighborQuery<'_>) -> Result<Vec<Candidate>> {
        if query.vector.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Candidate> = self
            .embeddings
            .iter()
            .filter(|e| {
                e.entity_type == query.entity_type
                    && e.field == query.field
                    && e.vector.len() == query.vector.len()
                    && !query.exclude_ids.contains(&e.entity_id)
            })
            .filter_map(|e| {
                let proposal = self.proposals.get(&e.entity_id).cloned();
                let excluded_slug = proposal
                    .as_ref()
                    .and_then(|p| p.slug.as_ref())
                    .is_some_and(|slug| query.exclude_slugs.contains(slug));
                if excluded_slug {
                    return None;
                }

                let similarity = cosine_similarity(query.vector, &e.vector);
                (similarity >= query.threshold).then(|| Candidate {
                    entity_id: e.entity_id,
                    vector: e.vector.clone(),
                    similarity,
                    proposal,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(query.limit);
        Ok(hits)
    }
}

#[async_trait]
impl BookmarkSource for InMemoryStore {
    async fn proposal_ids(&self, collection_id: Uuid, vote: Vote) -> Result<Vec<Uuid>> {
        Ok(self
            .bookmarks
            .iter()
            .filter(|b| b.collection_id == collection_id && b.vote == vote)
            .map(|b| b.proposal_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPE: &str = "proposal";
    const FIELD: &str = "combined";

    fn summary(id: Uuid, slug: &str) -> ProposalSummary {
        ProposalSummary {
            id,
            slug: Some(slug.to_string()),
            title: None,
            status: None,
            fund: None,
            campaign: None,
        }
    }

    fn query<'a>(vector: &'a [f32], ids: &'a [Uuid], slugs: &'a [String]) -> NeighborQuery<'a> {
        NeighborQuery {
            vector,
            entity_type: TYPE,
            field: FIELD,
            limit: 10,
            threshold: 0.5,
            exclude_ids: ids,
            exclude_slugs: slugs,
        }
    }

    #[tokio::test]
    async fn test_fetch_by_entities_filters_field_and_type() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let store = InMemoryStore::new()
            .with_embedding(TYPE, a, FIELD, vec![1.0, 0.0])
            .with_embedding(TYPE, a, "title", vec![0.0, 1.0])
            .with_embedding("other", b, FIELD, vec![0.0, 1.0]);

        let found = store.fetch_by_entities(TYPE, &[a, b], FIELD).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entity_id, a);
        assert_eq!(found[0].vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_nearest_neighbors_threshold_and_order() {
        let close = Uuid::new_v4();
        let closer = Uuid::new_v4();
        let far = Uuid::new_v4();
        let store = InMemoryStore::new()
            .with_embedding(TYPE, close, FIELD, vec![1.0, 0.8])
            .with_embedding(TYPE, closer, FIELD, vec![1.0, 0.1])
            .with_embedding(TYPE, far, FIELD, vec![0.0, 1.0]);

        let hits = store
            .nearest_neighbors(&query(&[1.0, 0.0], &[], &[]))
            .await
            .unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|c| c.entity_id).collect();
        assert_eq!(ids, vec![closer, close]);
        assert!(hits.iter().all(|c| c.similarity >= 0.5));
    }

    #[tokio::test]
    async fn test_nearest_neighbors_exclusions() {
        let by_id = Uuid::new_v4();
        let by_slug = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let store = InMemoryStore::new()
            .with_embedding(TYPE, by_id, FIELD, vec![1.0, 0.0])
            .with_embedding(TYPE, by_slug, FIELD, vec![1.0, 0.0])
            .with_embedding(TYPE, kept, FIELD, vec![1.0, 0.0])
            .with_proposal(summary(by_slug, "seen-already"))
            .with_proposal(summary(kept, "fresh"));

        let slugs = vec!["seen-already".to_string()];
        let hits = store
            .nearest_neighbors(&query(&[1.0, 0.0], &[by_id], &slugs))
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, kept);
        assert_eq!(hits[0].proposal.as_ref().unwrap().slug.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_bookmarks_by_vote() {
        let collection = Uuid::new_v4();
        let yes = Uuid::new_v4();
        let no = Uuid::new_v4();
        let store = InMemoryStore::new()
            .with_bookmark(collection, yes, Vote::Yes)
            .with_bookmark(collection, no, Vote::No)
            .with_bookmark(Uuid::new_v4(), Uuid::new_v4(), Vote::Yes);

        assert_eq!(store.proposal_ids(collection, Vote::Yes).await.unwrap(), vec![yes]);
        assert_eq!(store.proposal_ids(collection, Vote::No).await.unwrap(), vec![no]);
        assert!(store
            .proposal_ids(collection, Vote::Abstain)
            .await
            .unwrap()
            .is_empty());
    }
}
