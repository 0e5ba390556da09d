//! Postgres/pgvector store
//!
//! Similarity search uses the pgvector cosine distance operator (`<=>`);
//! similarity is reported as `1 - distance`. Vectors travel as text with a
//! `::vector` cast.

use super::{
    BookmarkSource, Candidate, CampaignRef, EmbeddingRepository, FundRef, NeighborQuery,
    ProposalSummary, StoredVector,
};
use async_trait::async_trait;
use catalyst_common::db::models::{format_vector, parse_vector, ModelEmbeddingEntity, Vote};
use catalyst_common::db::{embedding_columns, DbPool, Repository};
use catalyst_common::errors::Result;
use sea_orm::{DbBackend, EntityTrait, FromQueryResult, Statement};
use tracing::{debug, warn};
use uuid::Uuid;

/// Store backed by the shared application database
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    repository: Repository,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            repository: Repository::new(pool.clone()),
            pool,
        }
    }
}

/// Query result row for nearest-neighbor search
#[derive(Debug, FromQueryResult)]
struct NeighborRow {
    entity_id: Uuid,
    embedding: Option<String>,
    similarity: f64,
    proposal_id: Option<Uuid>,
    slug: Option<String>,
    title: Option<String>,
    status: Option<String>,
    fund_id: Option<Uuid>,
    fund_title: Option<String>,
    campaign_id: Option<Uuid>,
    campaign_title: Option<String>,
}

impl NeighborRow {
    fn into_candidate(self) -> Option<Candidate> {
        let vector = self.embedding.as_deref().and_then(parse_vector)?;

        let proposal = self.proposal_id.map(|id| ProposalSummary {
            id,
            slug: self.slug,
            title: self.title,
            status: self.status,
            fund: self.fund_id.map(|id| FundRef {
                id,
                title: self.fund_title,
            }),
            campaign: self.campaign_id.map(|id| CampaignRef {
                id,
                title: self.campaign_title,
            }),
        });

        Some(Candidate {
            entity_id: self.entity_id,
            vector,
            similarity: self.similarity,
            proposal,
        })
    }
}

const NEIGHBOR_SQL: &str = r#"
    SELECT
        e.embeddable_id AS entity_id,
        e.embedding::text AS embedding,
        1 - (e.embedding <=> $1::vector) AS similarity,
        p.id AS proposal_id,
        p.slug,
        p.title,
        p.status,
        f.id AS fund_id,
        f.title AS fund_title,
        c.id AS campaign_id,
        c.title AS campaign_title
    FROM model_embeddings e
    LEFT JOIN proposals p ON p.id = e.embeddable_id
    LEFT JOIN funds f ON f.id = p.fund_id
    LEFT JOIN campaigns c ON c.id = p.campaign_id
    WHERE e.embeddable_type = $2
      AND e.field_name = $3
      AND e.dimensions = $4
      AND e.embedding IS NOT NULL
      AND 1 - (e.embedding <=> $1::vector) >= $5
      AND NOT (e.embeddable_id = ANY($6))
      AND (p.slug IS NULL OR NOT (p.slug = ANY($7)))
    ORDER BY e.embedding <=> $1::vector
    LIMIT $8
"#;

#[async_trait]
impl EmbeddingRepository for PgStore {
    async fn fetch_by_entities(
        &self,
        entity_type: &str,
        entity_ids: &[Uuid],
        field: &str,
    ) -> Result<Vec<StoredVector>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}
            FROM model_embeddings
            WHERE embeddable_type = $1
              AND field_name = $2
              AND embedding IS NOT NULL
              AND embeddable_id = ANY($3)
            ORDER BY created_at ASC
            "#,
            embedding_columns("")
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![
                entity_type.into(),
                field.into(),
                entity_ids.to_vec().into(),
            ],
        );

        let rows = ModelEmbeddingEntity::find()
            .from_raw_sql(stmt)
            .all(self.pool.read())
            .await?;

        let vectors: Vec<StoredVector> = rows
            .iter()
            .filter_map(|row| match row.vector() {
                Some(vector) => Some(StoredVector {
                    entity_id: row.embeddable_id,
                    vector,
                }),
                None => {
                    warn!(embedding_id = %row.id, "Skipping unreadable stored embedding");
                    None
                }
            })
            .collect();

        debug!(
            requested = entity_ids.len(),
            found = vectors.len(),
            "Fetched stored embeddings"
        );

        Ok(vectors)
    }

    async fn nearest_neighbors(&self, query: &NeighborQuery<'_>) -> Result<Vec<Candidate>> {
        if query.vector.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            NEIGHBOR_SQL,
            vec![
                format_vector(query.vector).into(),
                query.entity_type.into(),
                query.field.into(),
                (query.vector.len() as i32).into(),
                query.threshold.into(),
                query.exclude_ids.to_vec().into(),
                query.exclude_slugs.to_vec().into(),
                (query.limit as i64).into(),
            ],
        );

        let rows = NeighborRow::find_by_statement(stmt)
            .all(self.pool.read())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(NeighborRow::into_candidate)
            .collect())
    }
}

#[async_trait]
impl BookmarkSource for PgStore {
    async fn proposal_ids(&self, collection_id: Uuid, vote: Vote) -> Result<Vec<Uuid>> {
        self.repository
            .proposal_ids_in_collection(collection_id, vote)
            .await
    }
}
