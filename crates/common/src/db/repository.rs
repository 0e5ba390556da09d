//! Repository for database operations
//!
//! Covers the embedding write path (idempotent lookups and inserts),
//! bookmark lookups, and proposal paging for the backfill worker.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Statement,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Column list for reading `model_embeddings` with the vector rendered as text.
///
/// `alias` is the table alias used in the surrounding query (may be empty).
pub fn embedding_columns(alias: &str) -> String {
    let p = if alias.is_empty() {
        String::new()
    } else {
        format!("{}.", alias)
    };
    format!(
        "{p}id, {p}embeddable_type, {p}embeddable_id, {p}field_name, {p}provider, {p}model, \
         {p}dimensions, {p}embedding::text AS embedding, {p}source_text, {p}content_hash, \
         {p}token_count, {p}metadata, {p}funding_year, {p}fund_label, {p}campaign_title, \
         {p}is_funded, {p}amount_requested, {p}currency, {p}created_at",
        p = p
    )
}

/// Denormalized descriptive columns stored alongside an embedding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMetadata {
    pub metadata: Option<serde_json::Value>,
    pub funding_year: Option<i32>,
    pub fund_label: Option<String>,
    pub campaign_title: Option<String>,
    pub is_funded: Option<bool>,
    pub amount_requested: Option<i64>,
    pub currency: Option<String>,
}

/// Embedding row to be inserted
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub embeddable_type: String,
    pub embeddable_id: Uuid,
    pub field_name: String,
    pub provider: String,
    pub model: String,
    pub vector: Vec<f32>,
    pub source_text: String,
    pub content_hash: String,
    pub token_count: i32,
    pub metadata: EmbeddingMetadata,
}

/// Proposal with its fund and campaign loaded
#[derive(Debug, Clone)]
pub struct ProposalWithContext {
    pub proposal: Proposal,
    pub fund: Option<Fund>,
    pub campaign: Option<Campaign>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Embedding Operations
    // ========================================================================

    /// Find an embedding generated from identical content with the same
    /// provider and model
    pub async fn find_embedding(
        &self,
        embeddable_type: &str,
        embeddable_id: Uuid,
        field_name: &str,
        content_hash: &str,
        provider: &str,
        model: &str,
    ) -> Result<Option<ModelEmbedding>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM model_embeddings
            WHERE embeddable_type = $1
              AND embeddable_id = $2
              AND field_name = $3
              AND content_hash = $4
              AND provider = $5
              AND model = $6
            LIMIT 1
            "#,
            embedding_columns("")
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![
                embeddable_type.into(),
                embeddable_id.into(),
                field_name.into(),
                content_hash.into(),
                provider.into(),
                model.into(),
            ],
        );

        ModelEmbeddingEntity::find()
            .from_raw_sql(stmt)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Insert an embedding (vector written via raw SQL for the pgvector type)
    pub async fn insert_embedding(&self, new: NewEmbedding) -> Result<ModelEmbedding> {
        let id = Uuid::new_v4();
        let dimensions = new.vector.len() as i32;

        let sql = format!(
            r#"
            INSERT INTO model_embeddings (
                id, embeddable_type, embeddable_id, field_name, provider, model,
                dimensions, embedding, source_text, content_hash, token_count,
                metadata, funding_year, fund_label, campaign_title, is_funded,
                amount_requested, currency, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::vector, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, NOW())
            RETURNING {}
            "#,
            embedding_columns("")
        );

        let meta = new.metadata;
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            &sql,
            vec![
                id.into(),
                new.embeddable_type.into(),
                new.embeddable_id.into(),
                new.field_name.into(),
                new.provider.into(),
                new.model.into(),
                dimensions.into(),
                format_vector(&new.vector).into(),
                new.source_text.into(),
                new.content_hash.into(),
                new.token_count.into(),
                meta.metadata.into(),
                meta.funding_year.into(),
                meta.fund_label.into(),
                meta.campaign_title.into(),
                meta.is_funded.into(),
                meta.amount_requested.into(),
                meta.currency.into(),
            ],
        );

        ModelEmbeddingEntity::find()
            .from_raw_sql(stmt)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::Internal {
                message: format!("Insert of embedding {} returned no row", id),
            })
    }

    /// Whether any embedding exists for the entity field
    pub async fn has_embedding(
        &self,
        embeddable_type: &str,
        embeddable_id: Uuid,
        field_name: &str,
    ) -> Result<bool> {
        let count = ModelEmbeddingEntity::find()
            .filter(ModelEmbeddingColumn::EmbeddableType.eq(embeddable_type))
            .filter(ModelEmbeddingColumn::EmbeddableId.eq(embeddable_id))
            .filter(ModelEmbeddingColumn::FieldName.eq(field_name))
            .count(self.read_conn())
            .await?;

        Ok(count > 0)
    }

    // ========================================================================
    // Bookmark Operations
    // ========================================================================

    /// Proposal ids in a bookmark collection carrying the given vote
    pub async fn proposal_ids_in_collection(
        &self,
        collection_id: Uuid,
        vote: Vote,
    ) -> Result<Vec<Uuid>> {
        BookmarkItemEntity::find()
            .select_only()
            .column(BookmarkItemColumn::ModelId)
            .filter(BookmarkItemColumn::BookmarkCollectionId.eq(collection_id))
            .filter(BookmarkItemColumn::ModelType.eq(PROPOSAL_ENTITY))
            .filter(BookmarkItemColumn::Vote.eq(vote.as_i16()))
            .into_tuple::<Uuid>()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Proposal Operations
    // ========================================================================

    /// Total number of proposals
    pub async fn count_proposals(&self) -> Result<u64> {
        ProposalEntity::find()
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Number of distinct entities of `embeddable_type` holding an embedding for `field_name`
    pub async fn count_embedded(&self, embeddable_type: &str, field_name: &str) -> Result<u64> {
        ModelEmbeddingEntity::find()
            .select_only()
            .column(ModelEmbeddingColumn::EmbeddableId)
            .distinct()
            .filter(ModelEmbeddingColumn::EmbeddableType.eq(embeddable_type))
            .filter(ModelEmbeddingColumn::FieldName.eq(field_name))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Page through proposals in creation order, with fund and campaign
    pub async fn list_proposals_with_context(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ProposalWithContext>> {
        let proposals = ProposalEntity::find()
            .order_by_asc(ProposalColumn::CreatedAt)
            .order_by_asc(ProposalColumn::Id)
            .offset(offset)
            .limit(limit)
            .all(self.read_conn())
            .await?;

        let fund_ids: Vec<Uuid> = proposals.iter().filter_map(|p| p.fund_id).collect();
        let campaign_ids: Vec<Uuid> = proposals.iter().filter_map(|p| p.campaign_id).collect();

        let funds: HashMap<Uuid, Fund> = if fund_ids.is_empty() {
            HashMap::new()
        } else {
            FundEntity::find()
                .filter(FundColumn::Id.is_in(fund_ids))
                .all(self.read_conn())
                .await?
                .into_iter()
                .map(|f| (f.id, f))
                .collect()
        };

        let campaigns: HashMap<Uuid, Campaign> = if campaign_ids.is_empty() {
            HashMap::new()
        } else {
            CampaignEntity::find()
                .filter(CampaignColumn::Id.is_in(campaign_ids))
                .all(self.read_conn())
                .await?
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        Ok(proposals
            .into_iter()
            .map(|proposal| ProposalWithContext {
                fund: proposal.fund_id.and_then(|id| funds.get(&id).cloned()),
                campaign: proposal.campaign_id.and_then(|id| campaigns.get(&id).cloned()),
                proposal,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_columns_alias() {
        let cols = embedding_columns("e");
        assert!(cols.starts_with("e.id, e.embeddable_type"));
        assert!(cols.contains("e.embedding::text AS embedding"));

        let bare = embedding_columns("");
        assert!(bare.starts_with("id, embeddable_type"));
        assert!(!bare.contains(".id"));
    }
}
