//! Idempotent embedding generation
//!
//! `generate_and_store` hashes the source text and reuses an existing row
//! when the same (entity, field, content hash, provider, model) is already
//! stored. Only new content reaches the provider.

use super::Embedder;
use crate::db::models::{ModelEmbedding, PROPOSAL_ENTITY};
use crate::db::{EmbeddingMetadata, NewEmbedding, ProposalWithContext, Repository};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Persistence needed by the embedding service
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    async fn find_embedding(
        &self,
        embeddable_type: &str,
        embeddable_id: Uuid,
        field_name: &str,
        content_hash: &str,
        provider: &str,
        model: &str,
    ) -> Result<Option<ModelEmbedding>>;

    async fn insert_embedding(&self, new: NewEmbedding) -> Result<ModelEmbedding>;
}

#[async_trait]
impl EmbeddingStore for Repository {
    async fn find_embedding(
        &self,
        embeddable_type: &str,
        embeddable_id: Uuid,
        field_name: &str,
        content_hash: &str,
        provider: &str,
        model: &str,
    ) -> Result<Option<ModelEmbedding>> {
        Repository::find_embedding(
            self,
            embeddable_type,
            embeddable_id,
            field_name,
            content_hash,
            provider,
            model,
        )
        .await
    }

    async fn insert_embedding(&self, new: NewEmbedding) -> Result<ModelEmbedding> {
        Repository::insert_embedding(self, new).await
    }
}

/// Entity an embedding belongs to
#[derive(Debug, Clone)]
pub struct EmbeddingTarget {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub metadata: EmbeddingMetadata,
}

impl EmbeddingTarget {
    /// Target for a proposal, carrying its descriptive metadata
    pub fn proposal(ctx: &ProposalWithContext) -> Self {
        let p = &ctx.proposal;
        Self {
            entity_type: PROPOSAL_ENTITY.to_string(),
            entity_id: p.id,
            metadata: EmbeddingMetadata {
                metadata: Some(serde_json::json!({
                    "id": p.id,
                    "slug": p.slug,
                    "status": p.status,
                    "funding_status": p.funding_status,
                })),
                funding_year: p.funding_year(),
                fund_label: ctx.fund.as_ref().and_then(|f| f.label.clone()),
                campaign_title: ctx.campaign.as_ref().map(|c| c.title.clone()),
                is_funded: Some(p.is_funded()),
                amount_requested: p.amount_requested,
                currency: p.currency.clone(),
            },
        }
    }
}

/// Result of `generate_and_store`
#[derive(Debug, Clone)]
pub enum EmbeddingOutcome {
    Created(ModelEmbedding),
    Existing(ModelEmbedding),
}

impl EmbeddingOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, EmbeddingOutcome::Created(_))
    }

    pub fn into_record(self) -> ModelEmbedding {
        match self {
            EmbeddingOutcome::Created(r) | EmbeddingOutcome::Existing(r) => r,
        }
    }
}

/// One unit of work for `batch_generate`
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub target: EmbeddingTarget,
    pub field_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub created: usize,
    pub reused: usize,
    pub failed: usize,
}

/// SHA-256 hex digest of the content
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Rough token estimate: one token per four bytes, rounded up
pub fn estimate_token_count(content: &str) -> i32 {
    content.len().div_ceil(4) as i32
}

pub struct EmbeddingService<S> {
    store: S,
    embedder: Arc<dyn Embedder>,
}

impl<S: EmbeddingStore> EmbeddingService<S> {
    pub fn new(store: S, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Embed `content` for the target field, reusing an identical stored
    /// embedding when one exists
    #[instrument(skip(self, target, content), fields(entity_id = %target.entity_id, field = field_name))]
    pub async fn generate_and_store(
        &self,
        target: &EmbeddingTarget,
        field_name: &str,
        content: &str,
    ) -> Result<EmbeddingOutcome> {
        ensure_content(field_name, content)?;

        let hash = content_hash(content);
        if let Some(existing) = self.find_existing(target, field_name, &hash).await? {
            metrics::record_embedding_stored(field_name, false);
            return Ok(EmbeddingOutcome::Existing(existing));
        }

        let vector = self.embedder.embed(content).await.map_err(|e| {
            error!(
                provider = self.embedder.provider_name(),
                model = self.embedder.model_name(),
                text_length = content.len(),
                error = %e,
                "Failed to generate embedding"
            );
            e
        })?;

        let record = self
            .store_vector(target, field_name, content, hash, vector)
            .await?;
        Ok(EmbeddingOutcome::Created(record))
    }

    /// Generate embeddings for many items.
    ///
    /// Items without a stored embedding go to the provider in one
    /// `embed_batch` call; if that call fails they are embedded one at a
    /// time. Failures are logged and counted without aborting the batch.
    pub async fn batch_generate(&self, items: &[BatchItem]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut pending: Vec<PendingItem<'_>> = Vec::new();

        for item in items {
            if let Err(e) = ensure_content(&item.field_name, &item.content) {
                log_item_failure(item, &e);
                report.failed += 1;
                continue;
            }

            let hash = content_hash(&item.content);
            if let Some(queued) = pending.iter_mut().find(|p| p.same_work(item, &hash)) {
                queued.duplicates += 1;
                continue;
            }

            match self.find_existing(&item.target, &item.field_name, &hash).await {
                Ok(Some(_)) => {
                    metrics::record_embedding_stored(&item.field_name, false);
                    report.reused += 1;
                }
                Ok(None) => pending.push(PendingItem {
                    item,
                    hash,
                    duplicates: 0,
                }),
                Err(e) => {
                    log_item_failure(item, &e);
                    report.failed += 1;
                }
            }
        }

        if pending.is_empty() {
            return report;
        }

        let vectors = self.embed_pending(&pending).await;
        for (queued, vector) in pending.into_iter().zip(vectors) {
            let stored = match vector {
                Ok(vector) => {
                    self.store_vector(
                        &queued.item.target,
                        &queued.item.field_name,
                        &queued.item.content,
                        queued.hash,
                        vector,
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            match stored {
                Ok(_) => {
                    report.created += 1;
                    report.reused += queued.duplicates;
                }
                Err(e) => {
                    log_item_failure(queued.item, &e);
                    report.failed += 1 + queued.duplicates;
                }
            }
        }

        report
    }

    /// One vector (or error) per pending item, in order
    async fn embed_pending(&self, pending: &[PendingItem<'_>]) -> Vec<Result<Vec<f32>>> {
        let texts: Vec<String> = pending.iter().map(|p| p.item.content.clone()).collect();

        match self.embedder.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == texts.len() => vectors.into_iter().map(Ok).collect(),
            Ok(vectors) => {
                warn!(
                    expected = texts.len(),
                    received = vectors.len(),
                    "Batch embedding size mismatch, embedding items individually"
                );
                self.embed_each(&texts).await
            }
            Err(e) => {
                warn!(error = %e, batch = texts.len(), "Batch embedding failed, embedding items individually");
                self.embed_each(&texts).await
            }
        }
    }

    async fn embed_each(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embedder.embed(text).await);
        }
        out
    }

    async fn find_existing(
        &self,
        target: &EmbeddingTarget,
        field_name: &str,
        hash: &str,
    ) -> Result<Option<ModelEmbedding>> {
        self.store
            .find_embedding(
                &target.entity_type,
                target.entity_id,
                field_name,
                hash,
                self.embedder.provider_name(),
                self.embedder.model_name(),
            )
            .await
    }

    async fn store_vector(
        &self,
        target: &EmbeddingTarget,
        field_name: &str,
        content: &str,
        hash: String,
        vector: Vec<f32>,
    ) -> Result<ModelEmbedding> {
        let provider = self.embedder.provider_name();
        let model = self.embedder.model_name();

        if vector.is_empty() {
            return Err(AppError::EmbeddingError {
                message: format!("{} returned an empty embedding", provider),
            });
        }

        let dimensions = vector.len();
        let record = self
            .store
            .insert_embedding(NewEmbedding {
                embeddable_type: target.entity_type.clone(),
                embeddable_id: target.entity_id,
                field_name: field_name.to_string(),
                provider: provider.to_string(),
                model: model.to_string(),
                vector,
                source_text: content.to_string(),
                content_hash: hash,
                token_count: estimate_token_count(content),
                metadata: target.metadata.clone(),
            })
            .await?;

        metrics::record_embedding_stored(field_name, true);

        info!(
            model_type = %target.entity_type,
            model_id = %target.entity_id,
            field_name = field_name,
            provider = provider,
            embedding_model = model,
            dimensions = dimensions,
            content_length = content.len(),
            "Generated embedding"
        );

        Ok(record)
    }
}

/// Batch item waiting for a vector, with the count of identical items folded into it
struct PendingItem<'a> {
    item: &'a BatchItem,
    hash: String,
    duplicates: usize,
}

impl PendingItem<'_> {
    fn same_work(&self, other: &BatchItem, hash: &str) -> bool {
        self.hash == hash
            && self.item.target.entity_id == other.target.entity_id
            && self.item.target.entity_type == other.target.entity_type
            && self.item.field_name == other.field_name
    }
}

fn ensure_content(field_name: &str, content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::Validation {
            message: "Cannot embed empty content".to_string(),
            field: Some(field_name.to_string()),
        });
    }
    Ok(())
}

fn log_item_failure(item: &BatchItem, e: &AppError) {
    error!(
        model_type = %item.target.entity_type,
        model_id = %item.target.entity_id,
        error = %e,
        "Failed to generate embeddings for model"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::format_vector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<ModelEmbedding>>,
    }

    #[async_trait]
    impl EmbeddingStore for MemoryStore {
        async fn find_embedding(
            &self,
            embeddable_type: &str,
            embeddable_id: Uuid,
            field_name: &str,
            content_hash: &str,
            provider: &str,
            model: &str,
        ) -> Result<Option<ModelEmbedding>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| {
                    r.embeddable_type == embeddable_type
                        && r.embeddable_id == embeddable_id
                        && r.field_name == field_name
                        && r.content_hash == content_hash
                        && r.provider == provider
                        && r.model == model
                })
                .cloned())
        }

        async fn insert_embedding(&self, new: NewEmbedding) -> Result<ModelEmbedding> {
            let row = ModelEmbedding {
                id: Uuid::new_v4(),
                embeddable_type: new.embeddable_type,
                embeddable_id: new.embeddable_id,
                field_name: new.field_name,
                provider: new.provider,
                model: new.model,
                dimensions: new.vector.len() as i32,
                embedding: Some(format_vector(&new.vector)),
                source_text: Some(new.source_text),
                content_hash: new.content_hash,
                token_count: new.token_count,
                metadata: new.metadata.metadata,
                funding_year: new.metadata.funding_year,
                fund_label: new.metadata.fund_label,
                campaign_title: new.metadata.campaign_title,
                is_funded: new.metadata.is_funded,
                amount_requested: new.metadata.amount_requested,
                currency: new.metadata.currency,
                created_at: chrono::Utc::now().into(),
            };
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }
    }

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        batch_calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self::default()
        }

        fn failing_on(text: &'static str) -> Self {
            Self {
                fail_on: Some(text),
                ..Self::default()
            }
        }

        fn check(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail_on == Some(text) {
                return Err(AppError::EmbeddingError {
                    message: "provider down".into(),
                });
            }
            Ok(vec![text.len() as f32, 1.0, 0.0])
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.check(text)
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            texts.iter().map(|t| self.check(t)).collect()
        }

        fn provider_name(&self) -> &str {
            "counting"
        }

        fn model_name(&self) -> &str {
            "counting-v1"
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    fn target(id: u128) -> EmbeddingTarget {
        EmbeddingTarget {
            entity_type: PROPOSAL_ENTITY.to_string(),
            entity_id: Uuid::from_u128(id),
            metadata: EmbeddingMetadata::default(),
        }
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_token_count(""), 0);
        assert_eq!(estimate_token_count("abcd"), 1);
        assert_eq!(estimate_token_count("abcde"), 2);
    }

    #[tokio::test]
    async fn test_generate_and_store_is_idempotent() {
        let embedder = Arc::new(CountingEmbedder::new());
        let service = EmbeddingService::new(MemoryStore::default(), embedder.clone());

        let first = service
            .generate_and_store(&target(1), "combined", "A DeFi education hub")
            .await
            .unwrap();
        assert!(first.is_created());

        let second = service
            .generate_and_store(&target(1), "combined", "A DeFi education hub")
            .await
            .unwrap();
        assert!(!second.is_created());

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.into_record().id, second.into_record().id);
    }

    #[tokio::test]
    async fn test_changed_content_creates_new_record() {
        let embedder = Arc::new(CountingEmbedder::new());
        let service = EmbeddingService::new(MemoryStore::default(), embedder.clone());

        service
            .generate_and_store(&target(1), "combined", "version one")
            .await
            .unwrap();
        let outcome = service
            .generate_and_store(&target(1), "combined", "version two")
            .await
            .unwrap();

        assert!(outcome.is_created());
        let record = outcome.into_record();
        assert_eq!(record.dimensions, 3);
        assert_eq!(record.vector().unwrap().len(), 3);
        assert_eq!(record.token_count, 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let service =
            EmbeddingService::new(MemoryStore::default(), Arc::new(CountingEmbedder::new()));
        let err = service
            .generate_and_store(&target(1), "combined", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let embedder = Arc::new(CountingEmbedder::failing_on("broken"));
        let service = EmbeddingService::new(MemoryStore::default(), embedder.clone());

        let item = |id: u128, content: &str| BatchItem {
            target: target(id),
            field_name: "combined".to_string(),
            content: content.to_string(),
        };
        let items = vec![
            item(1, "first"),
            item(2, "broken"),
            item(3, "third"),
            item(1, "first"),
        ];

        let report = service.batch_generate(&items).await;
        assert_eq!(
            report,
            BatchReport {
                created: 2,
                reused: 1,
                failed: 1
            }
        );
        // One rejected batch call, then one call per distinct pending item
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_batch_sends_new_content_in_one_call() {
        let embedder = Arc::new(CountingEmbedder::new());
        let service = EmbeddingService::new(MemoryStore::default(), embedder.clone());

        service
            .generate_and_store(&target(1), "combined", "already stored")
            .await
            .unwrap();

        let item = |id: u128, content: &str| BatchItem {
            target: target(id),
            field_name: "combined".to_string(),
            content: content.to_string(),
        };
        let items = vec![
            item(1, "already stored"),
            item(2, "second"),
            item(3, "third"),
            item(4, "  "),
        ];

        let report = service.batch_generate(&items).await;
        assert_eq!(
            report,
            BatchReport {
                created: 2,
                reused: 1,
                failed: 1
            }
        );
        assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);
        // Only the earlier single generate_and_store used `embed`
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.store().rows.lock().unwrap().len(), 3);
    }
}
