//! Embedding backfill processor
//!
//! Pages through proposals and generates their `combined` embedding.

use async_trait::async_trait;
use catalyst_common::config::COMBINED_FIELD;
use catalyst_common::db::models::PROPOSAL_ENTITY;
use catalyst_common::db::{ProposalWithContext, Repository};
use catalyst_common::embeddings::{BatchItem, EmbeddingService, EmbeddingStore, EmbeddingTarget};
use catalyst_common::errors::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Where proposals to backfill come from
#[async_trait]
pub trait ProposalSource: Send + Sync {
    async fn list_page(&self, offset: u64, limit: u64) -> Result<Vec<ProposalWithContext>>;

    async fn has_embedding(&self, entity_type: &str, entity_id: Uuid, field: &str) -> Result<bool>;
}

#[async_trait]
impl ProposalSource for Repository {
    async fn list_page(&self, offset: u64, limit: u64) -> Result<Vec<ProposalWithContext>> {
        self.list_proposals_with_context(offset, limit).await
    }

    async fn has_embedding(&self, entity_type: &str, entity_id: Uuid, field: &str) -> Result<bool> {
        Repository::has_embedding(self, entity_type, entity_id, field).await
    }
}

/// Backfill options
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillConfig {
    /// Proposals fetched per page
    pub batch_size: usize,
    /// Embed even when a `combined` embedding already exists
    pub force: bool,
    /// Stop after this many proposals
    pub limit: Option<usize>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            force: false,
            limit: None,
        }
    }
}

/// Totals for one backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub skipped_existing: usize,
    pub skipped_empty: usize,
    pub created: usize,
    pub reused: usize,
    pub failed: usize,
}

impl BackfillReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Embedding backfill processor
pub struct BackfillProcessor<P, S> {
    source: P,
    service: EmbeddingService<S>,
    config: BackfillConfig,
}

impl<P: ProposalSource, S: EmbeddingStore> BackfillProcessor<P, S> {
    pub fn new(source: P, service: EmbeddingService<S>, config: BackfillConfig) -> Self {
        Self {
            source,
            service,
            config,
        }
    }

    /// Run the backfill to completion
    #[instrument(skip(self), fields(force = self.config.force, limit = ?self.config.limit))]
    pub async fn run(&self) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();
        let page_size = self.config.batch_size.max(1);
        let mut offset = 0u64;

        'pages: loop {
            let page = self.source.list_page(offset, page_size as u64).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as u64;

            let mut items = Vec::with_capacity(page.len());
            for ctx in &page {
                if self.config.limit.is_some_and(|limit| report.scanned >= limit) {
                    self.flush(&items, &mut report).await;
                    break 'pages;
                }
                report.scanned += 1;

                if let Some(item) = self.prepare(ctx, &mut report).await {
                    items.push(item);
                }
            }

            self.flush(&items, &mut report).await;
            info!(
                scanned = report.scanned,
                created = report.created,
                failed = report.failed,
                "Backfill progress"
            );

            if page.len() < page_size {
                break;
            }
        }

        Ok(report)
    }

    /// Build the work item for a proposal, or record why it is skipped
    async fn prepare(
        &self,
        ctx: &ProposalWithContext,
        report: &mut BackfillReport,
    ) -> Option<BatchItem> {
        let content = ctx.proposal.combined_text();
        if content.is_empty() {
            debug!(proposal_id = %ctx.proposal.id, "Proposal has no text, skipping");
            report.skipped_empty += 1;
            return None;
        }

        if !self.config.force {
            match self
                .source
                .has_embedding(PROPOSAL_ENTITY, ctx.proposal.id, COMBINED_FIELD)
                .await
            {
                Ok(true) => {
                    report.skipped_existing += 1;
                    return None;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(proposal_id = %ctx.proposal.id, error = %e, "Embedding lookup failed");
                    report.failed += 1;
                    return None;
                }
            }
        }

        Some(BatchItem {
            target: EmbeddingTarget::proposal(ctx),
            field_name: COMBINED_FIELD.to_string(),
            content,
        })
    }

    async fn flush(&self, items: &[BatchItem], report: &mut BackfillReport) {
        if items.is_empty() {
            return;
        }
        let batch = self.service.batch_generate(items).await;
        report.created += batch.created;
        report.reused += batch.reused;
        report.failed += batch.failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_common::db::models::{ModelEmbedding, Proposal};
    use catalyst_common::db::NewEmbedding;
    use catalyst_common::embeddings::{Embedder, MockEmbedder};
    use catalyst_common::errors::AppError;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    fn proposal(n: u128, title: &str) -> ProposalWithContext {
        ProposalWithContext {
            proposal: Proposal {
                id: Uuid::from_u128(n),
                fund_id: None,
                campaign_id: None,
                title: title.to_string(),
                slug: format!("proposal-{n}"),
                problem: None,
                solution: None,
                content: None,
                status: None,
                funding_status: None,
                amount_requested: None,
                currency: None,
                funded_at: None,
                created_at: None,
                updated_at: None,
            },
            fund: None,
            campaign: None,
        }
    }

    struct FakeSource {
        proposals: Vec<ProposalWithContext>,
        embedded: HashSet<Uuid>,
    }

    #[async_trait]
    impl ProposalSource for FakeSource {
        async fn list_page(&self, offset: u64, limit: u64) -> Result<Vec<ProposalWithContext>> {
            Ok(self
                .proposals
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn has_embedding(&self, _t: &str, entity_id: Uuid, _f: &str) -> Result<bool> {
            Ok(self.embedded.contains(&entity_id))
        }
    }

    /// Store that records inserts and fails for one entity
    #[derive(Default)]
    struct RecordingStore {
        inserted: Mutex<Vec<Uuid>>,
        failing: Option<Uuid>,
    }

    #[async_trait]
    impl EmbeddingStore for RecordingStore {
        async fn find_embedding(
            &self,
            _embeddable_type: &str,
            _embeddable_id: Uuid,
            _field_name: &str,
            _content_hash: &str,
            _provider: &str,
            _model: &str,
        ) -> Result<Option<ModelEmbedding>> {
            Ok(None)
        }

        async fn insert_embedding(&self, new: NewEmbedding) -> Result<ModelEmbedding> {
            if self.failing == Some(new.embeddable_id) {
                return Err(AppError::Internal {
                    message: "insert failed".to_string(),
                });
            }
            self.inserted.lock().unwrap().push(new.embeddable_id);
            Ok(ModelEmbedding {
                id: Uuid::new_v4(),
                embeddable_type: new.embeddable_type,
                embeddable_id: new.embeddable_id,
                field_name: new.field_name,
                provider: new.provider,
                model: new.model,
                dimensions: new.vector.len() as i32,
                embedding: None,
                source_text: Some(new.source_text),
                content_hash: new.content_hash,
                token_count: new.token_count,
                metadata: None,
                funding_year: None,
                fund_label: None,
                campaign_title: None,
                is_funded: None,
                amount_requested: None,
                currency: None,
                created_at: chrono::Utc::now().into(),
            })
        }
    }

    fn processor(
        source: FakeSource,
        store: RecordingStore,
        config: BackfillConfig,
    ) -> BackfillProcessor<FakeSource, RecordingStore> {
        let embedder: Arc<dyn Embedder> = Arc::new(MockEmbedder::new(8));
        BackfillProcessor::new(source, EmbeddingService::new(store, embedder), config)
    }

    #[tokio::test]
    async fn test_backfill_skips_existing_and_empty() {
        let source = FakeSource {
            proposals: vec![proposal(1, "Wallet"), proposal(2, "  "), proposal(3, "Oracle")],
            embedded: HashSet::from([Uuid::from_u128(3)]),
        };
        let p = processor(source, RecordingStore::default(), BackfillConfig {
            batch_size: 2,
            ..Default::default()
        });

        let report = p.run().await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                scanned: 3,
                skipped_existing: 1,
                skipped_empty: 1,
                created: 1,
                reused: 0,
                failed: 0,
            }
        );
        assert_eq!(*p.service.store().inserted.lock().unwrap(), vec![Uuid::from_u128(1)]);
    }

    #[tokio::test]
    async fn test_force_and_limit() {
        let source = FakeSource {
            proposals: (1..=5).map(|n| proposal(n, "Tooling")).collect(),
            embedded: (1..=5).map(Uuid::from_u128).collect(),
        };
        let p = processor(source, RecordingStore::default(), BackfillConfig {
            batch_size: 2,
            force: true,
            limit: Some(3),
        });

        let report = p.run().await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.created, 3);
        assert_eq!(report.skipped_existing, 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let source = FakeSource {
            proposals: vec![proposal(1, "A"), proposal(2, "B")],
            embedded: HashSet::new(),
        };
        let store = RecordingStore {
            failing: Some(Uuid::from_u128(1)),
            ..Default::default()
        };
        let p = processor(source, store, BackfillConfig::default());

        let report = p.run().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert!(report.has_failures());
    }
}
