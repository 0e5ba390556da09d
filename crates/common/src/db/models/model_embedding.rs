//! Model embedding entity
//!
//! One row per (entity, field, provider, model, content hash). The vector
//! column is a pgvector `vector`; it is read as text (`embedding::text`) and
//! written through raw statements with a `::vector` cast.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "model_embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Entity type tag of the owner
    #[sea_orm(column_type = "Text")]
    pub embeddable_type: String,

    pub embeddable_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub field_name: String,

    #[sea_orm(column_type = "Text")]
    pub provider: String,

    #[sea_orm(column_type = "Text")]
    pub model: String,

    pub dimensions: i32,

    /// pgvector embedding in text form ("[0.1,0.2,...]")
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub source_text: Option<String>,

    /// SHA-256 hex digest of `source_text`
    #[sea_orm(column_type = "Text")]
    pub content_hash: String,

    pub token_count: i32,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    pub funding_year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub fund_label: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub campaign_title: Option<String>,

    pub is_funded: Option<bool>,

    pub amount_requested: Option<i64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub currency: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse the stored vector.
    ///
    /// Returns `None` when the column is null, unparseable, or its length
    /// disagrees with `dimensions`.
    pub fn vector(&self) -> Option<Vec<f32>> {
        let vector = self.embedding.as_deref().and_then(parse_vector)?;
        (vector.len() == self.dimensions as usize).then_some(vector)
    }
}

/// Render a vector in pgvector text format
pub fn format_vector(vector: &[f32]) -> String {
    format!(
        "[{}]",
        vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Parse a pgvector text literal ("[1,2,3]"); `None` on any malformed value
pub fn parse_vector(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(embedding: Option<&str>, dimensions: i32) -> Model {
        Model {
            id: Uuid::nil(),
            embeddable_type: "proposal".to_string(),
            embeddable_id: Uuid::from_u128(1),
            field_name: "combined".to_string(),
            provider: "mock".to_string(),
            model: "mock-embedding".to_string(),
            dimensions,
            embedding: embedding.map(str::to_string),
            source_text: None,
            content_hash: String::new(),
            token_count: 0,
            metadata: None,
            funding_year: None,
            fund_label: None,
            campaign_title: None,
            is_funded: None,
            amount_requested: None,
            currency: None,
            created_at: chrono::Utc::now().into(),
        }
    }

    #[test]
    fn test_format_vector() {
        assert_eq!(format_vector(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
    }

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("[1, 0.5,-2]"), Some(vec![1.0, 0.5, -2.0]));
        assert_eq!(parse_vector("[]"), Some(vec![]));
        assert_eq!(parse_vector("[1,abc]"), None);
    }

    #[test]
    fn test_vector_checks_dimensions() {
        assert_eq!(record(Some("[1,0,0]"), 3).vector(), Some(vec![1.0, 0.0, 0.0]));
        assert_eq!(record(Some("[1,0,0]"), 4).vector(), None);
        assert_eq!(record(None, 3).vector(), None);
    }
}
