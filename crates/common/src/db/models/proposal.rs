//! Proposal entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "proposals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub fund_id: Option<Uuid>,

    pub campaign_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", unique)]
    pub slug: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub problem: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub solution: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub status: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub funding_status: Option<String>,

    pub amount_requested: Option<i64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub currency: Option<String>,

    pub funded_at: Option<DateTimeWithTimeZone>,

    pub created_at: Option<DateTimeWithTimeZone>,

    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fund::Entity",
        from = "Column::FundId",
        to = "super::fund::Column::Id"
    )]
    Fund,

    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id"
    )]
    Campaign,
}

impl Related<super::fund::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Fund.def()
    }
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Text used for the `combined` embedding: every non-empty text field,
    /// separated by blank lines.
    pub fn combined_text(&self) -> String {
        [
            Some(self.title.as_str()),
            self.problem.as_deref(),
            self.solution.as_deref(),
            self.content.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    /// Year the proposal was funded, falling back to its creation year
    pub fn funding_year(&self) -> Option<i32> {
        use chrono::Datelike;

        self.funded_at
            .or(self.created_at)
            .map(|at| at.year())
    }

    pub fn is_funded(&self) -> bool {
        self.funded_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn proposal() -> Model {
        Model {
            id: Uuid::from_u128(7),
            fund_id: None,
            campaign_id: None,
            title: "Open-source voting dashboard".to_string(),
            slug: "open-source-voting-dashboard".to_string(),
            problem: Some("Voters lack insight".to_string()),
            solution: Some("  ".to_string()),
            content: Some("Full proposal body".to_string()),
            status: Some("complete".to_string()),
            funding_status: Some("funded".to_string()),
            amount_requested: Some(50_000),
            currency: Some("ADA".to_string()),
            funded_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_combined_text_skips_blank_fields() {
        let text = proposal().combined_text();
        assert_eq!(
            text,
            "Open-source voting dashboard\n\nVoters lack insight\n\nFull proposal body"
        );
    }

    #[test]
    fn test_funding_year_prefers_funded_at() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let mut p = proposal();
        p.created_at = Some(utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(p.funding_year(), Some(2022));
        assert!(!p.is_funded());

        p.funded_at = Some(utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
        assert_eq!(p.funding_year(), Some(2023));
        assert!(p.is_funded());
    }
}
