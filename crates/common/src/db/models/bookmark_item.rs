//! Bookmark item entity
//!
//! Rows of a user's bookmark collection. Swipe collections store one row per
//! swiped proposal with the swipe direction recorded in `vote`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Vote recorded on a bookmark item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Yes,
    Abstain,
    No,
}

impl Vote {
    pub fn as_i16(self) -> i16 {
        match self {
            Vote::Yes => 1,
            Vote::Abstain => 0,
            Vote::No => -1,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(Vote::Yes),
            0 => Some(Vote::Abstain),
            -1 => Some(Vote::No),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookmark_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub bookmark_collection_id: Uuid,

    pub user_id: Option<Uuid>,

    /// Owning model type tag, e.g. the proposal entity type
    #[sea_orm(column_type = "Text")]
    pub model_type: String,

    pub model_id: Uuid,

    pub vote: Option<i16>,

    pub created_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn vote(&self) -> Option<Vote> {
        self.vote.and_then(Vote::from_i16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_codes() {
        for vote in [Vote::Yes, Vote::Abstain, Vote::No] {
            assert_eq!(Vote::from_i16(vote.as_i16()), Some(vote));
        }
        assert_eq!(Vote::from_i16(2), None);
    }
}
