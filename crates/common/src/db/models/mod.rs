//! SeaORM entity models
//!
//! Tables shared with the Catalyst Explorer web application

mod bookmark_item;
mod campaign;
mod fund;
mod model_embedding;
mod proposal;

pub use bookmark_item::{
    Entity as BookmarkItemEntity,
    Model as BookmarkItem,
    ActiveModel as BookmarkItemActiveModel,
    Column as BookmarkItemColumn,
    Vote,
};

pub use campaign::{
    Entity as CampaignEntity,
    Model as Campaign,
    Column as CampaignColumn,
};

pub use fund::{
    Entity as FundEntity,
    Model as Fund,
    Column as FundColumn,
};

pub use model_embedding::{
    Entity as ModelEmbeddingEntity,
    Model as ModelEmbedding,
    Column as ModelEmbeddingColumn,
    format_vector,
    parse_vector,
};

pub use proposal::{
    Entity as ProposalEntity,
    Model as Proposal,
    Column as ProposalColumn,
};

/// Entity type tag for proposals, as written by the web application
pub const PROPOSAL_ENTITY: &str = "App\\Models\\Proposal";
