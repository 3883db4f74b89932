//! # Store
//!
//! Storage seam for the vote ledger and the caption table.
//!
//! Components receive an `Arc<dyn Store>` when they are built instead of reaching for a shared
//! client, so tests can hand them a [`MemoryStore`](crate::MemoryStore).
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`append_vote`](Store::append_vote) | Append one event, returning the new ledger position |
//! | [`ledger`](Store::ledger) | Every parseable event, in append order, with the current position |
//! | [`votes`](Store::votes) | Every parseable event, in append order |
//! | [`captions`](Store::captions) | Every caption joined with its image URL |
//! | [`caption`](Store::caption) | One caption by id |
//! | [`insert_caption`](Store::insert_caption) | Create an image record and a caption referencing it |
//! | [`delete_caption`](Store::delete_caption) | Remove a caption, leaving its votes behind |
//! | [`snapshot`](Store::snapshot) | Votes and captions together, for aggregation |
//!
//! ## Positions
//!
//! The position of a ledger is the number of rows in it, malformed ones included. Rows are never
//! removed, so the position after an append identifies that append, and any snapshot with an equal
//! or greater position already contains it.
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Caption, CaptionId, CaptionSet, VoteEvent};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable")]
    Unavailable,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Debug, Default)]
pub struct LedgerSnapshot {
    pub votes: Vec<VoteEvent>,
    pub captions: Vec<Caption>,
    pub position: u64,
}

impl LedgerSnapshot {
    pub fn caption_set(&self) -> CaptionSet {
        self.captions.iter().cloned().collect()
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn append_vote(&self, event: &VoteEvent) -> StoreResult<u64>;

    async fn ledger(&self) -> StoreResult<(Vec<VoteEvent>, u64)>;

    async fn votes(&self) -> StoreResult<Vec<VoteEvent>> {
        Ok(self.ledger().await?.0)
    }

    async fn captions(&self) -> StoreResult<Vec<Caption>>;

    async fn caption(&self, id: &CaptionId) -> StoreResult<Option<Caption>> {
        Ok(self
            .captions()
            .await?
            .into_iter()
            .find(|caption| &caption.id == id))
    }

    async fn insert_caption(&self, content: String, image_url: Option<String>) -> StoreResult<Caption>;

    /// Returns whether a caption was removed.
    async fn delete_caption(&self, id: &CaptionId) -> StoreResult<bool>;

    async fn snapshot(&self) -> StoreResult<LedgerSnapshot> {
        let (votes, position) = self.ledger().await?;
        let captions = self.captions().await?;

        Ok(LedgerSnapshot {
            votes,
            captions,
            position,
        })
    }
}
