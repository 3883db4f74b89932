//! # Ledger
//!
//! Shared vote ledger types for the meme court.
//!
//! ## Contents
//!
//! - [`models`]: captions, vote events, tallies, leaderboard rows and change notifications
//! - [`aggregate`]: pure aggregation of a ledger snapshot into a ranked leaderboard
//! - [`projection`]: live leaderboard kept in step with change notifications
//! - [`payloads`]: protobuf bodies exchanged with the frontend
//! - [`store`]: the vote ledger storage seam, with Redis ([`database`]) and in-memory ([`memory`]) backends
//!
//! ## Ranking
//!
//! Rows are ordered by score, highest first. Equal scores fall back to caption id ascending so
//! that aggregation and incremental patching always agree on the order.
//!
//! ## Duplicate votes
//!
//! Vote events carry no idempotency key. The same voter may vote on the same caption any number
//! of times and every event counts.

pub mod aggregate;
pub mod database;
pub mod memory;
pub mod models;
pub mod payloads;
pub mod projection;
pub mod store;

pub use aggregate::{aggregate, rank, tally};
pub use database::RedisStore;
pub use memory::MemoryStore;
pub use models::{
    Caption, CaptionId, CaptionInfo, CaptionSet, ChangeNotification, LeaderboardRow, LedgerChange,
    Tally, VoteEvent, parse_events,
};
pub use payloads::{VotePayload, get_vote_from_bytes};
pub use projection::{Frame, Patched, Projection, Strategy};
pub use store::{LedgerSnapshot, Store, StoreError, StoreResult};
