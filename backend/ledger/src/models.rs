use std::{
    collections::{HashMap, hash_map},
    fmt,
};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptionId(String);

impl CaptionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CaptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One row of the append-only vote ledger.
///
/// `vote_value` is not validated here. Writers only ever append `+1` or `-1`, but older or
/// foreign rows are summed as they are.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub caption_id: CaptionId,
    #[serde(default, rename = "profile_id")]
    pub voter_id: String,
    pub vote_value: i64,
}

impl VoteEvent {
    pub fn new(caption_id: impl Into<CaptionId>, voter_id: impl Into<String>, vote_value: i64) -> Self {
        Self {
            caption_id: caption_id.into(),
            voter_id: voter_id.into(),
            vote_value,
        }
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Parses raw ledger rows, skipping any that are not a caption/value pair.
pub fn parse_events<I, S>(raw: I) -> Vec<VoteEvent>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut skipped = 0usize;

    let events = raw
        .into_iter()
        .filter_map(|row| {
            let event = VoteEvent::from_json(row.as_ref());
            if event.is_none() {
                skipped += 1;
            }
            event
        })
        .collect();

    if skipped > 0 {
        debug!("Skipped {skipped} malformed vote events");
    }

    events
}

/// Caption joined with its image, as read from storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub id: CaptionId,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CaptionInfo {
    pub content: String,
    pub image_url: Option<String>,
}

/// Captions eligible for display and voting, keyed by id.
///
/// Captions without content never make it in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptionSet(HashMap<CaptionId, CaptionInfo>);

impl CaptionSet {
    pub fn get(&self, id: &CaptionId) -> Option<&CaptionInfo> {
        self.0.get(id)
    }

    pub fn contains(&self, id: &CaptionId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, CaptionId, CaptionInfo> {
        self.0.iter()
    }
}

impl FromIterator<Caption> for CaptionSet {
    fn from_iter<T: IntoIterator<Item = Caption>>(captions: T) -> Self {
        Self(
            captions
                .into_iter()
                .filter_map(|caption| {
                    let content = caption.content?;
                    Some((
                        caption.id,
                        CaptionInfo {
                            content,
                            image_url: caption.image_url,
                        },
                    ))
                })
                .collect(),
        )
    }
}

/// Up/down summary for one caption. Always derived from the ledger, never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub up: u64,
    pub down: u64,
    pub score: i64,
    /// Number of events folded in, zero-valued ones included.
    pub votes: u64,
}

impl Tally {
    pub fn apply(&mut self, vote_value: i64) {
        if vote_value > 0 {
            self.up = self.up.saturating_add(vote_value.unsigned_abs());
        } else if vote_value < 0 {
            self.down = self.down.saturating_add(vote_value.unsigned_abs());
        }

        self.votes = self.votes.saturating_add(1);
        self.rescore();
    }

    pub fn revert(&mut self, vote_value: i64) {
        if vote_value > 0 {
            self.up = self.up.saturating_sub(vote_value.unsigned_abs());
        } else if vote_value < 0 {
            self.down = self.down.saturating_sub(vote_value.unsigned_abs());
        }

        self.votes = self.votes.saturating_sub(1);
        self.rescore();
    }

    fn rescore(&mut self) {
        let up = i64::try_from(self.up).unwrap_or(i64::MAX);
        let down = i64::try_from(self.down).unwrap_or(i64::MAX);

        self.score = up - down;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    #[serde(rename = "id")]
    pub caption_id: CaptionId,
    pub content: String,
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub tally: Tally,
}

/// Change feed entry for the vote ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeNotification {
    Insert { new: VoteEvent },
    Update { old: VoteEvent, new: VoteEvent },
    Delete { old: VoteEvent },
}

impl ChangeNotification {
    /// The event the change adds to the ledger, if any.
    pub fn incoming(&self) -> Option<&VoteEvent> {
        match self {
            Self::Insert { new } | Self::Update { new, .. } => Some(new),
            Self::Delete { .. } => None,
        }
    }
}

/// A change stamped with the ledger position it produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerChange {
    pub position: u64,
    pub change: ChangeNotification,
}
