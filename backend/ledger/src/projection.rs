//! # Leaderboard Projection
//!
//! Live leaderboard for one viewer, reconciled against change notifications.
//!
//! ## Strategies
//!
//! - **Patch**: apply the delta carried by each notification to the matching row, creating the row
//!   from the caption side-table if needed, then re-rank. Cheap, but a dropped notification leaves the
//!   projection diverged until something forces a rebuild.
//! - **Rebuild**: treat any notification as "something changed", refetch the ledger and aggregate
//!   from scratch. The fetch happens outside this type, see [`Projection::rebuild`].
//!
//! ## Positions
//!
//! A projection built from a [`LedgerSnapshot`] remembers the snapshot's ledger position. A change
//! at or below that position is already in the rows and is skipped, so a vote landing between
//! subscribing and the initial fetch is counted once. A change voting on a caption missing from the
//! side-table is not applied either; the caller refetches, which picks up captions created after
//! the projection was built.
//!
//! Both paths re-rank with the same ordering as [`aggregate`], so a patched projection over a
//! lossless feed equals the aggregate of the same ledger.
//!
//! Every reconciliation swaps the rows wholesale through `&mut self`; readers never observe a
//! half-applied update.
use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::{
    aggregate::{aggregate, rank},
    models::{CaptionSet, ChangeNotification, LeaderboardRow, LedgerChange, Tally, VoteEvent},
    store::LedgerSnapshot,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Patch,
    Rebuild,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patch" => Ok(Self::Patch),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(format!("unknown reconcile strategy `{other}`")),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch => f.write_str("patch"),
            Self::Rebuild => f.write_str("rebuild"),
        }
    }
}

/// What the render layer gets: the ranked rows plus the live counter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub received: u64,
    pub leaderboard: Vec<LeaderboardRow>,
}

/// Outcome of [`Projection::apply_change`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Patched {
    Applied,
    /// Already counted by the snapshot the projection was built from.
    Stale,
    /// Votes on a caption the side-table has never seen; needs a refetch.
    UnknownCaption,
}

#[derive(Clone, Debug, Default)]
pub struct Projection {
    captions: CaptionSet,
    rows: Vec<LeaderboardRow>,
    received: u64,
    position: u64,
}

impl Projection {
    pub fn new(events: &[VoteEvent], captions: CaptionSet) -> Self {
        Self {
            rows: aggregate(events, &captions),
            captions,
            received: 0,
            position: 0,
        }
    }

    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Self {
        Self {
            position: snapshot.position,
            ..Self::new(&snapshot.votes, snapshot.caption_set())
        }
    }

    /// Ledger position of the last snapshot folded in.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn rows(&self) -> &[LeaderboardRow] {
        &self.rows
    }

    pub fn captions(&self) -> &CaptionSet {
        &self.captions
    }

    /// Notifications received since the projection was created, whichever captions they touched.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn observe(&mut self, notifications: u64) {
        self.received = self.received.saturating_add(notifications);
    }

    pub fn patch(&mut self, change: &ChangeNotification) {
        match change {
            ChangeNotification::Insert { new } => self.apply(new),
            ChangeNotification::Update { old, new } => {
                self.revert(old);
                self.apply(new);
            }
            ChangeNotification::Delete { old } => self.revert(old),
        }

        rank(&mut self.rows);
    }

    /// Patches one positioned change, unless the snapshot already holds it or it needs a refetch.
    pub fn apply_change(&mut self, change: &LedgerChange) -> Patched {
        if change.position <= self.position {
            return Patched::Stale;
        }

        let unknown = change
            .change
            .incoming()
            .is_some_and(|event| !self.captions.contains(&event.caption_id));
        if unknown {
            return Patched::UnknownCaption;
        }

        self.patch(&change.change);
        Patched::Applied
    }

    /// Replaces the projection with a fresh aggregate of the given ledger snapshot.
    pub fn rebuild(&mut self, events: &[VoteEvent], captions: CaptionSet) {
        self.rows = aggregate(events, &captions);
        self.captions = captions;
    }

    pub fn resync(&mut self, snapshot: &LedgerSnapshot) {
        self.rebuild(&snapshot.votes, snapshot.caption_set());
        self.position = snapshot.position;
    }

    pub fn frame(&self) -> Frame {
        Frame {
            received: self.received,
            leaderboard: self.rows.clone(),
        }
    }

    fn apply(&mut self, event: &VoteEvent) {
        if let Some(row) = self
            .rows
            .iter_mut()
            .find(|row| row.caption_id == event.caption_id)
        {
            row.tally.apply(event.vote_value);
            return;
        }

        // orphan: the caption is unknown to this viewer
        let Some(info) = self.captions.get(&event.caption_id) else {
            return;
        };

        let mut tally = Tally::default();
        tally.apply(event.vote_value);

        self.rows.push(LeaderboardRow {
            caption_id: event.caption_id.clone(),
            content: info.content.clone(),
            image_url: info.image_url.clone(),
            tally,
        });
    }

    fn revert(&mut self, event: &VoteEvent) {
        let Some(index) = self
            .rows
            .iter()
            .position(|row| row.caption_id == event.caption_id)
        else {
            return;
        };

        let tally = &mut self.rows[index].tally;
        tally.revert(event.vote_value);

        if tally.votes == 0 {
            self.rows.remove(index);
        }
    }
}
