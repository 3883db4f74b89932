//! In-memory [`Store`] for development and tests.
//!
//! Mirrors the Redis layout: the ledger is kept as raw JSON rows so malformed entries are skipped
//! the same way on read. Clones share the same data.
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    models::{Caption, CaptionId, VoteEvent, parse_events},
    store::{Store, StoreError, StoreResult},
};

#[derive(Default)]
struct Inner {
    votes: Vec<String>,
    captions: BTreeMap<CaptionId, Caption>,
    unavailable: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_captions<I>(captions: I) -> Self
    where
        I: IntoIterator<Item = Caption>,
    {
        let store = Self::new();
        store
            .inner
            .write()
            .captions
            .extend(captions.into_iter().map(|caption| (caption.id.clone(), caption)));

        store
    }

    /// Appends a row exactly as given, parseable or not.
    pub fn push_raw(&self, raw: impl Into<String>) {
        self.inner.write().votes.push(raw.into());
    }

    /// While unavailable, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().unavailable = unavailable;
    }

    fn check(&self) -> StoreResult<()> {
        if self.inner.read().unavailable {
            return Err(StoreError::Unavailable);
        }

        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_vote(&self, event: &VoteEvent) -> StoreResult<u64> {
        self.check()?;
        let raw = serde_json::to_string(event)?;

        let mut inner = self.inner.write();
        inner.votes.push(raw);

        Ok(inner.votes.len() as u64)
    }

    async fn ledger(&self) -> StoreResult<(Vec<VoteEvent>, u64)> {
        self.check()?;
        let inner = self.inner.read();

        Ok((parse_events(&inner.votes), inner.votes.len() as u64))
    }

    async fn captions(&self) -> StoreResult<Vec<Caption>> {
        self.check()?;

        Ok(self.inner.read().captions.values().cloned().collect())
    }

    async fn caption(&self, id: &CaptionId) -> StoreResult<Option<Caption>> {
        self.check()?;

        Ok(self.inner.read().captions.get(id).cloned())
    }

    async fn insert_caption(&self, content: String, image_url: Option<String>) -> StoreResult<Caption> {
        self.check()?;
        let caption = Caption {
            id: CaptionId::generate(),
            content: Some(content),
            image_url,
        };

        self.inner
            .write()
            .captions
            .insert(caption.id.clone(), caption.clone());

        Ok(caption)
    }

    async fn delete_caption(&self, id: &CaptionId) -> StoreResult<bool> {
        self.check()?;

        Ok(self.inner.write().captions.remove(id).is_some())
    }
}
