//! # Redis
//!
//! RAM database holding the vote ledger and the caption table.
//!
//! ## Layout
//!
//! - `caption_votes`: list, one JSON vote event per entry, appended with `RPUSH`
//! - `captions`: hash, caption id to JSON `{content, image_id}`
//! - `images`: hash, image id to URL
//!
//! The ledger is never rewritten. Reading it back is a single `LRANGE 0 -1`, and entries that no
//! longer parse are skipped rather than failing the read.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    models::{Caption, CaptionId, VoteEvent, parse_events},
    store::{Store, StoreResult},
};

pub const VOTES_KEY: &str = "caption_votes";
pub const CAPTIONS_KEY: &str = "captions";
pub const IMAGES_KEY: &str = "images";

#[derive(Serialize, Deserialize)]
struct CaptionEntry {
    content: Option<String>,
    image_id: Option<String>,
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        info!("Connected to Redis");

        Ok(Self { connection })
    }

    fn parse_entry(id: &str, raw: &str) -> Option<CaptionEntry> {
        serde_json::from_str(raw)
            .map_err(|e| {
                warn!("Skipping malformed caption {id}: {e}");
            })
            .ok()
    }

    fn join(id: String, raw: &str, images: &HashMap<String, String>) -> Option<Caption> {
        let entry = Self::parse_entry(&id, raw)?;

        Some(Caption {
            image_url: entry.image_id.and_then(|image_id| images.get(&image_id).cloned()),
            content: entry.content,
            id: id.into(),
        })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn append_vote(&self, event: &VoteEvent) -> StoreResult<u64> {
        let mut connection = self.connection.clone();
        let position: u64 = connection
            .rpush(VOTES_KEY, serde_json::to_string(event)?)
            .await?;

        Ok(position)
    }

    async fn ledger(&self) -> StoreResult<(Vec<VoteEvent>, u64)> {
        let mut connection = self.connection.clone();
        let raw: Vec<String> = connection.lrange(VOTES_KEY, 0, -1).await?;
        let position = raw.len() as u64;

        Ok((parse_events(raw), position))
    }

    async fn captions(&self) -> StoreResult<Vec<Caption>> {
        let mut connection = self.connection.clone();
        let entries: HashMap<String, String> = connection.hgetall(CAPTIONS_KEY).await?;
        let images: HashMap<String, String> = connection.hgetall(IMAGES_KEY).await?;

        Ok(entries
            .into_iter()
            .filter_map(|(id, raw)| Self::join(id, &raw, &images))
            .collect())
    }

    async fn caption(&self, id: &CaptionId) -> StoreResult<Option<Caption>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.hget(CAPTIONS_KEY, id.as_str()).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let Some(entry) = Self::parse_entry(id.as_str(), &raw) else {
            return Ok(None);
        };
        let image_url: Option<String> = match entry.image_id {
            Some(image_id) => connection.hget(IMAGES_KEY, image_id).await?,
            None => None,
        };

        Ok(Some(Caption {
            id: id.clone(),
            content: entry.content,
            image_url,
        }))
    }

    async fn insert_caption(&self, content: String, image_url: Option<String>) -> StoreResult<Caption> {
        let mut connection = self.connection.clone();
        let id = CaptionId::generate();
        let image_id = image_url.as_ref().map(|_| Uuid::new_v4().to_string());

        let entry = serde_json::to_string(&CaptionEntry {
            content: Some(content.clone()),
            image_id: image_id.clone(),
        })?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let (Some(image_id), Some(url)) = (&image_id, &image_url) {
            pipe.hset(IMAGES_KEY, image_id, url).ignore();
        }
        pipe.hset(CAPTIONS_KEY, id.as_str(), entry).ignore();

        let _: () = pipe.query_async(&mut connection).await?;

        Ok(Caption {
            id,
            content: Some(content),
            image_url,
        })
    }

    async fn delete_caption(&self, id: &CaptionId) -> StoreResult<bool> {
        let mut connection = self.connection.clone();
        let removed: usize = connection.hdel(CAPTIONS_KEY, id.as_str()).await?;

        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_entry_reads_as_missing() {
        assert!(RedisStore::parse_entry("c1", "not json").is_none());
        assert!(RedisStore::parse_entry("c1", "[1, 2]").is_none());
    }

    #[test]
    fn test_entry_parses() {
        let entry = RedisStore::parse_entry("c1", r#"{"content":"hi","image_id":"i1"}"#).unwrap();

        assert_eq!(entry.content.as_deref(), Some("hi"));
        assert_eq!(entry.image_id.as_deref(), Some("i1"));
    }
}
