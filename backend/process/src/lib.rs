//! # Caption Processing
//!
//! Maintenance commands run against the live Redis ledger.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `import <file>` | Bulk create captions from a JSON array of `{content, image_url}` |
//! | `delete <id>` | Delete one caption; its votes stay in the ledger as orphans |
//! | `leaderboard [--limit N]` | Print the aggregated leaderboard |
//! | `payload <caption_id> <value>` | Encode a vote body, for poking the vote endpoints with curl |
//!
//! ## Import
//! 1. Read and parse the whole file up front, so a malformed file writes nothing
//! 2. Sanitize each entry: control characters stripped, whitespace collapsed, trimmed
//! 3. Skip entries left without content
//! 4. Create an image record then the caption referencing it, one entry at a time
//!
//! A failure midway leaves the entries before it in place. Re-running the import duplicates them,
//! since captions carry no natural key.
use std::{fs, path::Path};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use ledger::{CaptionId, RedisStore, Store, VotePayload, aggregate};
use prost::Message;

pub mod models;
pub mod utils;

use models::ImportEntry;
use utils::sanitize_entry;

pub async fn connect(redis_url: &str) -> anyhow::Result<RedisStore> {
    RedisStore::connect(redis_url)
        .await
        .with_context(|| format!("Failed to connect to {redis_url}"))
}

pub fn read_entries(path: &Path) -> anyhow::Result<Vec<ImportEntry>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&raw).with_context(|| format!("Malformed import file {}", path.display()))
}

pub async fn import_captions(store: &dyn Store, entries: &[ImportEntry]) -> anyhow::Result<usize> {
    println!("Loaded Entries: {}\n", entries.len());

    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let mut created = 0;

    for entry in entries {
        pb.inc(1);

        let Some(entry) = sanitize_entry(entry) else {
            #[cfg(feature = "verbose")]
            println!("Skipping empty entry");
            continue;
        };

        let caption = store.insert_caption(entry.content, entry.image_url).await?;
        pb.set_message(caption.id.to_string());

        #[cfg(feature = "verbose")]
        println!("New caption! {}", caption.id);

        created += 1;
    }

    pb.finish_with_message("Done");

    println!("\nCreated Captions: {created}");
    println!("Skipped Entries: {}", entries.len() - created);

    Ok(created)
}

pub async fn delete_caption(store: &dyn Store, id: &str) -> anyhow::Result<()> {
    let id = CaptionId::from(id);

    if !store.delete_caption(&id).await? {
        bail!("Caption {id} not found");
    }

    println!("Deleted caption {id}");
    Ok(())
}

pub async fn print_leaderboard(store: &dyn Store, limit: Option<usize>) -> anyhow::Result<()> {
    let snapshot = store.snapshot().await?;
    let rows = aggregate(&snapshot.votes, &snapshot.caption_set());

    println!("Ledger Events: {}", snapshot.votes.len());
    println!("Ranked Captions: {}\n", rows.len());

    for (rank, row) in rows.iter().take(limit.unwrap_or(usize::MAX)).enumerate() {
        println!(
            "{:>3}. {:>5} (+{} / -{})  {}  [{}]",
            rank + 1,
            row.tally.score,
            row.tally.up,
            row.tally.down,
            row.content,
            row.caption_id
        );
    }

    Ok(())
}

pub fn encode_payload(caption_id: &str, vote_value: i32) -> anyhow::Result<Vec<u8>> {
    if !matches!(vote_value, 1 | -1) {
        bail!("Vote value must be 1 or -1, got {vote_value}");
    }

    Ok(VotePayload {
        caption_id: caption_id.to_string(),
        vote_value,
    }
    .encode_to_vec())
}

pub fn write_payload(bytes: &[u8], out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => println!(
            "{}",
            bytes.iter().map(|byte| format!("{byte:02x}")).collect::<String>()
        ),
    }

    Ok(())
}
