use std::path::PathBuf;

use clap::{Parser, Subcommand};
use process::models::DEFAULT_REDIS_URL;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "REDIS_URL", default_value = DEFAULT_REDIS_URL, global = true)]
    redis_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create captions from a JSON array of {content, image_url}
    Import { file: PathBuf },

    /// Delete one caption
    Delete { id: String },

    /// Print the aggregated leaderboard
    Leaderboard {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Encode a protobuf vote body
    Payload {
        caption_id: String,

        #[arg(allow_hyphen_values = true)]
        vote_value: i32,

        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Import { file } => {
            let entries = process::read_entries(&file)?;
            let store = process::connect(&args.redis_url).await?;
            process::import_captions(&store, &entries).await?;
        }
        Command::Delete { id } => {
            let store = process::connect(&args.redis_url).await?;
            process::delete_caption(&store, &id).await?;
        }
        Command::Leaderboard { limit } => {
            let store = process::connect(&args.redis_url).await?;
            process::print_leaderboard(&store, limit).await?;
        }
        Command::Payload {
            caption_id,
            vote_value,
            out,
        } => {
            let bytes = process::encode_payload(&caption_id, vote_value)?;
            process::write_payload(&bytes, out.as_deref())?;
        }
    }

    Ok(())
}
