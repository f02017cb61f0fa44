use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::ledger::DuplicatePolicy;
use crate::store::RetryPolicy;

#[derive(Parser, Debug)]
#[command(name = "wordle-leaderboard")]
#[command(about = "Ingest shared Wordle results and serve the leaderboard")]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Postgres connection string; the in-memory store is used when unset
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Total tries for a store call that fails transiently
    #[arg(long, env = "STORE_MAX_RETRIES", default_value_t = 4)]
    pub max_retries: u32,

    #[arg(long, env = "STORE_RETRY_BASE_MS", default_value_t = 100)]
    pub retry_base_ms: u64,
}

impl StoreArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_ms))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Ingest one uploaded score batch
    IngestScores {
        #[arg(long, env = "BATCH_ROOT", default_value = "./batches")]
        root: PathBuf,

        #[arg(long)]
        bucket: String,

        #[arg(long)]
        object: String,

        /// keep-first or keep-latest
        #[arg(long, env = "DUPLICATE_POLICY", default_value_t = DuplicatePolicy::KeepFirst)]
        policy: DuplicatePolicy,

        #[arg(long, env = "INGEST_WORKERS", default_value_t = 8)]
        workers: usize,
    },

    /// Ingest one uploaded username batch
    IngestProfiles {
        #[arg(long, env = "BATCH_ROOT", default_value = "./batches")]
        root: PathBuf,

        #[arg(long)]
        bucket: String,

        #[arg(long)]
        object: String,
    },

    /// Serve the reporting API
    Serve {
        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
    },
}
