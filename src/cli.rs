use clap::Parser;
use std::path::PathBuf;

/// Command-line options for mailsift.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Fetch Gmail messages into per-message folders and drop duplicates")]
pub struct Cli {
    /// Gmail search query (same operators as the Gmail search box).
    #[arg(long, short)]
    pub query: Option<String>,

    /// Mailbox owner; `me` means the authenticated user.
    #[arg(long)]
    pub user_id: Option<String>,

    /// Destination root; one folder per message is created below it.
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Messages fetched and extracted at the same time.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// TOML config file to load before environment variables.
    #[arg(long, env = "MAILSIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip the duplicate-removal pass after ingestion.
    #[arg(long, conflicts_with = "dedupe_only")]
    pub no_dedupe: bool,

    /// Only remove duplicate folders under the destination; fetch nothing.
    #[arg(long)]
    pub dedupe_only: bool,

    /// Report duplicates without deleting them.
    #[arg(long)]
    pub dry_run: bool,

    /// Put every subject-less message into one shared INBOX folder.
    #[arg(long)]
    pub shared_inbox: bool,
}
