use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dupsweep")]
#[command(about = "Find and remove duplicate files within and across folders", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Hash store location (default: ./.dupsweep_cache/hashes.db)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Remove duplicates within one folder
    Dedupe {
        root: PathBuf,
        /// Folder label to store this tree under (default: the configured first label)
        #[arg(long)]
        label: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Remove duplicates between two folders
    Cross {
        first: PathBuf,
        second: Option<PathBuf>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Display hash store statistics
    CacheStats,
    /// Delete every entry in the hash store
    ClearCache {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// List stored files carrying a given hash
    FindHash {
        hash: String,
        /// Only rows stored under this folder label
        #[arg(long)]
        label: Option<String>,
    },
    /// Print configuration values
    PrintConfig,
}

impl Cli {
    /// Subcommand name as typed, for naming the log file.
    pub fn command_name(&self) -> &'static str {
        match &self.command {
            Some(Commands::Dedupe { .. }) => "dedupe",
            Some(Commands::Cross { .. }) => "cross",
            Some(Commands::CacheStats) => "cache-stats",
            Some(Commands::ClearCache { .. }) => "clear-cache",
            Some(Commands::FindHash { .. }) => "find-hash",
            Some(Commands::PrintConfig) | None => "dupsweep",
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Delete files instead of only reporting them
    #[arg(long)]
    pub execute: bool,

    /// Skip the confirmation prompt in execute mode
    #[arg(long)]
    pub yes: bool,

    /// Ignore files smaller than this many bytes
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,

    /// Consider image files too (skipped by default)
    #[arg(long)]
    pub include_images: bool,

    /// Hashing threads: 1 = sequential, 0 = one per core
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Write one row per group member to this CSV file
    #[arg(long, value_name = "PATH")]
    pub report_csv: Option<PathBuf>,
}
