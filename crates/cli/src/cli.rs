use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use supplysync_observability::LogFormat;

/// Supplier catalog synchronization
#[derive(Parser, Debug)]
#[command(name = "supplysync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log output format (overrides SUPPLYSYNC_LOG_FORMAT)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the full catalog feed: create, update and soft-delete items
    FullSync(RunArgs),

    /// Apply stock levels from the XML stock feed to known items
    QuickStock(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Feed file to read
    #[arg(long)]
    pub feed: PathBuf,

    /// Built-in supplier profile (overrides SUPPLYSYNC_PROFILE)
    #[arg(long, conflicts_with = "profile_file")]
    pub profile: Option<String>,

    /// JSON supplier profile file
    #[arg(long)]
    pub profile_file: Option<PathBuf>,

    /// JSON store document (overrides SUPPLYSYNC_STORE_PATH)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Audit log directory (overrides SUPPLYSYNC_AUDIT_DIR)
    #[arg(long)]
    pub audit_dir: Option<PathBuf>,
}
