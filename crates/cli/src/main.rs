//! supplysync - supplier catalog synchronization
//!
//! Mirrors a supplier's catalog feed into a local JSON store:
//! - `full-sync` reconciles the complete delimited feed
//! - `quick-stock` applies the XML stock level feed to known items

use anyhow::Context;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};
use supplysync_infra::{CancellationToken, SyncConfig};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = SyncConfig::from_env().context("reading SUPPLYSYNC_* environment")?;
    supplysync_observability::init_with(cli.log_format.unwrap_or(env.log_format));

    // Ctrl-C stops between rows; the run still closes its scope and flushes the store.
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "interrupt handler not installed");
    }

    match &cli.command {
        Commands::FullSync(args) => {
            commands::full_sync(args, &commands::resolve_config(args, env), &cancel)
        }
        Commands::QuickStock(args) => {
            commands::quick_stock(args, &commands::resolve_config(args, env), &cancel)
        }
    }
}
