//! Git credential helper entry point.
//!
//! Git invokes this binary with one of the credential-helper verbs and a
//! `key=value` request block on stdin; `get` answers with a block on
//! stdout. Any unrecovered error exits non-zero with a diagnostic on
//! stderr.

use clap::Parser;
use eyre::Result;

use keybridge::cli::{Cli, Commands};
use keybridge::commands::App;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Load .env overrides if present (development convenience).
    let _ = dotenvy::dotenv();

    keybridge_core::utils::tracing::init_tracing()?;

    let cli = Cli::parse();
    let app = App::new();

    match cli.command {
        Commands::Get => app.get().await,
        Commands::Store => app.store().await,
        Commands::Erase => app.erase().await,
        Commands::Configure => app.configure().await,
        Commands::Unconfigure => app.unconfigure().await,
    }
}
