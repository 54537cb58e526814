//! neuraltheft CLI — ranked leaderboard harvester.
//!
//! Walks the tracker.gg leaderboard for one region, resolves each player's
//! account identifier, and stores the result in a local SQLite database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // Before parsing, so `--token`'s env fallback sees API_KEY from .env.
    let dotenv = neuraltheft_shared::load_dotenv()?;
    let cli = Cli::parse();
    let level = cli.log_level();
    commands::init_tracing(&cli, level);
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
    commands::run(cli, level).await
}
