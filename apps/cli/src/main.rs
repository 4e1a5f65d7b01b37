//! lexenrich CLI: batch enrichment of lexical entry documents.
//!
//! Reads lexical entries from a libSQL table, expands each short definition
//! through a chat-completion service, and writes the merged document back.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
