//! docpipe CLI: document processing pipeline for scraped sources.
//!
//! Takes the files a scraper downloaded, derives canonical metadata and
//! filenames, archives them with verification, and optionally feeds a RAG
//! collection.

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
