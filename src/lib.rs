pub mod bible_books;
pub mod config;
pub mod contract;
pub mod deploy;
pub mod file_utils;
pub mod load_config;
pub mod manager;
pub mod models;
pub mod preprocess;
pub mod resource_container;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use preprocess::do_preprocess;
use resource_container::ResourceContainer;

/// CLI for tx-manager: normalize resource containers for conversion.
#[derive(Parser)]
#[clap(
    name = "tx-manager",
    version,
    about = "Preprocess Door43 resource containers and manage document-conversion jobs"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize a local resource container into canonical per-unit files
    Preprocess {
        /// Path to the source repository tree (holding manifest.yaml)
        #[clap(long)]
        source: PathBuf,
        /// Directory the canonical output is written to
        #[clap(long)]
        output: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Preprocess { source, output } => {
            let rc = ResourceContainer::from_dir(&source)?;
            println!("Preprocessing starting...");
            match do_preprocess(rc, &source, &output) {
                Ok((success, preprocessor)) => {
                    println!("Preprocessing complete (success: {success}).");
                    if let Some(books) = preprocessor.book_list() {
                        println!("Books produced:");
                        for book in &books {
                            println!("  {book}");
                        }
                        if preprocessor.is_multiple_jobs() {
                            println!("Multiple conversion jobs required.");
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Preprocessing failed: {e}");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
