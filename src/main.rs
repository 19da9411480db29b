use anyhow::Result;
use clap::Parser;

use tx_manager::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    tx_manager::run(cli).await
}
