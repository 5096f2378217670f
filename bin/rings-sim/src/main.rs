//! Latency-ring gossip overlay simulator.

mod cli;
mod logging;
mod sim;

use clap::Parser;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = cli::Cli::parse();
    logging::init_logging(&cli.logs)?;
    sim::run(cli).await
}
