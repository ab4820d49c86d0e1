use clap::Parser;
use tracing_subscriber::EnvFilter;

use ifu_qc::cli::Cli;
use ifu_qc::commands::run_qc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run_qc(cli)
}
