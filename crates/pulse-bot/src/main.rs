mod bootstrap_helpers;
mod cli_args;
mod startup;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::{init_tracing, report_dotenv};
use crate::cli_args::Cli;
use crate::startup::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Existing environment variables take precedence over `.env`.
    let dotenv_result = dotenv::dotenv();
    init_tracing();
    report_dotenv(dotenv_result);
    let cli = Cli::parse();
    let result = run_cli(cli).await;
    if let Err(error) = &result {
        tracing::error!(error = %format!("{error:#}"), "pulse bot stopped");
    }
    result
}
