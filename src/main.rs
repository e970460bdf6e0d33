//! CLI entry point for the attachment bundler.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod cli;
mod output;

use app::exit_handler::RUN_ERROR_EXIT_CODE;
use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    match app::run(args).await {
        Ok(exit) => exit.into(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(RUN_ERROR_EXIT_CODE)
        }
    }
}
