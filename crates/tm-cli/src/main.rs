//! Tidemark CLI - ordered, recorded migrations for document databases

use clap::Parser;
use std::process;

mod cli;
mod commands;
mod migrations;

use cli::Cli;
use commands::common::ExitCode;
use commands::{down, status, unlock, up};

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    // RUST_LOG, when set, overrides the level chosen here
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .init();
}

#[tokio::main]
async fn main() -> process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match &cli.command {
        cli::Commands::Up(args) => up::execute(args, &cli.global).await,
        cli::Commands::Down(args) => down::execute(args, &cli.global).await,
        cli::Commands::Status(args) => status::execute(args, &cli.global).await,
        cli::Commands::Unlock(args) => unlock::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => process::ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(code) => process::ExitCode::from(u8::try_from(code.0).unwrap_or(1)),
            None => {
                eprintln!("Error: {err:#}");
                process::ExitCode::FAILURE
            }
        },
    }
}
