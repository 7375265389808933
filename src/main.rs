mod app;
mod cli;
mod commands;
mod config;
mod constants;
mod error;
mod executor;
mod manager;
mod process;
mod prompt;
mod resolver;
mod revision;
mod session;
mod shell;
mod translate;
mod ui;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::Settings;
use constants::EXIT_INTERRUPTED;
use error::ManagerError;
use std::io;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = Settings::load()?;
    commands::run(cli, settings)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    let interrupted = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ManagerError>(),
            Some(ManagerError::Interrupted)
        )
    });
    if interrupted { EXIT_INTERRUPTED } else { 1 }
}
