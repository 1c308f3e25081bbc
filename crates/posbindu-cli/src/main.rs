//! Posbindu CLI - register patients and record screenings from the terminal
//!
//! Works without connectivity: writes that cannot reach the remote are queued
//! locally and pushed by `posbindu sync` or `posbindu watch`.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;
mod probe;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::GlobalArgs;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::exam::run_exam;
use crate::commands::patient::run_patient;
use crate::commands::queue::run_queue;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "posbindu=info,posbindu_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let args = GlobalArgs::new(cli.db_path, cli.profile.clone(), cli.offline);

    match cli.command {
        Some(Commands::Patient { command }) => run_patient(command, &args).await?,
        Some(Commands::Exam { command }) => run_exam(command, &args).await?,
        Some(Commands::Queue { json }) => run_queue(json, &args).await?,
        Some(Commands::Status { json }) => run_status(json, &args).await?,
        Some(Commands::Sync) => run_sync(&args).await?,
        Some(Commands::Watch { interval }) => run_watch(interval, &args).await?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        Some(Commands::Config { command }) => run_config(command, cli.profile.as_deref())?,
        Some(Commands::Auth { command }) => run_auth(command, cli.profile.as_deref())?,
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
