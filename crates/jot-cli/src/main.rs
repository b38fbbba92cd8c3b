//! Jot CLI - capture short notes offline, sync them when the network is back

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::resolve_config;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

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
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_directive()?))
        .init();

    let cli = Cli::parse();

    // Needs neither the database nor the network
    if let Some(Commands::Completions { shell, output }) = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = resolve_config(cli.db_path, cli.api_url.as_deref(), cli.offline)?;
    tracing::debug!(db_path = %config.db_path.display(), "Using local replica");

    match cli.command {
        Some(Commands::Add { text }) => run_add(&text, &config).await?,
        Some(Commands::List { limit, json }) => run_list(limit, json, &config).await?,
        Some(Commands::Delete { key }) => run_delete(&key, &config).await?,
        Some(Commands::Sync) => run_sync(&config).await?,
        Some(Commands::Watch { limit }) => run_watch(limit, &config).await?,
        Some(Commands::Completions { .. }) => {}
        None => {
            // Quick capture mode: jot "my thought"
            if cli.text.is_empty() {
                Cli::command().print_help()?;
                println!();
            } else {
                run_add(&cli.text, &config).await?;
            }
        }
    }

    Ok(())
}

fn log_directive() -> Result<Directive, CliError> {
    "jot=info"
        .parse()
        .map_err(|error| CliError::Logging(format!("{error}")))
}
