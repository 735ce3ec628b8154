use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use coninco_cli::commands::{bot, calendar, events};
use coninco_cli::{Cli, Commands, Config};

/// Load and validate config, ensuring the data directories exist.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    config.validate().context("invalid configuration")?;
    config.ensure_directories()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Some(Commands::Run { no_schedule }) => {
            let config = load_config(cli.config.as_deref())?;
            bot::run(&config, no_schedule)?;
        }
        Some(Commands::Calendar {
            days,
            overwrite,
            channel,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            calendar::run(&mut std::io::stdout(), &config, days, overwrite, channel)?;
        }
        Some(Commands::Events { path, json }) => {
            // Events doesn't need config - it only reads the given document
            events::run(&mut std::io::stdout().lock(), &path, json)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
