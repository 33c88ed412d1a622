use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ctt_cli::commands::{cache, import, refresh, report, search, sources};
use ctt_cli::{CacheAction, Cli, Commands, Config};

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
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Refresh => refresh::run(&mut stdout, &config)?,
        Commands::Report {
            granularity,
            group_by,
            from,
            to,
            offline,
            json,
            activity,
        } => {
            let args = report::ReportArgs {
                granularity: *granularity,
                group_by: *group_by,
                from: from.clone(),
                to: to.clone(),
                offline: *offline,
                json: *json,
                activity: *activity,
            };
            report::run(&mut stdout, &config, &args)?;
        }
        Commands::Search {
            pattern,
            sources,
            categories,
            from,
            to,
            offline,
            json,
        } => {
            let args = search::SearchArgs {
                pattern: pattern.clone(),
                sources: sources.clone(),
                categories: categories.clone(),
                from: from.clone(),
                to: to.clone(),
                offline: *offline,
                json: *json,
            };
            search::run(&mut stdout, &config, &args)?;
        }
        Commands::Import { source, file } => import::run(&mut stdout, &config, source, file)?,
        Commands::Cache(CacheAction::Status) => cache::status(&mut stdout, &config)?,
        Commands::Cache(CacheAction::Clear { source }) => {
            cache::clear(&mut stdout, &config, source.as_deref())?;
        }
        Commands::Sources => sources::run(&mut stdout, &config)?,
    }

    Ok(())
}
