use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wu_cli::commands::{agents, aggregate, log, stats, util};
use wu_cli::{AgentsAction, Cli, Commands, Config, LogAction};
use wu_db::NewAgent;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(wu_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = wu_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
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
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();

    match &cli.command {
        Some(Commands::Aggregate(args)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            aggregate::run(&mut stdout, &mut db, &config, args)?;
        }
        Some(Commands::Stats { start, end, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let start = util::parse_datetime(start).context("invalid --start")?;
            let end = util::parse_datetime(end).context("invalid --end")?;
            stats::run(&mut stdout, &db, start, end, *json)?;
        }
        Some(Commands::Prune { after }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            let after = util::parse_datetime(after).context("invalid --after")?;
            stats::prune(&mut stdout, &mut db, after)?;
        }
        Some(Commands::Log(action)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            match action {
                LogAction::Wrapup {
                    agent,
                    duration,
                    at,
                    call_id,
                } => log::wrapup(
                    &mut stdout,
                    &mut db,
                    agent,
                    *duration,
                    at.as_deref(),
                    call_id.as_deref(),
                )?,
                LogAction::List { start, end } => {
                    let start = util::parse_datetime(start).context("invalid --start")?;
                    let end = util::parse_datetime(end.as_deref().unwrap_or("now"))
                        .context("invalid --end")?;
                    log::list(&mut stdout, &db, start, end)?;
                }
            }
        }
        Some(Commands::Agents(action)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            match action {
                AgentsAction::Add {
                    number,
                    firstname,
                    lastname,
                    context,
                } => {
                    let agent = NewAgent {
                        number: number.clone(),
                        firstname: firstname.clone(),
                        lastname: lastname.clone(),
                        context: context.clone(),
                    };
                    agents::add(&mut stdout, &mut db, &agent)?;
                }
                AgentsAction::List { json } => agents::list(&mut stdout, &db, *json)?,
            }
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
