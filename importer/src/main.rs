use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod errors;
mod event;
mod google_auth;
mod google_calendar;
mod http_utils;
mod importer;
mod spreadsheet;

use commands::{
    auth::AuthCommand,
    calendar::{ListCalendarsCommand, UpcomingCommand},
    import::ImportCommand,
    Command, CommandContext,
};
use config::Config;

#[derive(Parser)]
#[command(name = "xlsx-to-calendar")]
#[command(about = "Create Google Calendar events from the rows of a spreadsheet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create one event per spreadsheet row
    Import {
        /// Workbook to read (.xlsx, .xlsm, .xls or .ods)
        file: PathBuf,
        /// Sheet to read instead of the first one
        #[arg(short, long)]
        sheet: Option<String>,
        /// Print the events instead of creating them
        #[arg(long)]
        dry_run: bool,
    },
    /// Set up Google Calendar authorization
    Auth,
    /// List the calendars linked to the account
    Calendars,
    /// Show the next few events of a calendar
    Upcoming {
        /// Number of events to show
        #[arg(short = 'n', long, default_value_t = 5)]
        count: u32,
        /// Calendar id to read from
        #[arg(long, default_value = "primary")]
        calendar: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("xlsx_to_calendar={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(cli.config.as_deref())
        .await
        .context("Failed to load application configuration")?;
    info!("Configuration loaded successfully");

    let context = CommandContext::new(config, cli.debug);

    let mut command: Box<dyn Command + Send> = match cli.command {
        Commands::Import {
            file,
            sheet,
            dry_run,
        } => Box::new(ImportCommand {
            file,
            sheet,
            dry_run,
        }),
        Commands::Auth => Box::new(AuthCommand),
        Commands::Calendars => Box::new(ListCalendarsCommand),
        Commands::Upcoming { count, calendar } => Box::new(UpcomingCommand {
            count,
            calendar_id: calendar,
        }),
    };

    command
        .execute(&context)
        .await
        .context("Failed to execute command")?;

    Ok(())
}
