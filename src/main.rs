mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use inkcal_core::clock::TimeSource;
use inkcal_core::config::{CalendarSource, InkcalConfig};
use inkcal_core::date_range::DateRange;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inkcal")]
#[command(about = "Turn ICS calendar feeds into a compact agenda for small displays")]
struct Cli {
    /// More logging (-v info, -vv debug). RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show upcoming events from the configured calendars
    Agenda {
        /// Only show this calendar (by name)
        #[arg(short, long)]
        calendar: Option<String>,

        /// First day to show (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        from: Option<String>,

        /// Last day to show (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Read the cache instead of the calendar files
        #[arg(long)]
        offline: bool,
    },
    /// Inspect or clear the offline event cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Status,
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    Path,
    Init,
    /// Add a calendar to the config file
    Add {
        name: String,

        /// Path to the .ics file
        path: String,

        /// Display color, e.g. "#d14b3c"
        #[arg(long)]
        color: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Agenda {
            calendar,
            from,
            to,
            offline,
        } => {
            let config = InkcalConfig::load()?;
            let clock = config.clock()?;
            let calendars = resolve_calendars(&config, calendar.as_deref())?;
            let range = DateRange::from_args(
                from.as_deref(),
                to.as_deref(),
                clock.now(),
                config.lookahead_days,
                clock.local_zone(),
            )
            .map_err(|e| anyhow::anyhow!(e))?;
            commands::agenda::run(&config, &calendars, range, &clock, offline)
        }
        Commands::Cache { action } => {
            let config = InkcalConfig::load()?;
            match action {
                CacheAction::Status => commands::cache::status(&config),
                CacheAction::Clear => commands::cache::clear(&config),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => commands::config::path(),
            ConfigAction::Init => commands::config::init(),
            ConfigAction::Add { name, path, color } => commands::config::add(name, path, color),
        },
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_calendars(config: &InkcalConfig, filter: Option<&str>) -> Result<Vec<CalendarSource>> {
    if config.calendars.is_empty() {
        let path = InkcalConfig::config_path()?;
        anyhow::bail!(
            "No calendars configured.\n\n\
            Add one to {}:\n  \
            [[calendars]]\n  \
            name = \"family\"\n  \
            path = \"~/calendars/family.ics\"",
            path.display()
        );
    }

    match filter {
        Some(name) => match config.calendar(name) {
            Some(cal) => Ok(vec![cal.clone()]),
            None => {
                let available: Vec<_> = config.calendars.iter().map(|c| c.name.as_str()).collect();
                anyhow::bail!(
                    "Calendar '{}' not found. Available: {}",
                    name,
                    available.join(", ")
                );
            }
        },
        None => Ok(config.calendars.clone()),
    }
}
