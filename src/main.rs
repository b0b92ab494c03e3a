//! Crossover optimizer - main entry point
//!
//! This binary provides three subcommands:
//! - search: grid-search strategy parameters and report the best set
//! - backtest: run a single backtest with the default parameters
//! - download: save each symbol's history to CSV for offline runs

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "crossover-optimizer")]
#[command(about = "Grid-search parameter optimizer for an MA/RSI crossover strategy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full parameter grid search
    Search {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Read {SYMBOL}.csv files from the config's data_dir instead of
        /// fetching over HTTP
        #[arg(long)]
        offline: bool,
    },

    /// Run a single backtest with the default parameter set
    Backtest {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,

        /// Read {SYMBOL}.csv files from the config's data_dir
        #[arg(long)]
        offline: bool,
    },

    /// Download the symbol universe's history to CSV files
    Download {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy HTTP internals
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // For the search: only log to file, keep the console clean for
        // the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Search { .. } => ("search", true), // File-only for clean progress bar
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Download { .. } => ("download", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Search { config, offline } => commands::search::run(config, offline),

        Commands::Backtest {
            config,
            capital,
            offline,
        } => commands::backtest::run(config, capital, offline),

        Commands::Download { config, output } => commands::download::run(config, output),
    }
}
