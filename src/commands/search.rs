//! Search command implementation

use anyhow::Result;
use tracing::info;

use crossover_optimizer::search::{search_progress_bar, GridSearch};

pub fn run(config_path: Option<String>, offline: bool) -> Result<()> {
    info!("Starting grid search");

    let config = super::load_config(config_path.as_deref())?;
    let source = super::data_source(&config, offline)?;
    let grid = config.grid();

    println!("\n{}", "=".repeat(60));
    println!("GRID SEARCH");
    println!("{}", "=".repeat(60));
    println!("  Symbols:       {}", config.symbols.join(", "));
    println!("  Date range:    {} to {}", config.start, config.end);
    println!("  Initial cash:  {:.2}", config.initial_cash);
    println!("  Combinations:  {}", grid.total_combinations());
    println!("{}\n", "=".repeat(60));

    let progress = search_progress_bar(grid.total_combinations() as u64);
    let report = GridSearch::new(source.as_ref(), &config).run_with_progress(&grid, &progress);
    progress.finish();
    println!();

    if report.failed_runs() > 0 {
        println!(
            "{} of {} runs failed; see the log file for details",
            report.failed_runs(),
            report.runs.len()
        );
    }

    println!("\nBest Parameters:");
    match report.outcome.best() {
        Some((params, value)) => {
            println!("  {}", params);
            println!("Best Portfolio Value: {:.2}", value);
        }
        None => {
            println!("  none - every run failed");
        }
    }

    info!("Grid search completed");
    Ok(())
}
