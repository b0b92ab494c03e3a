//! Backtest command implementation

use anyhow::Result;
use tracing::info;

use crossover_optimizer::backtest::{Backtester, SizingConfig};
use crossover_optimizer::fetch;
use crossover_optimizer::strategy::CrossoverRule;

pub fn run(config_path: Option<String>, capital: Option<f64>, offline: bool) -> Result<()> {
    info!("Starting backtest");

    let mut config = super::load_config(config_path.as_deref())?;

    if let Some(capital) = capital {
        info!("Overriding initial capital to: {:.2}", capital);
        config.initial_cash = capital;
    }

    let source = super::data_source(&config, offline)?;
    let symbols = config.symbols();

    info!("Fetching data for {} symbols", symbols.len());
    let feeds = fetch::fetch_universe(source.as_ref(), &symbols, config.start, config.end)?;
    info!("Fetched data for {} symbols", feeds.len());

    let params = config.params();
    let rule = CrossoverRule::new(params.clone());
    let sizing = SizingConfig::new(params.stake_per_trade, config.min_stake);
    let backtester = Backtester::new(config.initial_cash, sizing);

    info!("Running backtest with parameters: {}", params);
    let ending_value = backtester.run(&feeds, &rule)?;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Initial Capital:         {:.2}", config.initial_cash);
    println!("Ending Portfolio Value:  {:.2}", ending_value);
    println!("Parameters:              {}", params);
    println!("{}", "=".repeat(60));

    Ok(())
}
