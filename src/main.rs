//! CLI entry point for the portfolio rebalancer.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::info;

use portfolio_rebalancer::audit::{self, AuditLog};
use portfolio_rebalancer::config::Config;
use portfolio_rebalancer::error::{Error, Result};
use portfolio_rebalancer::execution::apply_trades;
use portfolio_rebalancer::loaders;
use portfolio_rebalancer::model::Portfolio;
use portfolio_rebalancer::rebalance::{Mode, RebalanceOptions, rebalance};
use portfolio_rebalancer::report;
use portfolio_rebalancer::target::build_default_targets;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Portfolio rebalancer: target weights to buy/sell trade plans")]
#[command(version)]
struct Cli {
    /// Path to an optional rebalancer.toml
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the trade plan that moves a portfolio toward target weights
    Rebalance {
        /// Positions CSV (ticker,asset_type,quantity,price)
        #[arg(long)]
        positions: PathBuf,

        /// Targets CSV (ticker,weight)
        #[arg(long)]
        targets: PathBuf,

        /// Prices CSV (ticker,price)
        #[arg(long)]
        prices: PathBuf,

        /// Settled cash on hand
        #[arg(long)]
        cash: f64,

        /// BUY, SELL, or TRADE (overrides the config default)
        #[arg(long)]
        mode: Option<String>,

        /// Allow fractional unit quantities
        #[arg(long)]
        fractional: bool,

        /// Discard trades below this notional (overrides the config default)
        #[arg(long)]
        min_notional: Option<f64>,

        /// Print the post-trade portfolio snapshot
        #[arg(long)]
        show_post: bool,
    },

    /// Apply a saved trade plan to a portfolio
    Apply {
        /// Positions CSV (ticker,asset_type,quantity,price)
        #[arg(long)]
        positions: PathBuf,

        /// Trades CSV (side,ticker,quantity,price) — the rebalance output
        #[arg(long)]
        trades: PathBuf,

        /// Settled cash on hand
        #[arg(long)]
        cash: f64,

        /// Prices CSV for the post-trade summary
        #[arg(long)]
        prices: Option<PathBuf>,
    },

    /// Mark-to-market snapshot of a portfolio
    Summary {
        /// Positions CSV (ticker,asset_type,quantity,price)
        #[arg(long)]
        positions: PathBuf,

        /// Prices CSV (ticker,price)
        #[arg(long)]
        prices: PathBuf,

        /// Settled cash on hand
        #[arg(long)]
        cash: f64,
    },

    /// Build equal-weight default targets from current holdings
    Targets {
        /// Positions CSV (ticker,asset_type,quantity,price)
        #[arg(long)]
        positions: PathBuf,

        /// Output targets CSV path
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {e}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Err(e) = run(&cli.command, &config) {
        match &e {
            Error::InvalidMode(_) | Error::InvalidTradeSide(_) => {
                eprintln!("Error: {e}");
                process::exit(2);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}

fn run(command: &Command, config: &Config) -> Result<()> {
    match command {
        Command::Rebalance {
            positions,
            targets,
            prices,
            cash,
            mode,
            fractional,
            min_notional,
            show_post,
        } => {
            let held = loaders::load_positions_csv(positions)?;
            let target = loaders::load_targets_csv(targets)?;
            let price_map = loaders::load_prices_csv(prices)?;

            let mode: Mode = mode
                .as_deref()
                .unwrap_or(config.rebalance.mode.as_str())
                .parse()?;
            let opts = RebalanceOptions {
                mode,
                allow_fractional: *fractional || config.rebalance.allow_fractional,
                min_trade_notional: min_notional.unwrap_or(config.rebalance.min_trade_notional),
            };

            let pf = Portfolio::new(held, *cash);

            let mut audit_log = AuditLog::open(&config.audit_path())?;
            audit::log_run_started(&mut audit_log, mode, &positions.display().to_string())?;

            let result = rebalance(&pf, &target, &price_map, &opts)?;
            audit::log_plan(&mut audit_log, &result)?;

            println!("side,ticker,quantity,price,notional");
            for t in &result.trades {
                println!(
                    "{},{},{},{},{}",
                    t.side,
                    t.ticker,
                    t.quantity,
                    t.price,
                    t.notional()
                );
            }
            println!("CASH_BEFORE,{}", result.cash_before);
            println!("CASH_AFTER,{}", result.cash_after);

            if *show_post {
                let asset_types = pf.asset_types();
                let post = apply_trades(
                    &pf,
                    &result.trades,
                    &asset_types,
                    Some(&config.rebalance.default_asset_type),
                )?;
                let summary = report::summarize(&post, &price_map)?;
                audit::log_applied(&mut audit_log, &summary)?;

                println!("\nPOST-TRADE PORTFOLIO:");
                print!("{summary}");
            }

            audit::log_run_completed(&mut audit_log, result.trades.len())?;
            Ok(())
        }

        Command::Apply {
            positions,
            trades,
            cash,
            prices,
        } => {
            let held = loaders::load_positions_csv(positions)?;
            let plan = loaders::load_trades_csv(trades)?;

            let pf = Portfolio::new(held, *cash);
            let asset_types = pf.asset_types();
            let post = apply_trades(
                &pf,
                &plan,
                &asset_types,
                Some(&config.rebalance.default_asset_type),
            )?;

            info!("applied {} trades", plan.len());

            match prices {
                Some(prices) => {
                    let price_map = loaders::load_prices_csv(prices)?;
                    let summary = report::summarize(&post, &price_map)?;
                    println!("POST-TRADE PORTFOLIO:");
                    print!("{summary}");
                }
                None => {
                    println!("ticker,asset_type,quantity,price");
                    for p in &post.positions {
                        println!("{},{},{},{}", p.ticker, p.asset_type, p.quantity, p.price);
                    }
                    println!("CASH,{}", post.cash);
                }
            }
            Ok(())
        }

        Command::Summary {
            positions,
            prices,
            cash,
        } => {
            let held = loaders::load_positions_csv(positions)?;
            let price_map = loaders::load_prices_csv(prices)?;

            let pf = Portfolio::new(held, *cash);
            let summary = report::summarize(&pf, &price_map)?;
            println!("PORTFOLIO:");
            print!("{summary}");
            Ok(())
        }

        Command::Targets { positions, out } => {
            let held = loaders::load_positions_csv(positions)?;
            let targets = build_default_targets(&held)?;
            loaders::write_targets_csv(&targets.by_ticker, out)?;

            info!(
                "wrote {} targets across {} asset types",
                targets.by_ticker.weights_by_ticker.len(),
                targets.by_type.len()
            );
            println!("{}", out.display());
            Ok(())
        }
    }
}
