//! qfin CLI: run and sweep backtests described by a TOML config.
//!
//! Commands:
//! - `run`: one parameter binding over `cv` windows (or explicit `--start` dates)
//! - `sweep`: every candidate combination in the config over one window set
//! - `strategies`: list the built-in strategies and their parameters

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use qfin_runner::{strategies, BacktestConfig, Backtester};

#[derive(Parser)]
#[command(name = "qfin", about = "qfin: multi-instrument backtesting with cached indicators")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one parameter binding; candidate lists in the config are rejected.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Number of folds. Overrides `backtest.cv`.
        #[arg(long)]
        cv: Option<usize>,

        /// Seed for window sampling. Overrides `backtest.seed`.
        #[arg(long)]
        seed: Option<u64>,

        /// Explicit window start (YYYY-MM-DD); repeat for several folds.
        #[arg(long = "start")]
        starts: Vec<String>,

        /// Write the full result as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Sweep every combination of the candidate lists in the config.
    Sweep {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        cv: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Print only the best N entries.
        #[arg(long)]
        top: Option<usize>,

        /// Write the full sweep as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// List built-in strategies with their default parameters.
    Strategies,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            cv,
            seed,
            starts,
            json,
        } => run_cmd(&config, cv, seed, &starts, json.as_deref()),
        Commands::Sweep {
            config,
            cv,
            seed,
            top,
            json,
        } => sweep_cmd(&config, cv, seed, top, json.as_deref()),
        Commands::Strategies => {
            for name in strategies::NAMES {
                let factory = strategies::builtin(name)?;
                println!("{name}: {}", factory.schema().defaults());
            }
            Ok(())
        }
    }
}

fn load(path: &Path) -> Result<(BacktestConfig, Backtester)> {
    let config = BacktestConfig::from_file(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let feed = config.load_feed(base_dir)?;
    let backtester = config.build_backtester(feed)?;
    Ok((config, backtester))
}

fn run_cmd(
    path: &Path,
    cv: Option<usize>,
    seed: Option<u64>,
    starts: &[String],
    json: Option<&Path>,
) -> Result<()> {
    let (config, mut backtester) = load(path)?;
    let strategy_params = config.strategy_overrides()?;
    let indicator_params = config.indicator_overrides()?;
    let seed = seed.or(config.backtest.seed);

    let result = if starts.is_empty() {
        let cv = cv.unwrap_or(config.backtest.cv);
        backtester.run(&strategy_params, &indicator_params, cv, seed)?
    } else {
        if cv.is_some() {
            bail!("--cv and --start are mutually exclusive");
        }
        let starts = parse_dates(starts)?;
        backtester.run_at(&strategy_params, &indicator_params, &starts, seed)?
    };

    println!("{result}");
    if let Some(path) = json {
        write_json(path, &result)?;
    }
    Ok(())
}

fn sweep_cmd(
    path: &Path,
    cv: Option<usize>,
    seed: Option<u64>,
    top: Option<usize>,
    json: Option<&Path>,
) -> Result<()> {
    let (config, mut backtester) = load(path)?;
    let cv = cv.unwrap_or(config.backtest.cv);
    let seed = seed.or(config.backtest.seed);
    let sweep = backtester.grid_search(&config.strategy_params, &config.indicator_params, cv, seed)?;

    match top {
        Some(n) => {
            println!(
                "best {} of {} runs (seed {}), {} failed",
                n.min(sweep.len()),
                sweep.len(),
                sweep.seed,
                sweep.failures.len()
            );
            for run in sweep.top_n(n) {
                println!();
                print!("{run}");
            }
        }
        None => print!("{sweep}"),
    }
    if let Some(path) = json {
        write_json(path, &sweep)?;
    }
    Ok(())
}

fn parse_dates(raw: &[String]) -> Result<Vec<NaiveDate>> {
    raw.iter()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid --start date '{s}'"))
        })
        .collect()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    info!(path = %path.display(), "wrote JSON result");
    Ok(())
}
