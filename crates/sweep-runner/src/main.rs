//! Sweep Runner
//!
//! Runs the full pipeline over a JSON price file: distance ranking and cointegration
//! filtering on the formation window, then the parameter sweep on the trading window.

use anyhow::{Context, Result};
use backtester::{ParameterSweep, SweepRecord};
use clap::Parser;
use pair_selector::{rank_pairs, CointegratedPair, CointegrationFilter};
use pairs_core::{Config, PriceTable};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "sweep-runner", version, about = "Backtest cointegrated futures pairs")]
struct Args {
    /// JSON array of {date, asset, close, volume} rows.
    #[arg(long)]
    prices: PathBuf,

    /// Configuration file (any format the config crate reads).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write results; stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
    pairs: Vec<CointegratedPair>,
    results: Vec<SweepRecord>,
    failed: usize,
    cancelled: usize,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sweep_runner=info,backtester=info,pair_selector=info,pairs_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let table = load_prices(&args.prices)?;
    info!(
        rows = table.row_count(),
        assets = table.assets().len(),
        dates = table.dates().len(),
        "Loaded price table"
    );

    let (formation_start, formation_end) =
        table.date_index(config.formation.start, config.formation.end);
    let (trading_start, trading_end) = table.date_index(config.trading.start, config.trading.end);

    let ranked =
        rank_pairs(&table, formation_start..formation_end).context("Pair ranking failed")?;
    let pairs = CointegrationFilter::from_config(&config.selection)
        .filter(&table, &ranked, formation_start..formation_end)
        .context("Cointegration filter failed")?;

    let outcome =
        ParameterSweep::from_config(&config).run(&table, &pairs, trading_start..trading_end)?;

    let report = Report {
        results: outcome.records(),
        failed: outcome.failed,
        cancelled: outcome.cancelled,
        pairs,
    };
    write_report(&report, args.output.as_deref())?;

    info!(results = report.results.len(), "Done");
    Ok(())
}

fn load_prices(path: &Path) -> Result<PriceTable> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    PriceTable::from_json_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse price rows from {}", path.display()))
}

fn write_report(report: &Report, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.flush()?;
            info!(path = %path.display(), "Wrote results");
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, report)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "sweep-runner",
            "--prices",
            "prices.json",
            "--output",
            "out.json",
        ])
        .unwrap();
        assert_eq!(args.prices, PathBuf::from("prices.json"));
        assert!(args.config.is_none());
        assert_eq!(args.output, Some(PathBuf::from("out.json")));

        assert!(Args::try_parse_from(["sweep-runner"]).is_err());
    }
}
