//! EPM Engine CLI
//!
//! Runs one simulation from a JSON parameter file and writes the output
//! payload plus the period table as CSV.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use epm_engine::params::load_parameters;
use epm_engine::{EngineConfig, Frequency, PricePathMode, ScenarioRunner};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliMode {
    Historical,
    MonteCarlo,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFrequency {
    Monthly,
    Quarterly,
}

impl From<CliFrequency> for Frequency {
    fn from(value: CliFrequency) -> Self {
        match value {
            CliFrequency::Monthly => Frequency::Monthly,
            CliFrequency::Quarterly => Frequency::Quarterly,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "epm_engine",
    about = "Equity-preservation mortgage cash-flow simulation"
)]
struct Cli {
    /// JSON file with the simulation parameters
    params: PathBuf,

    #[arg(long, value_enum, default_value_t = CliMode::Historical)]
    mode: CliMode,

    #[arg(long, default_value_t = 42, help = "Seed for Monte Carlo mode")]
    seed: u64,

    #[arg(long, help = "JSON engine configuration; flags below override it")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    frequency: Option<CliFrequency>,

    #[arg(long, help = "Annual volatility of Monte Carlo index paths")]
    volatility: Option<f64>,

    #[arg(long, help = "Directory holding the rate and index CSV files")]
    history_dir: Option<PathBuf>,

    #[arg(long, default_value = "epm_output.json")]
    output: PathBuf,

    #[arg(long, default_value = "pathdf.csv", help = "Period table as CSV")]
    csv: PathBuf,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening config {}", path.display()))?;
                serde_json::from_reader(file)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        if let Some(frequency) = self.frequency {
            config.frequency = frequency.into();
        }
        if let Some(volatility) = self.volatility {
            config.monte_carlo_volatility = volatility;
        }
        if let Some(dir) = &self.history_dir {
            config.history_dir = dir.clone();
        }
        Ok(config)
    }

    fn path_mode(&self) -> PricePathMode {
        match self.mode {
            CliMode::Historical => PricePathMode::Historical,
            CliMode::MonteCarlo => PricePathMode::MonteCarlo { seed: self.seed },
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let params = load_parameters(&cli.params)
        .with_context(|| format!("loading parameters from {}", cli.params.display()))?;
    let config = cli.engine_config()?;
    let runner = ScenarioRunner::from_config(config)
        .context("loading historical series")?;

    println!("EPM Engine v{}", env!("CARGO_PKG_VERSION"));
    println!("======================\n");
    println!("  House value:   ${:.2}", params.house_value);
    println!("  Loan to value: {:.4}", params.loan_to_value);
    println!("  Duration:      {} years ({:?})", params.loan_duration, params.loan_type);
    println!("  Start year:    {}", params.start_year);
    println!("  Mode:          {:?}", cli.path_mode());
    println!();

    let output = runner.run(&params, cli.path_mode())?;
    let frame = &output.pathdf;

    println!("{:>6} {:>4} {:>10} {:>14} {:>14} {:>12} {:>12} {:>8}",
        "Period", "Year", "Price", "Portfolio", "Deficit", "Annuity", "UnitsSold", "Holiday");
    println!("{}", "-".repeat(88));
    for row in frame.rows().take(24) {
        println!("{:>6} {:>4} {:>10.4} {:>14.2} {:>14.2} {:>12.2} {:>12.4} {:>8}",
            row.period,
            row.year,
            row.equity_price,
            row.portfolio_value,
            row.interest_deficit,
            row.annuity_income,
            row.units_sold,
            if row.in_holiday { "yes" } else { "" },
        );
    }
    if frame.len() > 24 {
        println!("... ({} more periods)", frame.len() - 24);
    }

    println!("\nAccounts:");
    for (label, value) in &output.accounts_table {
        println!("  {:<32} {:>16.4}", label, value);
    }

    if !output.debug_msgs.is_empty() {
        println!("\nDiagnostics:");
        for msg in &output.debug_msgs {
            println!("  {}", msg);
        }
    }

    let json = File::create(&cli.output)
        .with_context(|| format!("creating {}", cli.output.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(json), &output)?;

    let csv = File::create(&cli.csv)
        .with_context(|| format!("creating {}", cli.csv.display()))?;
    frame.write_csv(BufWriter::new(csv))?;

    println!("\nOutput written to: {}", cli.output.display());
    println!("Period table written to: {}", cli.csv.display());
    Ok(())
}
