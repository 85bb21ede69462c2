//! Compare two output payloads to a relative tolerance
//!
//! Usage: cargo run --bin compare_outputs -- reference.json candidate.json

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use epm_engine::verify::{find_mismatches, DEFAULT_TOLERANCE};
use epm_engine::SimulationOutput;

#[derive(Parser, Debug)]
#[command(name = "compare_outputs", about = "Diff two simulation outputs")]
struct Cli {
    reference: PathBuf,
    candidate: PathBuf,

    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
}

fn load(path: &Path) -> Result<SimulationOutput> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    let reference = load(&cli.reference)?;
    let candidate = load(&cli.candidate)?;
    let mismatches = find_mismatches(&reference, &candidate, cli.tolerance);

    if mismatches.is_empty() {
        println!(
            "All {} accounts and {} terminal values agree within {:.1e}",
            reference.accounts_table.len(),
            reference.pathdf.row(0).map_or(0, |r| r.numeric_fields().len()),
            cli.tolerance
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<44} {:>16} {:>16} {:>12}", "Label", "Reference", "Candidate", "RelDiff");
    println!("{:-<91}", "");
    for m in &mismatches {
        println!(
            "{:<44} {:>16.6} {:>16.6} {:>12.3e}",
            m.label, m.reference, m.candidate, m.relative_diff
        );
    }
    if let Some(first) = mismatches.into_iter().next() {
        eprintln!("{}", first.into_error(cli.tolerance));
    }
    Ok(ExitCode::FAILURE)
}
