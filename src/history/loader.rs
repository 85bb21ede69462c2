//! CSV-based historical series loader
//!
//! Each file has a header row, a date column (`YYYY-MM-DD` or `YYYY-MM`)
//! and a single numeric column. FRED-style missing values (`.` or empty)
//! are skipped.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::series::{HistoricalSeries, MonthlySeries};
use crate::error::{EngineError, EngineResult};

/// Default directory holding the two history files
///
/// The bundled files are an illustrative approximation shaped like the
/// FRED federal funds rate and a broad equity index; they are not the
/// published data. Point `history_dir` at real downloads (with
/// [`RateUnit::Percent`] for FRED percent files) before quoting results.
pub const DEFAULT_HISTORY_PATH: &str = "data/history";

/// Default short-rate file name (illustrative data)
pub const DEFAULT_RATE_FILE: &str = "short_rate.csv";

/// Default equity/house-price index file name (illustrative data)
pub const DEFAULT_INDEX_FILE: &str = "equity_index.csv";

/// Unit of the values in a rate file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    #[default]
    /// 0.05 means 5%
    Fraction,
    /// 5.0 means 5% (FRED FEDFUNDS convention)
    Percent,
}

fn parse_date(raw: &str) -> EngineResult<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d"))
        .map_err(|_| EngineError::Series(format!("unparseable date '{}'", raw)))
}

/// Read (date, value) observations from a two-column CSV
pub fn read_observations<R: Read>(reader: R) -> EngineResult<Vec<(NaiveDate, f64)>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut observations = Vec::new();

    for result in csv_reader.records() {
        let record = result?;
        if record.len() < 2 {
            return Err(EngineError::Series(format!(
                "expected 2 columns, found {}",
                record.len()
            )));
        }
        let raw_value = record[1].trim();
        if raw_value.is_empty() || raw_value == "." {
            continue;
        }
        let date = parse_date(&record[0])?;
        let value: f64 = raw_value
            .parse()
            .map_err(|_| EngineError::Series(format!("unparseable value '{}' at {}", raw_value, date)))?;
        observations.push((date, value));
    }

    Ok(observations)
}

/// Load the short-rate column, converting to annualized fractions
pub fn load_rate_series(path: &Path, unit: RateUnit) -> EngineResult<MonthlySeries> {
    let file = File::open(path)?;
    let mut observations = read_observations(file)?;
    if unit == RateUnit::Percent {
        for (_, value) in observations.iter_mut() {
            *value /= 100.0;
        }
    }
    MonthlySeries::from_observations(&observations)
}

/// Load the equity/house-price index column
pub fn load_index_series(path: &Path) -> EngineResult<MonthlySeries> {
    let file = File::open(path)?;
    MonthlySeries::from_observations(&read_observations(file)?)
}

/// Load both files from a directory and align them
pub fn load_history(
    dir: &Path,
    rate_file: &str,
    index_file: &str,
    unit: RateUnit,
) -> EngineResult<HistoricalSeries> {
    let rates = load_rate_series(&dir.join(rate_file), unit)?;
    let levels = load_index_series(&dir.join(index_file))?;
    let series = HistoricalSeries::new(rates, levels)?;
    log::info!(
        "loaded {} months of history from {} starting {}",
        series.len(),
        dir.display(),
        series.origin()
    );
    Ok(series)
}

/// Load the default history files
pub fn load_default_history() -> EngineResult<HistoricalSeries> {
    load_history(
        Path::new(DEFAULT_HISTORY_PATH),
        DEFAULT_RATE_FILE,
        DEFAULT_INDEX_FILE,
        RateUnit::Fraction,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fred_style_csv() {
        let data = "observation_date,FEDFUNDS\n2000-01-01,5.45\n2000-02-01,.\n2000-03,5.85\n";
        let observations = read_observations(data.as_bytes()).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].0, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!(observations[1].0, NaiveDate::from_ymd_opt(2000, 3, 1).unwrap());
        assert_eq!(observations[1].1, 5.85);
    }

    #[test]
    fn test_bad_date_is_error() {
        let data = "date,value\nJanuary,1.0\n";
        assert!(matches!(
            read_observations(data.as_bytes()),
            Err(EngineError::Series(_))
        ));
    }

    #[test]
    fn test_bad_value_is_error() {
        let data = "date,value\n2000-01-01,abc\n";
        assert!(read_observations(data.as_bytes()).is_err());
    }

    #[test]
    fn test_load_default_history() {
        let result = load_default_history();
        assert!(result.is_ok(), "Failed to load history: {:?}", result.err());

        let series = result.unwrap();
        // Long enough for a 30-year loan
        assert!(series.len() >= 360);
        assert!(series.monthly_rates().iter().all(|r| *r > -0.01 && *r < 0.25));
        assert!(series.monthly_levels().iter().all(|l| *l > 0.0));
    }

    #[test]
    fn test_bundled_history_is_labelled_illustrative() {
        let readme = std::fs::read_to_string(Path::new(DEFAULT_HISTORY_PATH).join("README.md"))
            .expect("bundled history README");
        assert!(readme.contains("Illustrative data only"));
        assert!(readme.contains(DEFAULT_RATE_FILE));
        assert!(readme.contains(DEFAULT_INDEX_FILE));
    }
}
