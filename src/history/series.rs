//! Aligned monthly short-rate and index-level series

use chrono::{Datelike, NaiveDate};

use crate::error::{EngineError, EngineResult};
use crate::params::Frequency;

/// One loaded column keyed by month
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    /// First observation, normalized to the first day of its month
    pub origin: NaiveDate,
    /// Contiguous monthly values starting at `origin`
    pub values: Vec<f64>,
}

impl MonthlySeries {
    /// Build from (date, value) observations in file order
    ///
    /// Dates must be strictly increasing by month. Missing months are
    /// forward-filled from the previous observation.
    pub fn from_observations(observations: &[(NaiveDate, f64)]) -> EngineResult<Self> {
        let (first_date, _) = observations
            .first()
            .ok_or_else(|| EngineError::Series("series has no observations".to_string()))?;

        let origin = first_of_month(*first_date);
        let mut values = Vec::with_capacity(observations.len());
        let mut prev_month: Option<i64> = None;

        for &(date, value) in observations {
            if !value.is_finite() {
                return Err(EngineError::Series(format!(
                    "non-finite value {} at {}",
                    value, date
                )));
            }
            let month = month_index(date);
            if let Some(prev) = prev_month {
                if month <= prev {
                    return Err(EngineError::Series(format!(
                        "date index not increasing at {}",
                        date
                    )));
                }
                let gap = month - prev;
                if gap > 1 {
                    log::warn!("series gap of {} months before {}, forward-filling", gap - 1, date);
                    let fill = values.last().copied().unwrap_or(value);
                    values.extend(std::iter::repeat(fill).take((gap - 1) as usize));
                }
            }
            values.push(value);
            prev_month = Some(month);
        }

        Ok(Self { origin, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn origin_month(&self) -> i64 {
        month_index(self.origin)
    }
}

/// Short-rate and equity-index history over a common monthly window
///
/// Read-only after construction; runs share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    origin: NaiveDate,
    rates: Vec<f64>,
    levels: Vec<f64>,
}

impl HistoricalSeries {
    /// Align the two columns on their overlapping months
    pub fn new(rates: MonthlySeries, levels: MonthlySeries) -> EngineResult<Self> {
        let start = rates.origin_month().max(levels.origin_month());
        let rate_end = rates.origin_month() + rates.len() as i64;
        let level_end = levels.origin_month() + levels.len() as i64;
        let end = rate_end.min(level_end);

        if end <= start {
            return Err(EngineError::Series(
                "rate and index series do not overlap".to_string(),
            ));
        }

        let rate_skip = (start - rates.origin_month()) as usize;
        let level_skip = (start - levels.origin_month()) as usize;
        let len = (end - start) as usize;

        if rate_skip > 0 || level_skip > 0 || rates.len() != len || levels.len() != len {
            log::info!(
                "aligned history to {} months (dropped {} rate / {} index observations)",
                len,
                rates.len() - len,
                levels.len() - len
            );
        }

        if let Some(bad) = levels.values[level_skip..level_skip + len].iter().find(|v| **v <= 0.0) {
            return Err(EngineError::Series(format!(
                "index levels must be positive, found {}",
                bad
            )));
        }

        Ok(Self {
            origin: from_month_index(start),
            rates: rates.values[rate_skip..rate_skip + len].to_vec(),
            levels: levels.values[level_skip..level_skip + len].to_vec(),
        })
    }

    /// Build directly from aligned monthly vectors
    pub fn from_monthly(origin: NaiveDate, rates: Vec<f64>, levels: Vec<f64>) -> EngineResult<Self> {
        let rates = MonthlySeries {
            origin: first_of_month(origin),
            values: rates,
        };
        let levels = MonthlySeries {
            origin: first_of_month(origin),
            values: levels,
        };
        if rates.is_empty() || levels.is_empty() {
            return Err(EngineError::Series("series has no observations".to_string()));
        }
        Self::new(rates, levels)
    }

    pub fn origin(&self) -> NaiveDate {
        self.origin
    }

    /// Number of monthly observations
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn monthly_rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn monthly_levels(&self) -> &[f64] {
        &self.levels
    }

    /// Monthly observations to skip so the first period starts on a
    /// period boundary (January/April/July/October for quarterly)
    fn phase(&self, frequency: Frequency) -> usize {
        let step = frequency.months_per_period();
        let month0 = self.origin.month0() as usize;
        (step - month0 % step) % step
    }

    /// Number of whole periods available at the given frequency
    pub fn period_len(&self, frequency: Frequency) -> usize {
        let phase = self.phase(frequency);
        let step = frequency.months_per_period();
        if self.len() <= phase {
            0
        } else {
            (self.len() - phase + step - 1) / step
        }
    }

    fn monthly_position(&self, frequency: Frequency, period: usize) -> usize {
        self.phase(frequency) + period * frequency.months_per_period()
    }

    /// Short rate (annualized fraction) observed at the start of a period
    pub fn rate_at(&self, frequency: Frequency, period: usize) -> f64 {
        self.rates[self.monthly_position(frequency, period)]
    }

    /// Index level observed at the start of a period
    pub fn level_at(&self, frequency: Frequency, period: usize) -> f64 {
        self.levels[self.monthly_position(frequency, period)]
    }

    /// Offset, in periods, of January of `year` relative to the first period
    ///
    /// Negative when the year precedes the series.
    pub fn period_offset_for_year(&self, frequency: Frequency, year: i32) -> i64 {
        let first_period_month = month_index(self.origin) + self.phase(frequency) as i64;
        let target = year as i64 * 12;
        (target - first_period_month).div_euclid(frequency.months_per_period() as i64)
    }

    /// Calendar year of the first observation
    pub fn origin_year(&self) -> i32 {
        self.origin.year()
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn month_index(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

fn from_month_index(index: i64) -> NaiveDate {
    let year = index.div_euclid(12) as i32;
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}
