//! Price-index join: nominal → real values.
//!
//! `real = nominal * base / index[period]`. A period with no index entry has
//! no real value; that is not an error.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::normalize::Respondent;
use crate::record::Period;

/// Annual consumer price index, 2016 = 100.
const BUILTIN_CPI: [(i32, f64); 10] = [
    (2016, 100.000000),
    (2017, 112.985075),
    (2018, 151.569817),
    (2019, 231.605092),
    (2020, 325.364358),
    (2021, 478.615058),
    (2022, 828.603683),
    (2023, 1939.297233),
    (2024, 6263.886042),
    (2025, 8741.757380),
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeflatorError {
    #[error("duplicate index entry for {0}")]
    DuplicatePeriod(DeflatorKey),
    #[error("index for {key} must be positive and finite, got {value}")]
    NonPositiveIndex { key: DeflatorKey, value: f64 },
    #[error("base period {0} has no index entry")]
    MissingBasePeriod(DeflatorKey),
    #[error("base value must be positive and finite, got {0}")]
    InvalidBase(f64),
    #[error("index series is empty")]
    EmptySeries,
    #[error("failed to read index table: {0}")]
    Parse(String),
}

/// Index period: a whole year, or one quarter of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeflatorKey {
    pub year: i32,
    #[serde(default)]
    pub quarter: Option<u8>,
}

impl DeflatorKey {
    pub fn annual(year: i32) -> Self {
        Self {
            year,
            quarter: None,
        }
    }

    pub fn quarterly(year: i32, quarter: u8) -> Self {
        Self {
            year,
            quarter: Some(quarter),
        }
    }
}

impl fmt::Display for DeflatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quarter {
            Some(q) => write!(f, "{}T{}", self.year, q),
            None => write!(f, "{}", self.year),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexRow {
    #[serde(alias = "ANO4", alias = "anio")]
    year: i32,
    #[serde(default, alias = "TRIMESTRE", alias = "trimestre")]
    quarter: Option<u8>,
    #[serde(alias = "ipc", alias = "IPC")]
    index: f64,
}

/// Period → price index, one value per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeflatorSeries {
    entries: HashMap<DeflatorKey, f64>,
}

impl DeflatorSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled annual series.
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_CPI
                .iter()
                .map(|&(year, index)| (DeflatorKey::annual(year), index))
                .collect(),
        }
    }

    pub fn from_entries<I>(entries: I) -> Result<Self, DeflatorError>
    where
        I: IntoIterator<Item = (DeflatorKey, f64)>,
    {
        let mut series = Self::new();
        for (key, value) in entries {
            series.insert(key, value)?;
        }
        Ok(series)
    }

    /// Reads a delimited table with `year`, optional `quarter`, and `index`
    /// columns.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, DeflatorError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut series = Self::new();
        for result in rdr.deserialize() {
            let row: IndexRow = result.map_err(|e| DeflatorError::Parse(e.to_string()))?;
            let key = DeflatorKey {
                year: row.year,
                quarter: row.quarter,
            };
            series.insert(key, row.index)?;
        }

        if series.is_empty() {
            return Err(DeflatorError::EmptySeries);
        }
        Ok(series)
    }

    pub fn load(path: &Path) -> Result<Self, DeflatorError> {
        let file = std::fs::File::open(path)
            .map_err(|e| DeflatorError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(file, b',')
    }

    pub fn insert(&mut self, key: DeflatorKey, value: f64) -> Result<(), DeflatorError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(DeflatorError::NonPositiveIndex { key, value });
        }
        match self.entries.entry(key) {
            Entry::Occupied(_) => Err(DeflatorError::DuplicatePeriod(key)),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: DeflatorKey) -> Option<f64> {
        self.entries.get(&key).copied()
    }

    /// Index for a survey period: the quarter's own entry if present, else
    /// the year's.
    pub fn lookup(&self, period: Period) -> Option<f64> {
        self.get(DeflatorKey::quarterly(period.year, period.quarter))
            .or_else(|| self.get(DeflatorKey::annual(period.year)))
    }

    pub fn latest_key(&self) -> Option<DeflatorKey> {
        self.entries.keys().max().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What the real values are expressed relative to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeflatorBase {
    /// A fixed reference level, usually 100.
    Fixed(f64),
    /// The index value of one period.
    Period(DeflatorKey),
    /// The index value of the latest period in the series.
    Latest,
}

impl Default for DeflatorBase {
    fn default() -> Self {
        DeflatorBase::Fixed(100.0)
    }
}

#[derive(Debug, Clone)]
pub struct Deflator {
    series: DeflatorSeries,
    base_value: f64,
}

impl Deflator {
    pub fn new(series: DeflatorSeries, base: DeflatorBase) -> Result<Self, DeflatorError> {
        let base_value = match base {
            DeflatorBase::Fixed(v) => v,
            DeflatorBase::Period(key) => series
                .get(key)
                .ok_or(DeflatorError::MissingBasePeriod(key))?,
            DeflatorBase::Latest => {
                let key = series.latest_key().ok_or(DeflatorError::EmptySeries)?;
                series
                    .get(key)
                    .ok_or(DeflatorError::MissingBasePeriod(key))?
            }
        };

        if !base_value.is_finite() || base_value <= 0.0 {
            return Err(DeflatorError::InvalidBase(base_value));
        }

        Ok(Self { series, base_value })
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    pub fn series(&self) -> &DeflatorSeries {
        &self.series
    }

    /// `base / index[period]`, or `None` when the period has no index.
    pub fn factor(&self, period: Period) -> Option<f64> {
        self.series.lookup(period).map(|index| self.base_value / index)
    }

    pub fn deflate(&self, nominal: f64, period: Period) -> Option<f64> {
        self.factor(period).map(|f| nominal * f)
    }

    /// Attaches real income to every respondent with an income.
    ///
    /// Respondents whose period has no index keep `real_income = None` and
    /// drop out of real aggregates only.
    pub fn join(&self, respondents: &mut [Respondent]) -> JoinReport {
        let mut report = JoinReport::default();

        for r in respondents.iter_mut() {
            r.real_income = r
                .record
                .income
                .and_then(|income| self.deflate(income, r.record.period));

            if r.eligible {
                if r.real_income.is_some() {
                    report.deflated += 1;
                } else {
                    report.missing_index += 1;
                    report.missing_periods.insert(r.record.period);
                }
            }
        }

        if report.missing_index > 0 {
            warn!(
                records = report.missing_index,
                periods = ?report.missing_periods,
                "No price index for some periods; excluded from real aggregates"
            );
        }
        info!(
            deflated = report.deflated,
            base = self.base_value,
            "Real income attached"
        );
        report
    }
}

/// Outcome of [`Deflator::join`], counted over eligible respondents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    pub deflated: usize,
    pub missing_index: usize,
    pub missing_periods: BTreeSet<Period>,
}
