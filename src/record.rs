//! Typed survey records.
//!
//! Every column lookup happens once, in the loader; later stages only see
//! [`MicroRecord`] fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One survey wave: calendar year and quarter (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub quarter: u8,
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Self {
        Self { year, quarter }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.year, self.quarter)
    }
}

/// How finely periods are distinguished when grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    /// Pool all quarters of a year into one group.
    #[default]
    Year,
    Quarter,
}

/// The period component of a grouping key.
///
/// `quarter` is `None` when grouping annually. Ordering is year first, with an
/// annual key sorting before any quarter of the same year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeriodKey {
    pub year: i32,
    pub quarter: Option<u8>,
}

impl PeriodKey {
    pub fn of(period: Period, granularity: PeriodGranularity) -> Self {
        match granularity {
            PeriodGranularity::Year => Self {
                year: period.year,
                quarter: None,
            },
            PeriodGranularity::Quarter => Self {
                year: period.year,
                quarter: Some(period.quarter),
            },
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quarter {
            Some(q) => write!(f, "{}T{}", self.year, q),
            None => write!(f, "{}", self.year),
        }
    }
}

/// One respondent observation from one survey wave.
///
/// `income` is already normalized: the "no response" sentinel and values that
/// failed numeric coercion are both `None`. Covariates are the raw survey
/// codes; labels are derived from them by [`crate::normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct MicroRecord {
    /// Name of the extract the row came from.
    pub source: Arc<str>,
    pub period: Period,
    pub domain: u32,
    pub income: Option<f64>,
    pub weight: Option<f64>,
    pub age: Option<i32>,
    pub sex: Option<i32>,
    pub education: Option<i32>,
    pub occupation: Option<i32>,
    pub activity: Option<i32>,
}

impl MicroRecord {
    /// A record with only the key fields set. Mostly useful for tests and
    /// hand-built inputs.
    pub fn new(source: &str, period: Period, domain: u32) -> Self {
        Self {
            source: Arc::from(source),
            period,
            domain,
            income: None,
            weight: None,
            age: None,
            sex: None,
            education: None,
            occupation: None,
            activity: None,
        }
    }

    pub fn with_income(mut self, income: f64, weight: f64) -> Self {
        self.income = Some(income);
        self.weight = Some(weight);
        self
    }

    /// Sampling weight if strictly positive.
    pub fn usable_weight(&self) -> Option<f64> {
        self.weight.filter(|w| w.is_finite() && *w > 0.0)
    }
}
