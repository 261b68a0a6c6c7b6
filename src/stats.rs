//! Weighted distributional statistics under sampling weights.
//!
//! Quantiles use the weighted nearest-rank rule: sort by value, accumulate
//! weight, and return the first value whose cumulative weight reaches
//! `q * total`. There is no interpolation between neighbouring values.
//! Degenerate inputs return a [`StatsError`] instead of NaN.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("no observations")]
    Empty,
    #[error("length mismatch: {values} values but {weights} weights")]
    LengthMismatch { values: usize, weights: usize },
    #[error("total weight is zero")]
    ZeroTotalWeight,
    #[error("weight {0} is negative or not finite")]
    InvalidWeight(f64),
    #[error("value {0} is not finite")]
    NonFinite(f64),
    #[error("probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
    #[error("probability {0} is listed more than once")]
    DuplicateLevel(f64),
}

/// `sum(value * weight) / sum(weight)`.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Result<f64, StatsError> {
    Ok(WeightedSample::new(values, weights)?.mean())
}

/// Weighted nearest-rank quantile at probability `q` in `[0, 1]`.
///
/// `q = 0` yields the minimum and `q = 1` the maximum positively weighted
/// value. When computing several levels on the same data, build a
/// [`WeightedSample`] once instead.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> Result<f64, StatsError> {
    WeightedSample::new(values, weights)?.quantile(q)
}

/// Checks that every level is a probability and appears once.
pub fn validate_levels(levels: &[f64]) -> Result<(), StatsError> {
    for (i, q) in levels.iter().enumerate() {
        if !(0.0..=1.0).contains(q) {
            return Err(StatsError::InvalidProbability(*q));
        }
        if levels[..i].contains(q) {
            return Err(StatsError::DuplicateLevel(*q));
        }
    }
    Ok(())
}

/// Column-friendly name for a quantile level: `0.5` is `median`, `0.1` is `p10`.
pub fn quantile_label(level: f64) -> String {
    if level == 0.5 {
        return "median".to_string();
    }
    let pct = level * 100.0;
    if (pct - pct.round()).abs() < 1e-9 {
        format!("p{}", pct.round() as i64)
    } else {
        format!("p{}", pct)
    }
}

/// Value/weight pairs sorted by value with their running weight total.
///
/// Sorting happens once in [`WeightedSample::new`]; each quantile lookup is
/// then a binary search over the cumulative weights.
#[derive(Debug, Clone)]
pub struct WeightedSample {
    values: Vec<f64>,
    cumulative: Vec<f64>,
    weighted_sum: f64,
}

impl WeightedSample {
    pub fn new(values: &[f64], weights: &[f64]) -> Result<Self, StatsError> {
        if values.len() != weights.len() {
            return Err(StatsError::LengthMismatch {
                values: values.len(),
                weights: weights.len(),
            });
        }
        Self::from_pairs(values.iter().copied().zip(weights.iter().copied()))
    }

    /// Builds a sample from `(value, weight)` pairs.
    ///
    /// Zero weights are allowed as long as the total is positive.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, StatsError>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut pairs: Vec<(f64, f64)> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Err(StatsError::Empty);
        }

        for &(value, weight) in &pairs {
            if !value.is_finite() {
                return Err(StatsError::NonFinite(value));
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(StatsError::InvalidWeight(weight));
            }
        }

        // stable: ties keep input order, which does not affect the cumulative sum
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut values = Vec::with_capacity(pairs.len());
        let mut cumulative = Vec::with_capacity(pairs.len());
        let mut running = 0.0;
        let mut weighted_sum = 0.0;
        for (value, weight) in pairs {
            running += weight;
            weighted_sum += value * weight;
            values.push(value);
            cumulative.push(running);
        }

        if running <= 0.0 {
            return Err(StatsError::ZeroTotalWeight);
        }

        Ok(Self {
            values,
            cumulative,
            weighted_sum,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        // non-empty by construction
        self.cumulative[self.cumulative.len() - 1]
    }

    pub fn mean(&self) -> f64 {
        self.weighted_sum / self.total_weight()
    }

    pub fn quantile(&self, q: f64) -> Result<f64, StatsError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(StatsError::InvalidProbability(q));
        }
        let target = q * self.total_weight();
        // leading zero-weight values never count as reached
        let idx = self
            .cumulative
            .partition_point(|&c| c < target || c <= 0.0);
        Ok(self.values[idx.min(self.values.len() - 1)])
    }

    pub fn median(&self) -> f64 {
        // 0.5 is always a valid level
        self.quantile(0.5).unwrap_or(self.values[0])
    }
}

/// One quantile of a [`Distribution`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileValue {
    pub level: f64,
    pub value: f64,
}

/// Weighted summary of one group's values.
///
/// The median is always present; `quantiles` holds the configured levels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub respondents: usize,
    pub weight_total: f64,
    pub mean: f64,
    pub median: f64,
    pub quantiles: Vec<QuantileValue>,
}

impl Distribution {
    pub fn describe(sample: &WeightedSample, levels: &[f64]) -> Result<Self, StatsError> {
        let quantiles = levels
            .iter()
            .map(|&level| {
                sample
                    .quantile(level)
                    .map(|value| QuantileValue { level, value })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            respondents: sample.len(),
            weight_total: sample.total_weight(),
            mean: sample.mean(),
            median: sample.median(),
            quantiles,
        })
    }

    pub fn quantile(&self, level: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|q| q.level == level)
            .map(|q| q.value)
    }
}
