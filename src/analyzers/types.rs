//! Data types produced by the aggregation pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::category::{CategoryValue, Dimension};
use crate::deflator::JoinReport;
use crate::loader::LoadReport;
use crate::normalize::NormalizeReport;
use crate::record::PeriodKey;
use crate::stats::Distribution;

/// Composite grouping key.
///
/// Field order is the sort order: domain, then period, then category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub domain: u32,
    pub period: PeriodKey,
    pub category: Option<CategoryValue>,
}

/// One output row: weighted income distribution of one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub domain: u32,
    pub domain_label: Arc<str>,
    pub period: PeriodKey,
    pub category: Option<CategoryValue>,
    pub nominal: Distribution,
    /// `None` when no record in the group has a price index.
    pub real: Option<Distribution>,
}

/// All rows of one breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryTable {
    /// `None` for the plain domain-by-period table.
    pub dimension: Option<Dimension>,
    pub quantiles: Vec<f64>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    /// File stem used when writing the table.
    pub fn name(&self) -> String {
        match self.dimension {
            None => "income_by_domain".to_string(),
            Some(d) => format!("income_by_domain_{}", d.name()),
        }
    }
}

/// Weighted labor-force rates for one domain and period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaborRow {
    pub domain: u32,
    pub domain_label: Arc<str>,
    pub period: PeriodKey,
    pub respondents: usize,
    pub activity_rate: f64,
    pub employment_rate: f64,
    /// `None` when the group has no active population.
    pub unemployment_rate: Option<f64>,
}

/// Everything a run reports besides its tables, written as `run_report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub load: LoadReport,
    pub normalize: NormalizeReport,
    pub deflation: JoinReport,
    pub deflator_base: f64,
    pub tables: Vec<TableSummary>,
}

/// Row count of one written table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: usize,
}
