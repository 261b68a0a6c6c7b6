use std::path::PathBuf;
use tracing::{info, warn};

use crate::analyzers::aggregate::aggregate;
use crate::analyzers::labor::labor_rates;
use crate::analyzers::types::{LaborRow, RunReport, SummaryTable, TableSummary};
use crate::config::PipelineConfig;
use crate::deflator::Deflator;
use crate::error::Result;
use crate::loader::{LoadedRecords, expand_sources, load_sources, load_sources_concurrent};
use crate::normalize::normalize;

/// Tables and diagnostics of one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub tables: Vec<SummaryTable>,
    pub labor: Vec<LaborRow>,
    pub report: RunReport,
}

/// Loads `paths` one at a time and analyzes them.
pub fn run(paths: &[PathBuf], config: &PipelineConfig) -> Result<RunOutput> {
    let deflator = config.build_deflator()?;
    let sources = expand_sources(paths)?;
    let loaded = load_sources(
        &sources,
        &config.schema,
        &config.extract_format()?,
        &config.required_covariates(),
    )?;
    analyze(loaded, config, &deflator)
}

/// Same as [`run`], reading up to `config.concurrency` sources at once.
pub async fn run_concurrent(paths: &[PathBuf], config: &PipelineConfig) -> Result<RunOutput> {
    let deflator = config.build_deflator()?;
    let sources = expand_sources(paths)?;
    let loaded = load_sources_concurrent(
        sources,
        config.schema.clone(),
        config.extract_format()?,
        config.required_covariates(),
        config.concurrency,
    )
    .await?;
    analyze(loaded, config, &deflator)
}

/// Normalizes, deflates and aggregates already loaded records.
///
/// Produces the plain domain-by-period table first, then one table per
/// configured breakdown.
#[tracing::instrument(skip_all, fields(records = loaded.records.len()))]
pub fn analyze(
    loaded: LoadedRecords,
    config: &PipelineConfig,
    deflator: &Deflator,
) -> Result<RunOutput> {
    let LoadedRecords { records, report: load } = loaded;

    let (mut respondents, normalized) = normalize(records, &config.normalize_options());
    for (dimension, count) in &normalized.unmapped {
        if config.breakdowns.iter().any(|d| d.name() == dimension) {
            warn!(dimension = %dimension, count, "Eligible records without a category label");
        }
    }

    let deflation = deflator.join(&mut respondents);

    let mut tables = Vec::with_capacity(config.breakdowns.len() + 1);
    tables.push(aggregate(
        &respondents,
        None,
        config.granularity,
        &config.quantiles,
    )?);
    for dimension in &config.breakdowns {
        tables.push(aggregate(
            &respondents,
            Some(*dimension),
            config.granularity,
            &config.quantiles,
        )?);
    }

    let labor = if config.labor_rates {
        labor_rates(&respondents, config.granularity)
    } else {
        Vec::new()
    };

    let summaries: Vec<TableSummary> = tables
        .iter()
        .map(|t| TableSummary {
            name: t.name(),
            rows: t.rows.len(),
        })
        .collect();
    for s in &summaries {
        info!(table = %s.name, rows = s.rows, "Table aggregated");
    }

    Ok(RunOutput {
        tables,
        labor,
        report: RunReport {
            generated_at: chrono::Utc::now(),
            load,
            normalize: normalized,
            deflation,
            deflator_base: deflator.base_value(),
            tables: summaries,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Dimension;
    use crate::deflator::{DeflatorBase, DeflatorKey, DeflatorSeries};
    use crate::loader::{AcceptedSource, LoadReport};
    use crate::record::{MicroRecord, Period};

    fn loaded(records: Vec<MicroRecord>) -> LoadedRecords {
        LoadedRecords {
            report: LoadReport {
                accepted: vec![AcceptedSource {
                    source: "t".into(),
                    rows: records.len(),
                    records: records.len(),
                    rows_without_key: 0,
                    income_missing: 0,
                    weight_column: "PONDERA".into(),
                }],
                rejected: Vec::new(),
            },
            records,
        }
    }

    fn person(income: f64, weight: f64, sex: i32) -> MicroRecord {
        let mut r = MicroRecord::new("t", Period::new(2017, 1), 20).with_income(income, weight);
        r.sex = Some(sex);
        r.activity = Some(1);
        r
    }

    fn deflator() -> Deflator {
        let series = DeflatorSeries::from_entries([(DeflatorKey::annual(2017), 200.0)]).unwrap();
        Deflator::new(series, DeflatorBase::Fixed(100.0)).unwrap()
    }

    #[test]
    fn test_analyze_produces_one_table_per_breakdown() {
        let config = PipelineConfig {
            breakdowns: vec![Dimension::Sex],
            ..Default::default()
        };
        let out = analyze(
            loaded(vec![person(100.0, 1.0, 1), person(200.0, 1.0, 2), person(300.0, 2.0, 2)]),
            &config,
            &deflator(),
        )
        .unwrap();

        assert_eq!(out.tables.len(), 2);
        assert_eq!(out.tables[0].name(), "income_by_domain");
        assert_eq!(out.tables[0].rows[0].nominal.mean, 225.0);
        assert_eq!(out.tables[1].rows.len(), 2);
        assert_eq!(out.labor.len(), 1);
        assert_eq!(out.report.deflation.deflated, 3);
        assert_eq!(out.report.deflator_base, 100.0);
        assert_eq!(out.report.tables[1].name, "income_by_domain_sex");
    }

    #[test]
    fn test_labor_rates_can_be_disabled() {
        let config = PipelineConfig {
            breakdowns: Vec::new(),
            labor_rates: false,
            ..Default::default()
        };
        let out = analyze(loaded(vec![person(100.0, 1.0, 1)]), &config, &deflator()).unwrap();
        assert_eq!(out.tables.len(), 1);
        assert!(out.labor.is_empty());
    }

    #[test]
    fn test_records_outside_domains_reported() {
        let mut outside = person(100.0, 1.0, 1);
        outside.domain = 99;
        let out = analyze(
            loaded(vec![person(100.0, 1.0, 1), outside]),
            &PipelineConfig::default(),
            &deflator(),
        )
        .unwrap();
        assert_eq!(out.report.normalize.outside_domains, 1);
        assert_eq!(out.report.normalize.eligible, 1);
    }
}
