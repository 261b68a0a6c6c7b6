//! Run configuration.
//!
//! Stored as a JSON object on disk; every field is optional:
//! ```json
//! {
//!   "domains": { "20": "Río Gallegos", "27": "Gran San Juan" },
//!   "min_age": 14,
//!   "granularity": "year",
//!   "breakdowns": ["sex", "education"],
//!   "deflator": { "index_file": "ipc.csv", "base": { "period": { "year": 2016 } } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::category::Dimension;
use crate::deflator::{Deflator, DeflatorBase, DeflatorSeries};
use crate::error::{PipelineError, Result};
use crate::loader::{Covariate, ExtractFormat, ExtractSchema};
use crate::normalize::NormalizeOptions;
use crate::record::PeriodGranularity;
use crate::stats::validate_levels;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub delimiter: String,
    /// WHATWG label, e.g. `latin1` or `utf-8`.
    pub encoding: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            delimiter: ";".to_string(),
            encoding: "latin1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeflatorConfig {
    /// Price index table; the built-in annual series when absent.
    pub index_file: Option<PathBuf>,
    pub base: DeflatorBase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema: ExtractSchema,
    pub format: FormatConfig,
    pub domains: BTreeMap<u32, String>,
    pub min_age: Option<i32>,
    pub granularity: PeriodGranularity,
    pub quantiles: Vec<f64>,
    pub breakdowns: Vec<Dimension>,
    pub labor_rates: bool,
    pub deflator: DeflatorConfig,
    /// Maximum number of sources read at once.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: ExtractSchema::default(),
            format: FormatConfig::default(),
            domains: NormalizeOptions::default().domains,
            min_age: None,
            granularity: PeriodGranularity::default(),
            quantiles: vec![0.10, 0.25, 0.5, 0.75, 0.90],
            breakdowns: Dimension::ALL.to_vec(),
            labor_rates: true,
            deflator: DeflatorConfig::default(),
            concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_levels(&self.quantiles)?;
        if self.quantiles.is_empty() {
            return Err(PipelineError::Config("at least one quantile level is required".into()));
        }
        if self.domains.is_empty() {
            return Err(PipelineError::Config("no domains of interest configured".into()));
        }
        if self.schema.weight.is_empty() {
            return Err(PipelineError::Config("no weight column configured".into()));
        }
        self.extract_format()?;
        Ok(())
    }

    pub fn extract_format(&self) -> Result<ExtractFormat> {
        ExtractFormat::from_labels(&self.format.delimiter, &self.format.encoding)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            domains: self.domains.clone(),
            min_age: self.min_age,
        }
    }

    /// Covariate columns every source must carry for this run.
    pub fn required_covariates(&self) -> Vec<Covariate> {
        let mut needs: Vec<Covariate> = self
            .breakdowns
            .iter()
            .map(|d| Covariate::for_dimension(*d))
            .collect();
        if self.min_age.is_some() {
            needs.push(Covariate::Age);
        }
        needs.sort();
        needs.dedup();
        needs
    }

    pub fn build_deflator(&self) -> Result<Deflator> {
        let series = match &self.deflator.index_file {
            Some(path) => DeflatorSeries::load(path)?,
            None => DeflatorSeries::builtin(),
        };
        Ok(Deflator::new(series, self.deflator.base)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deflator::DeflatorKey;
    use crate::stats::StatsError;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.build_deflator().unwrap().base_value(), 100.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "domains": { "13": "Gran Córdoba" },
            "min_age": 14,
            "granularity": "quarter",
            "breakdowns": ["sex"],
            "deflator": { "base": { "period": { "year": 2017 } } }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.domains.get(&13).map(String::as_str), Some("Gran Córdoba"));
        assert_eq!(config.granularity, PeriodGranularity::Quarter);
        assert_eq!(config.schema.income, "P47T");
        assert_eq!(config.quantiles.len(), 5);
        assert_eq!(
            config.deflator.base,
            DeflatorBase::Period(DeflatorKey::annual(2017))
        );
        assert_eq!(
            config.required_covariates(),
            vec![Covariate::Age, Covariate::Sex]
        );
    }

    #[test]
    fn test_latest_base_from_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "deflator": { "base": "latest" } }"#).unwrap();
        assert_eq!(config.deflator.base, DeflatorBase::Latest);
    }

    #[test]
    fn test_invalid_quantile_rejected() {
        let config = PipelineConfig {
            quantiles: vec![0.5, 1.2],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_quantile_rejected() {
        let config = PipelineConfig {
            quantiles: vec![0.5, 0.9, 0.5],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Stats(StatsError::DuplicateLevel(_)))
        ));
    }

    #[test]
    fn test_levels_without_median_are_valid() {
        let config = PipelineConfig {
            quantiles: vec![0.1, 0.9],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let config = PipelineConfig {
            format: FormatConfig {
                delimiter: ";".into(),
                encoding: "ebcdic-martian".into(),
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "concurrency": 2 }"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.concurrency, 2);
        assert!(PipelineConfig::load(&dir.path().join("absent.json")).is_err());
    }
}
