//! Domain filter, age filter, eligibility flag and category labels.
//!
//! Only the domain and age filters drop records. Income eligibility is a flag
//! so that non-respondents stay countable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::category::{CategoryLabels, Dimension};
use crate::record::MicroRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Domains of interest, code → display label.
    pub domains: BTreeMap<u32, String>,
    /// Records younger than this, or with no age, are dropped.
    pub min_age: Option<i32>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            domains: BTreeMap::from([
                (20, "Río Gallegos".to_string()),
                (27, "Gran San Juan".to_string()),
            ]),
            min_age: None,
        }
    }
}

/// A record in a domain of interest, with its derived fields.
#[derive(Debug, Clone)]
pub struct Respondent {
    pub record: MicroRecord,
    pub domain_label: Arc<str>,
    /// Income present and positive, weight positive.
    pub eligible: bool,
    pub labels: CategoryLabels,
    /// Set by [`crate::deflator::Deflator::join`]; `None` if the period has
    /// no index or income is missing.
    pub real_income: Option<f64>,
}

impl Respondent {
    /// `(income, weight)` for eligible records.
    pub fn nominal(&self) -> Option<(f64, f64)> {
        if !self.eligible {
            return None;
        }
        Some((self.record.income?, self.record.usable_weight()?))
    }

    /// `(real income, weight)` for eligible records with a deflator entry.
    pub fn real(&self) -> Option<(f64, f64)> {
        if !self.eligible {
            return None;
        }
        Some((self.real_income?, self.record.usable_weight()?))
    }
}

/// Counts of records removed or flagged at each gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizeReport {
    pub input: usize,
    pub outside_domains: usize,
    pub below_min_age: usize,
    pub retained: usize,
    pub income_missing: usize,
    pub income_non_positive: usize,
    pub weight_non_positive: usize,
    pub eligible: usize,
    /// Eligible records with no label, per breakdown dimension.
    pub unmapped: BTreeMap<String, usize>,
}

/// Filters to the domains of interest and attaches derived fields.
pub fn normalize(
    records: Vec<MicroRecord>,
    options: &NormalizeOptions,
) -> (Vec<Respondent>, NormalizeReport) {
    let labels: BTreeMap<u32, Arc<str>> = options
        .domains
        .iter()
        .map(|(code, label)| (*code, Arc::from(label.as_str())))
        .collect();

    let mut report = NormalizeReport {
        input: records.len(),
        ..Default::default()
    };
    let mut unmapped: BTreeMap<Dimension, usize> = BTreeMap::new();
    let mut respondents = Vec::with_capacity(records.len());

    for record in records {
        let Some(domain_label) = labels.get(&record.domain) else {
            report.outside_domains += 1;
            continue;
        };

        if let Some(min_age) = options.min_age {
            if record.age.is_none_or(|age| age < min_age) {
                report.below_min_age += 1;
                continue;
            }
        }

        let eligible = match record.income {
            None => {
                report.income_missing += 1;
                false
            }
            Some(income) if income <= 0.0 => {
                report.income_non_positive += 1;
                false
            }
            Some(_) if record.usable_weight().is_none() => {
                report.weight_non_positive += 1;
                false
            }
            Some(_) => true,
        };

        let category_labels = CategoryLabels::derive(
            record.age,
            record.sex,
            record.education,
            record.occupation,
            record.activity,
        );

        if eligible {
            report.eligible += 1;
            for dimension in Dimension::ALL {
                if category_labels.value(dimension).is_none() {
                    *unmapped.entry(dimension).or_default() += 1;
                }
            }
        }

        respondents.push(Respondent {
            record,
            domain_label: Arc::clone(domain_label),
            eligible,
            labels: category_labels,
            real_income: None,
        });
    }

    report.retained = respondents.len();
    report.unmapped = unmapped
        .into_iter()
        .map(|(d, n)| (d.name().to_string(), n))
        .collect();

    info!(
        input = report.input,
        outside_domains = report.outside_domains,
        below_min_age = report.below_min_age,
        income_missing = report.income_missing,
        income_non_positive = report.income_non_positive,
        weight_non_positive = report.weight_non_positive,
        eligible = report.eligible,
        "Records normalized"
    );

    (respondents, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{CategoryValue, Sex};
    use crate::record::Period;

    fn record(domain: u32, income: Option<f64>, weight: f64, age: i32) -> MicroRecord {
        let mut r = MicroRecord::new("t", Period::new(2017, 1), domain);
        r.income = income;
        r.weight = Some(weight);
        r.age = Some(age);
        r.sex = Some(1);
        r
    }

    #[test]
    fn test_domain_filter_and_label() {
        let records = vec![
            record(20, Some(100.0), 1.0, 30),
            record(99, Some(100.0), 1.0, 30),
            record(27, Some(100.0), 1.0, 30),
        ];
        let (out, report) = normalize(records, &NormalizeOptions::default());

        assert_eq!(out.len(), 2);
        assert_eq!(report.outside_domains, 1);
        assert_eq!(&*out[0].domain_label, "Río Gallegos");
        assert_eq!(&*out[1].domain_label, "Gran San Juan");
    }

    #[test]
    fn test_min_age_filter() {
        let mut no_age = record(20, Some(100.0), 1.0, 0);
        no_age.age = None;
        let records = vec![
            record(20, Some(100.0), 1.0, 13),
            record(20, Some(100.0), 1.0, 14),
            no_age,
        ];
        let options = NormalizeOptions {
            min_age: Some(14),
            ..Default::default()
        };
        let (out, report) = normalize(records, &options);

        assert_eq!(out.len(), 1);
        assert_eq!(report.below_min_age, 2);
        assert_eq!(out[0].record.age, Some(14));
    }

    #[test]
    fn test_ineligible_records_are_flagged_not_dropped() {
        let records = vec![
            record(20, None, 1.0, 30),
            record(20, Some(0.0), 1.0, 30),
            record(20, Some(-5.0), 1.0, 30),
            record(20, Some(100.0), 0.0, 30),
            record(20, Some(100.0), 2.0, 30),
        ];
        let (out, report) = normalize(records, &NormalizeOptions::default());

        assert_eq!(out.len(), 5);
        assert_eq!(report.retained, 5);
        assert_eq!(report.income_missing, 1);
        assert_eq!(report.income_non_positive, 2);
        assert_eq!(report.weight_non_positive, 1);
        assert_eq!(report.eligible, 1);
        assert_eq!(out.iter().filter(|r| r.eligible).count(), 1);
        assert_eq!(out[4].nominal(), Some((100.0, 2.0)));
        assert_eq!(out[3].nominal(), None);
    }

    #[test]
    fn test_labels_and_unmapped_counts() {
        let records = vec![record(20, Some(100.0), 1.0, 30)];
        let (out, report) = normalize(records, &NormalizeOptions::default());

        assert_eq!(
            out[0].labels.value(Dimension::Sex),
            Some(CategoryValue::Sex(Sex::Male))
        );
        assert_eq!(report.unmapped.get("education"), Some(&1));
        assert_eq!(report.unmapped.get("occupation"), Some(&1));
        assert_eq!(report.unmapped.get("sex"), None);
    }

    #[test]
    fn test_real_requires_real_income() {
        let (mut out, _) = normalize(
            vec![record(20, Some(100.0), 1.0, 30)],
            &NormalizeOptions::default(),
        );
        assert_eq!(out[0].real(), None);
        out[0].real_income = Some(50.0);
        assert_eq!(out[0].real(), Some((50.0, 1.0)));
    }
}
