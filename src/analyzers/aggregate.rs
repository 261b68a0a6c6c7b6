use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::analyzers::types::{GroupKey, SummaryRow, SummaryTable};
use crate::category::Dimension;
use crate::error::Result;
use crate::normalize::Respondent;
use crate::record::{PeriodGranularity, PeriodKey};
use crate::stats::{Distribution, WeightedSample, validate_levels};

struct Group<'a> {
    domain_label: &'a Arc<str>,
    members: Vec<&'a Respondent>,
}

/// Groups eligible respondents by domain, period and optionally one
/// dimension, and describes each group's income distribution.
///
/// Only eligible respondents are grouped, and a record with no label in
/// `dimension` is left out of that breakdown. A group therefore exists only
/// if it has at least one eligible record. Real statistics use the subset of
/// members with a real income. Rows come out sorted by domain, then period,
/// then category.
pub fn aggregate(
    respondents: &[Respondent],
    dimension: Option<Dimension>,
    granularity: PeriodGranularity,
    levels: &[f64],
) -> Result<SummaryTable> {
    validate_levels(levels)?;

    let mut groups: BTreeMap<GroupKey, Group<'_>> = BTreeMap::new();

    for r in respondents.iter().filter(|r| r.nominal().is_some()) {
        let category = match dimension {
            None => None,
            Some(d) => match r.labels.value(d) {
                Some(value) => Some(value),
                None => continue,
            },
        };

        let key = GroupKey {
            domain: r.record.domain,
            period: PeriodKey::of(r.record.period, granularity),
            category,
        };

        groups
            .entry(key)
            .or_insert_with(|| Group {
                domain_label: &r.domain_label,
                members: Vec::new(),
            })
            .members
            .push(r);
    }

    let mut rows = Vec::with_capacity(groups.len());

    for (key, group) in groups {
        let nominal = WeightedSample::from_pairs(group.members.iter().filter_map(|r| r.nominal()))?;
        let nominal = Distribution::describe(&nominal, levels)?;

        let real_pairs: Vec<(f64, f64)> = group.members.iter().filter_map(|r| r.real()).collect();
        let real = if real_pairs.is_empty() {
            None
        } else {
            Some(Distribution::describe(
                &WeightedSample::from_pairs(real_pairs)?,
                levels,
            )?)
        };

        debug!(
            domain = key.domain,
            period = %key.period,
            category = ?key.category,
            respondents = nominal.respondents,
            real_respondents = real.as_ref().map_or(0, |d| d.respondents),
            "Group aggregated"
        );

        rows.push(SummaryRow {
            domain: key.domain,
            domain_label: Arc::clone(group.domain_label),
            period: key.period,
            category: key.category,
            nominal,
            real,
        });
    }

    Ok(SummaryTable {
        dimension,
        quantiles: levels.to_vec(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{CategoryValue, Education, Sex};
    use crate::deflator::{Deflator, DeflatorBase, DeflatorKey, DeflatorSeries};
    use crate::normalize::{NormalizeOptions, normalize};
    use crate::record::{MicroRecord, Period};

    const LEVELS: [f64; 5] = [0.1, 0.25, 0.5, 0.75, 0.9];

    fn person(year: i32, domain: u32, income: f64, weight: f64, sex: i32) -> MicroRecord {
        let mut r = MicroRecord::new("t", Period::new(year, 1), domain).with_income(income, weight);
        r.sex = Some(sex);
        r.age = Some(40);
        r
    }

    fn prepared(records: Vec<MicroRecord>) -> Vec<Respondent> {
        let (mut respondents, _) = normalize(records, &NormalizeOptions::default());
        let series = DeflatorSeries::from_entries([(DeflatorKey::annual(2017), 200.0)]).unwrap();
        Deflator::new(series, DeflatorBase::Fixed(100.0))
            .unwrap()
            .join(&mut respondents);
        respondents
    }

    #[test]
    fn test_aggregate_single_group() {
        let respondents = prepared(vec![
            person(2017, 20, 100.0, 1.0, 1),
            person(2017, 20, 200.0, 1.0, 1),
            person(2017, 20, 300.0, 2.0, 2),
        ]);
        let table = aggregate(&respondents, None, PeriodGranularity::Year, &LEVELS).unwrap();

        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.nominal.mean, 225.0);
        assert_eq!(row.nominal.median, 200.0);

        let real = row.real.as_ref().unwrap();
        assert_eq!(real.mean, 112.5);
        assert_eq!(real.median, 100.0);
    }

    #[test]
    fn test_median_reported_without_half_level() {
        let respondents = prepared(vec![
            person(2017, 20, 100.0, 1.0, 1),
            person(2017, 20, 200.0, 1.0, 1),
            person(2017, 20, 300.0, 2.0, 2),
        ]);
        let table = aggregate(&respondents, None, PeriodGranularity::Year, &[0.1, 0.9]).unwrap();
        let row = &table.rows[0];

        assert_eq!(row.nominal.median, 200.0);
        assert_eq!(row.real.as_ref().unwrap().median, 100.0);
        assert_eq!(row.nominal.quantile(0.1), Some(100.0));
        assert_eq!(row.nominal.quantile(0.9), Some(300.0));
    }

    #[test]
    fn test_rows_sorted_by_domain_then_period() {
        let respondents = prepared(vec![
            person(2018, 27, 10.0, 1.0, 1),
            person(2017, 27, 10.0, 1.0, 1),
            person(2018, 20, 10.0, 1.0, 1),
            person(2017, 20, 10.0, 1.0, 1),
        ]);
        let table = aggregate(&respondents, None, PeriodGranularity::Year, &LEVELS).unwrap();

        let keys: Vec<(u32, i32)> = table
            .rows
            .iter()
            .map(|r| (r.domain, r.period.year))
            .collect();
        assert_eq!(keys, vec![(20, 2017), (20, 2018), (27, 2017), (27, 2018)]);
    }

    #[test]
    fn test_groups_without_eligible_records_are_omitted() {
        let mut no_income = person(2017, 27, 0.0, 1.0, 1);
        no_income.income = None;
        let respondents = prepared(vec![
            person(2017, 20, 100.0, 1.0, 1),
            no_income,
            person(2018, 27, -9.0, 1.0, 1),
        ]);
        let table = aggregate(&respondents, None, PeriodGranularity::Year, &LEVELS).unwrap();

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].domain, 20);
    }

    #[test]
    fn test_missing_index_excluded_from_real_only() {
        let mut respondents = prepared(vec![
            person(2017, 20, 100.0, 1.0, 1),
            person(2017, 20, 300.0, 1.0, 1),
        ]);
        respondents[1].real_income = None;

        let table = aggregate(&respondents, None, PeriodGranularity::Year, &LEVELS).unwrap();
        let row = &table.rows[0];
        let real = row.real.as_ref().unwrap();

        assert_eq!(row.nominal.respondents, 2);
        assert_eq!(real.respondents, 1);
        assert!(real.respondents < row.nominal.respondents);
        assert_eq!(real.mean, 50.0);
    }

    #[test]
    fn test_period_without_index_has_no_real_distribution() {
        let respondents = prepared(vec![person(2019, 20, 100.0, 1.0, 1)]);
        let table = aggregate(&respondents, None, PeriodGranularity::Year, &LEVELS).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert!(table.rows[0].real.is_none());
    }

    #[test]
    fn test_breakdown_by_sex() {
        let respondents = prepared(vec![
            person(2017, 20, 100.0, 1.0, 1),
            person(2017, 20, 300.0, 1.0, 2),
            person(2017, 20, 500.0, 1.0, 2),
            person(2017, 20, 700.0, 1.0, 9),
        ]);
        let table =
            aggregate(&respondents, Some(Dimension::Sex), PeriodGranularity::Year, &LEVELS).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].category, Some(CategoryValue::Sex(Sex::Male)));
        assert_eq!(table.rows[0].nominal.mean, 100.0);
        assert_eq!(table.rows[1].category, Some(CategoryValue::Sex(Sex::Female)));
        assert_eq!(table.rows[1].nominal.mean, 400.0);
        assert_eq!(table.name(), "income_by_domain_sex");
    }

    #[test]
    fn test_unmapped_records_only_leave_their_dimension() {
        let mut r = person(2017, 20, 100.0, 1.0, 1);
        r.education = Some(42);
        let respondents = prepared(vec![r]);

        let by_edu = aggregate(
            &respondents,
            Some(Dimension::Education),
            PeriodGranularity::Year,
            &LEVELS,
        )
        .unwrap();
        let by_sex =
            aggregate(&respondents, Some(Dimension::Sex), PeriodGranularity::Year, &LEVELS).unwrap();

        assert!(by_edu.rows.is_empty());
        assert_eq!(by_sex.rows.len(), 1);
    }

    #[test]
    fn test_education_rows_follow_tier_order() {
        let mut a = person(2017, 20, 100.0, 1.0, 1);
        a.education = Some(6);
        let mut b = person(2017, 20, 100.0, 1.0, 1);
        b.education = Some(2);
        let table = aggregate(
            &prepared(vec![a, b]),
            Some(Dimension::Education),
            PeriodGranularity::Year,
            &LEVELS,
        )
        .unwrap();

        assert_eq!(
            table.rows[0].category,
            Some(CategoryValue::Education(Education::PrimaryComplete))
        );
        assert_eq!(
            table.rows[1].category,
            Some(CategoryValue::Education(Education::TertiaryComplete))
        );
    }

    #[test]
    fn test_quarterly_granularity_splits_periods() {
        let mut q2 = person(2017, 20, 100.0, 1.0, 1);
        q2.period = Period::new(2017, 2);
        let respondents = prepared(vec![person(2017, 20, 100.0, 1.0, 1), q2]);

        let annual = aggregate(&respondents, None, PeriodGranularity::Year, &LEVELS).unwrap();
        let quarterly = aggregate(&respondents, None, PeriodGranularity::Quarter, &LEVELS).unwrap();

        assert_eq!(annual.rows.len(), 1);
        assert_eq!(quarterly.rows.len(), 2);
        assert_eq!(quarterly.rows[1].period.quarter, Some(2));
    }

    #[test]
    fn test_invalid_levels_rejected() {
        let respondents = prepared(vec![person(2017, 20, 100.0, 1.0, 1)]);
        assert!(aggregate(&respondents, None, PeriodGranularity::Year, &[1.5]).is_err());
    }
}
