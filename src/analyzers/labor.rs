use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analyzers::types::LaborRow;
use crate::category::ActivityStatus;
use crate::normalize::Respondent;
use crate::record::{PeriodGranularity, PeriodKey};

#[derive(Default)]
struct LaborTally {
    respondents: usize,
    employed: f64,
    unemployed: f64,
    inactive: f64,
}

/// Weighted activity, employment and unemployment rates per domain and
/// period.
///
/// Uses every retained respondent with a positive weight and a mapped
/// activity status, regardless of income. Activity and employment rates are
/// over that population; the unemployment rate is over the active
/// population only.
///
/// These are weighted rates under the usual labor-force definitions. They do
/// not match unweighted shares, nor an unemployment share taken over the
/// whole population with "active" meaning any status other than inactive.
pub fn labor_rates(respondents: &[Respondent], granularity: PeriodGranularity) -> Vec<LaborRow> {
    let mut tallies: BTreeMap<(u32, PeriodKey), (&Arc<str>, LaborTally)> = BTreeMap::new();

    for r in respondents {
        let (Some(status), Some(weight)) = (r.labels.activity.known(), r.record.usable_weight())
        else {
            continue;
        };

        let key = (r.record.domain, PeriodKey::of(r.record.period, granularity));
        let (_, tally) = tallies
            .entry(key)
            .or_insert_with(|| (&r.domain_label, LaborTally::default()));

        tally.respondents += 1;
        match status {
            ActivityStatus::Employed => tally.employed += weight,
            ActivityStatus::Unemployed => tally.unemployed += weight,
            ActivityStatus::Inactive => tally.inactive += weight,
        }
    }

    tallies
        .into_iter()
        .map(|((domain, period), (label, t))| {
            let active = t.employed + t.unemployed;
            let population = active + t.inactive;
            LaborRow {
                domain,
                domain_label: Arc::clone(label),
                period,
                respondents: t.respondents,
                activity_rate: active / population,
                employment_rate: t.employed / population,
                unemployment_rate: (active > 0.0).then(|| t.unemployed / active),
            }
        })
        .collect()
}
