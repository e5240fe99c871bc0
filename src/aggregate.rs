use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::{DateBucket, Dimension, FilterCriteria, MetricRow, PeriodComparison, SummaryStats};

pub const NOT_AVAILABLE: &str = "N/A";

/// Running totals for a group of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Totals {
    response_hours: f64,
    satisfaction: f64,
    contact_volume: u64,
    rows: usize,
}

impl Totals {
    fn add(self, row: &MetricRow) -> Self {
        Self {
            response_hours: self.response_hours + row.first_response_time_hours,
            satisfaction: self.satisfaction + row.satisfaction_score,
            contact_volume: self.contact_volume + u64::from(row.contact_volume),
            rows: self.rows + 1,
        }
    }

    fn avg_response_hours(&self) -> f64 {
        mean(self.response_hours, self.rows)
    }

    fn avg_satisfaction(&self) -> f64 {
        mean(self.satisfaction, self.rows)
    }
}

fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn matches(value: &str, wanted: Option<&str>) -> bool {
    wanted.map_or(true, |wanted| value == wanted)
}

/// Rows inside the inclusive date window whose dimensions match every set criterion.
pub fn filter(rows: &[MetricRow], criteria: &FilterCriteria) -> Vec<MetricRow> {
    rows.iter()
        .filter(|row| row.date >= criteria.start && row.date <= criteria.end)
        .filter(|row| matches(&row.team, criteria.team.as_deref()))
        .filter(|row| matches(&row.queue, criteria.queue.as_deref()))
        .filter(|row| matches(&row.agent, criteria.agent.as_deref()))
        .cloned()
        .collect()
}

fn totals_by_date(rows: &[MetricRow]) -> BTreeMap<NaiveDate, Totals> {
    rows.iter().fold(BTreeMap::new(), |mut acc, row| {
        let totals = acc.entry(row.date).or_insert_with(Totals::default);
        *totals = totals.add(row);
        acc
    })
}

pub fn summarize(rows: &[MetricRow]) -> SummaryStats {
    let totals = rows.iter().fold(Totals::default(), Totals::add);

    // Earliest date wins a volume tie.
    let busiest_date = totals_by_date(rows)
        .into_iter()
        .fold(None::<(NaiveDate, u64)>, |best, (date, day)| match best {
            Some((_, volume)) if volume >= day.contact_volume => best,
            _ => Some((date, day.contact_volume)),
        })
        .map(|(date, _)| date.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    SummaryStats {
        avg_response_time_hours: totals.avg_response_hours(),
        avg_satisfaction: totals.avg_satisfaction(),
        total_contact_volume: totals.contact_volume,
        row_count: totals.rows,
        busiest_date,
    }
}

/// Per-day averages in ascending date order. Days without rows are not filled in.
pub fn bucket_by_date(rows: &[MetricRow]) -> Vec<DateBucket> {
    totals_by_date(rows)
        .into_iter()
        .map(|(date, totals)| DateBucket {
            date,
            avg_response_time_hours: totals.avg_response_hours(),
            avg_satisfaction: totals.avg_satisfaction(),
            total_contact_volume: totals.contact_volume,
            row_count: totals.rows,
        })
        .collect()
}

pub fn distribution_by(rows: &[MetricRow], dimension: Dimension) -> BTreeMap<String, usize> {
    rows.iter().fold(BTreeMap::new(), |mut acc, row| {
        *acc.entry(dimension.value_of(row).to_string()).or_insert(0) += 1;
        acc
    })
}

pub fn distinct_values(rows: &[MetricRow], dimension: Dimension) -> Vec<String> {
    rows.iter()
        .map(|row| dimension.value_of(row))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

pub fn compare_periods(current: &SummaryStats, previous: &SummaryStats) -> PeriodComparison {
    PeriodComparison {
        response_time_change_pct: percent_change(
            current.avg_response_time_hours,
            previous.avg_response_time_hours,
        ),
        satisfaction_change_pct: percent_change(current.avg_satisfaction, previous.avg_satisfaction),
        contact_volume_change_pct: percent_change(
            current.total_contact_volume as f64,
            previous.total_contact_volume as f64,
        ),
    }
}
