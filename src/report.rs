use std::fmt::Write;
use std::path::Path;

use anyhow::Context;

use crate::aggregate;
use crate::models::{Dimension, FilterCriteria, MetricRow, PeriodComparison, Provenance};

/// Share of first-response time used to approximate handle time.
const HANDLE_TIME_FACTOR: f64 = 0.8;
const DETAIL_ROWS: usize = 10;

pub struct ReportContext<'a> {
    pub criteria: &'a FilterCriteria,
    pub provenance: Provenance,
}

fn scope_label(criteria: &FilterCriteria) -> String {
    let scopes: Vec<String> = [
        ("team", &criteria.team),
        ("queue", &criteria.queue),
        ("agent", &criteria.agent),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.as_ref().map(|value| format!("{label} {value}")))
    .collect();

    if scopes.is_empty() {
        "all teams, queues and agents".to_string()
    } else {
        scopes.join(", ")
    }
}

pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(pct) => format!("{pct:+.1}% vs previous period"),
        None => "no previous data".to_string(),
    }
}

fn write_distribution(output: &mut String, rows: &[MetricRow], dimension: Dimension) {
    let total = rows.len();
    for (value, count) in aggregate::distribution_by(rows, dimension) {
        let share = count as f64 / total as f64 * 100.0;
        let _ = writeln!(output, "- {value}: {count} conversations ({share:.0}%)");
    }
}

/// Renders the markdown dashboard for `current`, compared against `previous`.
pub fn build_report(
    context: &ReportContext<'_>,
    current: &[MetricRow],
    previous: &[MetricRow],
) -> String {
    let summary = aggregate::summarize(current);
    let comparison: PeriodComparison =
        aggregate::compare_periods(&summary, &aggregate::summarize(previous));

    let mut output = String::new();
    let _ = writeln!(output, "# Customer Experience Report");
    let _ = writeln!(
        output,
        "Generated for {} from {} to {} ({})",
        scope_label(context.criteria),
        context.criteria.start,
        context.criteria.end,
        context.provenance
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if current.is_empty() {
        let _ = writeln!(output, "No conversations recorded for this window.");
        return output;
    }

    let _ = writeln!(
        output,
        "- First response time: {:.2}h average ({})",
        summary.avg_response_time_hours,
        format_change(comparison.response_time_change_pct)
    );
    let _ = writeln!(
        output,
        "- CSAT: {:.1} of 5.0 ({})",
        summary.avg_satisfaction,
        format_change(comparison.satisfaction_change_pct)
    );
    let _ = writeln!(
        output,
        "- Contacts: {} across {} conversations ({})",
        summary.total_contact_volume,
        summary.row_count,
        format_change(comparison.contact_volume_change_pct)
    );
    let _ = writeln!(output, "- Busiest day: {}", summary.busiest_date);
    let _ = writeln!(
        output,
        "- Handle time: {:.2}h (estimate, {:.0}% of first response time)",
        summary.avg_response_time_hours * HANDLE_TIME_FACTOR,
        HANDLE_TIME_FACTOR * 100.0
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Trend");
    let _ = writeln!(output, "| Date | FRT (h) | CSAT | Contacts | Conversations |");
    let _ = writeln!(output, "|---|---:|---:|---:|---:|");
    for bucket in aggregate::bucket_by_date(current) {
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.1} | {} | {} |",
            bucket.date,
            bucket.avg_response_time_hours,
            bucket.avg_satisfaction,
            bucket.total_contact_volume,
            bucket.row_count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Conversations by Team");
    write_distribution(&mut output, current, Dimension::Team);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Conversations by Queue");
    write_distribution(&mut output, current, Dimension::Queue);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Conversation Detail");
    let _ = writeln!(output, "| Date | Team | Agent | FRT (h) | CSAT | Contacts |");
    let _ = writeln!(output, "|---|---|---|---:|---:|---:|");
    for row in current.iter().take(DETAIL_ROWS) {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.2} | {:.1} | {} |",
            row.date.format("%d/%m/%Y"),
            row.team,
            row.agent,
            row.first_response_time_hours,
            row.satisfaction_score,
            row.contact_volume
        );
    }
    if current.len() > DETAIL_ROWS {
        let _ = writeln!(output);
        let _ = writeln!(output, "Showing {} of {} conversations.", DETAIL_ROWS, current.len());
    }

    output
}

pub fn write_csv(rows: &[MetricRow], path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
