use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod error;
mod models;
mod normalize;
mod report;
mod source;
mod synthetic;

use models::{Dimension, FilterCriteria, MetricRow, Provenance};
use source::{HelpdeskClient, SourceConfig, DEFAULT_API_URL};

#[derive(Parser)]
#[command(name = "cx-metrics")]
#[command(about = "Customer experience metrics from helpdesk conversations", long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Helpdesk API base URL
    #[arg(long, env = "HELPDESK_API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,
    /// Bearer token; without one the synthetic data set is used
    #[arg(long, env = "KUSTOMER_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,
    #[arg(long, env = "HELPDESK_TIMEOUT_SECS", default_value_t = 5, global = true)]
    timeout_secs: u64,
    #[arg(long, default_value_t = 100, global = true)]
    page_size: u32,
    /// Read conversations from a saved API response instead of the helpdesk
    #[arg(long, global = true)]
    input: Option<PathBuf>,
}

impl SourceArgs {
    fn config(&self) -> SourceConfig {
        SourceConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            page_size: self.page_size.max(1),
            input: self.input.clone(),
        }
    }
}

#[derive(Args)]
struct WindowArgs {
    /// First day of the window (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day of the window (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Window length ending today, used when neither bound is given
    #[arg(long, default_value_t = 7)]
    days: i64,
    #[arg(long)]
    team: Option<String>,
    #[arg(long)]
    queue: Option<String>,
    #[arg(long)]
    agent: Option<String>,
}

impl WindowArgs {
    fn criteria(&self) -> anyhow::Result<FilterCriteria> {
        let (start, end) = match (self.start, self.end) {
            (None, None) => (Some(cutoff_date(self.days)), Some(Utc::now().date_naive())),
            bounds => bounds,
        };
        let criteria = FilterCriteria::from_bounds(start, end)?
            .with_team(self.team.clone())
            .with_queue(self.queue.clone())
            .with_agent(self.agent.clone());
        if criteria.start > criteria.end {
            warn!(start = %criteria.start, end = %criteria.end, "start is after end, window is empty");
        }
        Ok(criteria)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print summary metrics for the window
    Summary {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the filtered metric rows as CSV
    Export {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, default_value = "metrics.csv")]
        out: PathBuf,
    },
    /// List the values present for a dimension, with conversation counts
    Dimensions {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, default_value = "team")]
        dimension: Dimension,
    },
    /// Check whether the helpdesk API is reachable
    Check,
}

fn cutoff_date(days: i64) -> NaiveDate {
    Utc::now().date_naive() - chrono::Duration::days(days.max(1))
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

/// Loads and normalizes every conversation in `[start, end]`.
async fn load_rows(
    config: &SourceConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<(Provenance, Vec<MetricRow>)> {
    let set = source::load_records(config, start, end).await?;
    let rows = normalize::normalize_all(&set.records, &set.directory);
    Ok((set.provenance, rows))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = cli.source.config();

    match cli.command {
        Commands::Summary { window } => {
            let criteria = window.criteria()?;
            let (provenance, rows) = load_rows(&config, criteria.start, criteria.end).await?;
            let rows = aggregate::filter(&rows, &criteria);
            let summary = aggregate::summarize(&rows);

            println!(
                "Metrics from {} to {} ({provenance}):",
                criteria.start, criteria.end
            );
            if rows.is_empty() {
                println!("No conversations found for this window.");
                return Ok(());
            }
            println!("- First response time: {:.2}h average", summary.avg_response_time_hours);
            println!("- CSAT: {:.1} of 5.0", summary.avg_satisfaction);
            println!(
                "- Contacts: {} across {} conversations",
                summary.total_contact_volume, summary.row_count
            );
            println!("- Busiest day: {}", summary.busiest_date);
            println!(
                "- Agents: {}",
                aggregate::distinct_values(&rows, Dimension::Agent).join(", ")
            );

            println!("Conversations by team:");
            for (team, count) in aggregate::distribution_by(&rows, Dimension::Team) {
                println!("- {team}: {count}");
            }

            println!("Daily trend:");
            for bucket in aggregate::bucket_by_date(&rows) {
                println!(
                    "- {}: FRT {:.2}h, CSAT {:.1}, {} contacts",
                    bucket.date,
                    bucket.avg_response_time_hours,
                    bucket.avg_satisfaction,
                    bucket.total_contact_volume
                );
            }
        }
        Commands::Report { window, out } => {
            let criteria = window.criteria()?;
            let previous = criteria.previous_period();
            let (provenance, rows) = load_rows(&config, previous.start, criteria.end).await?;
            let current_rows = aggregate::filter(&rows, &criteria);
            let previous_rows = aggregate::filter(&rows, &previous);

            let context = report::ReportContext {
                criteria: &criteria,
                provenance,
            };
            let report = report::build_report(&context, &current_rows, &previous_rows);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(rows = current_rows.len(), "report generated");
            println!("Report written to {}.", out.display());
        }
        Commands::Export { window, out } => {
            let criteria = window.criteria()?;
            let (_, rows) = load_rows(&config, criteria.start, criteria.end).await?;
            let rows = aggregate::filter(&rows, &criteria);
            report::write_csv(&rows, &out)?;
            println!("Exported {} rows to {}.", rows.len(), out.display());
        }
        Commands::Dimensions { window, dimension } => {
            let criteria = window.criteria()?;
            let (_, rows) = load_rows(&config, criteria.start, criteria.end).await?;
            let rows = aggregate::filter(&rows, &criteria);
            let distribution = aggregate::distribution_by(&rows, dimension);

            if distribution.is_empty() {
                println!("No conversations found for this window.");
                return Ok(());
            }
            println!("Values for {dimension}:");
            for (value, count) in distribution {
                println!("- {value} ({count} conversations)");
            }
        }
        Commands::Check => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .context("KUSTOMER_API_KEY must be set to check the helpdesk connection")?;
            let client = HelpdeskClient::new(&config, api_key)?;

            match client.check_connection().await {
                Ok(()) => println!("Helpdesk reachable at {} (live mode).", config.api_url),
                Err(err) => {
                    warn!(error = %err, "helpdesk connection check failed");
                    println!(
                        "Helpdesk unreachable at {}: {err}. Synthetic data will be used.",
                        config.api_url
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cx-metrics").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn explicit_bounds_build_criteria() {
        let cli = parse(&["summary", "--start", "2024-01-01", "--end", "2024-01-07", "--team", "Sales"]);
        let Commands::Summary { window } = cli.command else {
            panic!("expected summary");
        };
        let criteria = window.criteria().unwrap();
        assert_eq!(criteria.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(criteria.end, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(criteria.team.as_deref(), Some("Sales"));
        assert_eq!(criteria.agent, None);
    }

    #[test]
    fn single_bound_is_rejected() {
        let cli = parse(&["export", "--start", "2024-01-01"]);
        let Commands::Export { window, .. } = cli.command else {
            panic!("expected export");
        };
        let err = window.criteria().unwrap_err();
        assert_eq!(err.to_string(), "date range is missing its end date");
    }

    #[test]
    fn default_window_ends_today() {
        let cli = parse(&["summary", "--days", "14"]);
        let Commands::Summary { window } = cli.command else {
            panic!("expected summary");
        };
        let criteria = window.criteria().unwrap();
        assert_eq!(criteria.end, Utc::now().date_naive());
        assert_eq!(criteria.start, cutoff_date(14));
    }

    #[test]
    fn dimension_argument_is_parsed() {
        let cli = parse(&["dimensions", "--dimension", "queue"]);
        assert!(matches!(
            cli.command,
            Commands::Dimensions {
                dimension: Dimension::Queue,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["cx-metrics", "dimensions", "--dimension", "region"]).is_err());
    }

    #[test]
    fn source_flags_are_global() {
        let cli = parse(&["check", "--api-url", "http://localhost:5000", "--timeout-secs", "0"]);
        let config = cli.source.config();
        assert_eq!(config.api_url, "http://localhost:5000");
        assert_eq!(config.timeout, Duration::from_secs(1));
    }
}
