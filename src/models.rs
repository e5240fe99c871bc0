use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MetricsError;

/// One conversation as the helpdesk returns it, inside the `{id, attributes}` envelope.
///
/// Only `createdAt` is required. Every other field is decoded leniently: a value
/// of the wrong type reads as absent so the normalizer falls back past it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConversation {
    #[serde(default)]
    pub id: String,
    pub attributes: ConversationAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAttributes {
    /// Kept with its original offset; `date` is the calendar day as written.
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, deserialize_with = "lenient")]
    pub first_done: Option<CompletionEvent>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_done: Option<CompletionEvent>,
    #[serde(default, deserialize_with = "lenient")]
    pub first_response: Option<FirstResponse>,
    #[serde(default, deserialize_with = "lenient")]
    pub first_message_out: Option<FirstMessageOut>,
    #[serde(default, deserialize_with = "lenient")]
    pub satisfaction: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub satisfaction_level: Option<SatisfactionLevel>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub assigned_teams: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub assigned_users: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub channels: Vec<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub message_count: Option<i64>,
}

/// A "done" marker recorded when an agent completes the conversation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    /// Elapsed milliseconds from creation to completion.
    #[serde(default, deserialize_with = "lenient")]
    pub time: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub created_by_teams: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstMessageOut {
    #[serde(default, deserialize_with = "lenient")]
    pub sent_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SatisfactionLevel {
    #[serde(default, deserialize_with = "lenient_list")]
    pub answers: Vec<SurveyAnswer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveyAnswer {
    #[serde(default, deserialize_with = "lenient")]
    pub rating: Option<f64>,
}

/// A team or user as listed by the helpdesk directory endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    #[serde(default)]
    pub attributes: DirectoryAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryAttributes {
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Read-only id lookups for teams and users.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    pub teams: HashMap<String, DirectoryAttributes>,
    pub users: HashMap<String, DirectoryAttributes>,
}

impl Directory {
    pub fn from_entries(teams: Vec<DirectoryEntry>, users: Vec<DirectoryEntry>) -> Self {
        Self {
            teams: teams.into_iter().map(|e| (e.id, e.attributes)).collect(),
            users: users.into_iter().map(|e| (e.id, e.attributes)).collect(),
        }
    }

    pub fn team_name(&self, id: &str) -> Option<String> {
        let team = self.teams.get(id)?;
        non_empty(&team.display_name).or_else(|| non_empty(&team.name))
    }

    /// Users without a display name fall back to their login name, then email.
    pub fn user_name(&self, id: &str) -> Option<String> {
        let user = self.users.get(id)?;
        non_empty(&user.display_name)
            .or_else(|| non_empty(&user.name))
            .or_else(|| non_empty(&user.email))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string)
}

/// Any value that does not decode as `T` (including `null`) reads as `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Keeps the elements of an array that decode as `T`; anything else is empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Whole numbers, including float-encoded ones like `3.0`.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Number(number) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(number.as_i64().or_else(|| {
        number
            .as_f64()
            .filter(|n| n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64)
            .map(|n| n as i64)
    }))
}

/// The canonical per-conversation row every aggregate is computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub team: String,
    pub queue: String,
    pub agent: String,
    pub first_response_time_hours: f64,
    pub satisfaction_score: f64,
    pub contact_volume: u32,
}

/// Inclusive date window plus optional exact-match dimension filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub team: Option<String>,
    pub queue: Option<String>,
    pub agent: Option<String>,
}

impl FilterCriteria {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            team: None,
            queue: None,
            agent: None,
        }
    }

    /// Both bounds are required; a missing one is a caller error, not an empty window.
    pub fn from_bounds(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, MetricsError> {
        let start = start.ok_or(MetricsError::MissingDateBound { bound: "start" })?;
        let end = end.ok_or(MetricsError::MissingDateBound { bound: "end" })?;
        Ok(Self::new(start, end))
    }

    pub fn with_team(mut self, team: Option<String>) -> Self {
        self.team = team;
        self
    }

    pub fn with_queue(mut self, queue: Option<String>) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_agent(mut self, agent: Option<String>) -> Self {
        self.agent = agent;
        self
    }

    /// Number of calendar days covered, zero for an inverted range.
    pub fn span_days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }

    /// The equally long window that ends the day before `start`.
    pub fn previous_period(&self) -> Self {
        let span = Duration::days(self.span_days().max(1));
        Self {
            start: self.start - span,
            end: self.start - Duration::days(1),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub avg_response_time_hours: f64,
    pub avg_satisfaction: f64,
    pub total_contact_volume: u64,
    pub row_count: usize,
    pub busiest_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateBucket {
    pub date: NaiveDate,
    pub avg_response_time_hours: f64,
    pub avg_satisfaction: f64,
    pub total_contact_volume: u64,
    pub row_count: usize,
}

/// Percentage change of each aggregate against the previous window.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodComparison {
    pub response_time_change_pct: Option<f64>,
    pub satisfaction_change_pct: Option<f64>,
    pub contact_volume_change_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Team,
    Agent,
    Queue,
}

impl Dimension {
    pub fn value_of<'a>(&self, row: &'a MetricRow) -> &'a str {
        match self {
            Dimension::Team => &row.team,
            Dimension::Agent => &row.agent,
            Dimension::Queue => &row.queue,
        }
    }
}

impl FromStr for Dimension {
    type Err = MetricsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "team" => Ok(Dimension::Team),
            "agent" => Ok(Dimension::Agent),
            "queue" => Ok(Dimension::Queue),
            other => Err(MetricsError::InvalidDimension(other.to_string())),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Dimension::Team => "team",
            Dimension::Agent => "agent",
            Dimension::Queue => "queue",
        };
        f.write_str(label)
    }
}

/// Where the current record set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Live,
    File,
    Synthetic,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Provenance::Live => "live helpdesk data",
            Provenance::File => "recorded helpdesk export",
            Provenance::Synthetic => "synthetic data",
        };
        f.write_str(label)
    }
}

/// Raw records plus the directory snapshot needed to normalize them.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub records: Vec<RawConversation>,
    pub directory: Directory,
    pub provenance: Provenance,
}
