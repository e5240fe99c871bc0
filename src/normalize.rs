//! Turns heterogeneous helpdesk conversations into canonical [`MetricRow`]s.
//!
//! Each output field is resolved by an ordered chain of resolvers. The first
//! resolver that yields a value wins; when none does, the field takes its
//! documented default, so normalization never fails.

use chrono::DateTime;
use tracing::debug;

use crate::models::{Directory, MetricRow, RawConversation};

pub const DEFAULT_TEAM: &str = "General";
pub const DEFAULT_AGENT: &str = "Unassigned";
pub const DEFAULT_QUEUE: &str = "Email";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

pub type Resolver<T> = fn(&RawConversation) -> Option<T>;

pub const FIRST_RESPONSE_RESOLVERS: [Resolver<f64>; 3] = [
    response_hours_from_done_time,
    response_hours_from_first_response,
    response_hours_from_first_message_out,
];

pub const SATISFACTION_RESOLVERS: [Resolver<f64>; 2] =
    [satisfaction_direct, satisfaction_from_survey];

pub const TEAM_ID_RESOLVERS: [Resolver<String>; 3] = [
    team_from_assignment,
    team_from_first_done,
    team_from_last_done,
];

pub const AGENT_ID_RESOLVERS: [Resolver<String>; 3] = [
    agent_from_assignment,
    agent_from_first_done,
    agent_from_last_done,
];

/// Returns the first value produced by `resolvers`, in order.
pub fn first_resolved<T>(raw: &RawConversation, resolvers: &[Resolver<T>]) -> Option<T> {
    resolvers.iter().find_map(|resolve| resolve(raw))
}

pub fn normalize(raw: &RawConversation, directory: &Directory) -> MetricRow {
    let attributes = &raw.attributes;

    let first_response_time_hours =
        first_resolved(raw, &FIRST_RESPONSE_RESOLVERS).unwrap_or(0.0).max(0.0);
    let satisfaction_score = first_resolved(raw, &SATISFACTION_RESOLVERS).unwrap_or(0.0);

    // The directory lookup happens once, on the winning id; a miss does not
    // retry with lower-priority ids.
    let team = first_resolved(raw, &TEAM_ID_RESOLVERS)
        .and_then(|id| directory.team_name(&id))
        .unwrap_or_else(|| DEFAULT_TEAM.to_string());
    let agent = first_resolved(raw, &AGENT_ID_RESOLVERS)
        .and_then(|id| directory.user_name(&id))
        .unwrap_or_else(|| DEFAULT_AGENT.to_string());

    let contact_volume = attributes
        .message_count
        .filter(|count| *count > 0)
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
        .unwrap_or(1);

    MetricRow {
        date: attributes.created_at.date_naive(),
        team,
        queue: queue_label(&attributes.channels),
        agent,
        first_response_time_hours,
        satisfaction_score,
        contact_volume,
    }
}

/// Normalizes a batch, preserving input order.
pub fn normalize_all(records: &[RawConversation], directory: &Directory) -> Vec<MetricRow> {
    let rows: Vec<MetricRow> = records
        .iter()
        .map(|raw| normalize(raw, directory))
        .collect();
    debug!(rows = rows.len(), "normalized conversations");
    rows
}

/// First channel with its leading letter upper-cased.
pub fn queue_label(channels: &[String]) -> String {
    let Some(channel) = channels.first().map(|c| c.trim()).filter(|c| !c.is_empty()) else {
        return DEFAULT_QUEUE.to_string();
    };
    let mut chars = channel.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => DEFAULT_QUEUE.to_string(),
    }
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

fn non_blank(id: &str) -> Option<String> {
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

fn first_id(ids: &[String]) -> Option<String> {
    non_blank(ids.first()?)
}

fn hours_since_creation(raw: &RawConversation, timestamp: Option<&str>) -> Option<f64> {
    let later = DateTime::parse_from_rfc3339(timestamp?).ok()?;
    let elapsed = later - raw.attributes.created_at;
    positive(elapsed.num_milliseconds() as f64 / MILLIS_PER_HOUR)
}

pub fn response_hours_from_done_time(raw: &RawConversation) -> Option<f64> {
    let millis = raw.attributes.first_done.as_ref()?.time?;
    positive(millis / MILLIS_PER_HOUR)
}

pub fn response_hours_from_first_response(raw: &RawConversation) -> Option<f64> {
    let response = raw.attributes.first_response.as_ref()?;
    hours_since_creation(raw, response.created_at.as_deref())
}

pub fn response_hours_from_first_message_out(raw: &RawConversation) -> Option<f64> {
    let message = raw.attributes.first_message_out.as_ref()?;
    hours_since_creation(raw, message.sent_at.as_deref())
}

pub fn satisfaction_direct(raw: &RawConversation) -> Option<f64> {
    positive(raw.attributes.satisfaction?)
}

pub fn satisfaction_from_survey(raw: &RawConversation) -> Option<f64> {
    let answers = &raw.attributes.satisfaction_level.as_ref()?.answers;
    positive(answers.last()?.rating?)
}

pub fn team_from_assignment(raw: &RawConversation) -> Option<String> {
    first_id(&raw.attributes.assigned_teams)
}

pub fn team_from_first_done(raw: &RawConversation) -> Option<String> {
    first_id(&raw.attributes.first_done.as_ref()?.created_by_teams)
}

pub fn team_from_last_done(raw: &RawConversation) -> Option<String> {
    first_id(&raw.attributes.last_done.as_ref()?.created_by_teams)
}

pub fn agent_from_assignment(raw: &RawConversation) -> Option<String> {
    first_id(&raw.attributes.assigned_users)
}

pub fn agent_from_first_done(raw: &RawConversation) -> Option<String> {
    non_blank(raw.attributes.first_done.as_ref()?.created_by.as_deref()?)
}

pub fn agent_from_last_done(raw: &RawConversation) -> Option<String> {
    non_blank(raw.attributes.last_done.as_ref()?.created_by.as_deref()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DirectoryAttributes, DirectoryEntry};
    use chrono::NaiveDate;
    use serde_json::json;

    fn conversation(attributes: serde_json::Value) -> RawConversation {
        serde_json::from_value(json!({ "id": "conv-1", "attributes": attributes })).unwrap()
    }

    fn entry(id: &str, display_name: Option<&str>, email: Option<&str>) -> DirectoryEntry {
        DirectoryEntry {
            id: id.to_string(),
            attributes: DirectoryAttributes {
                display_name: display_name.map(str::to_string),
                name: None,
                email: email.map(str::to_string),
            },
        }
    }

    fn directory() -> Directory {
        Directory::from_entries(
            vec![entry("T1", Some("Sales"), None), entry("T2", Some("Billing"), None)],
            vec![
                entry("U1", Some("Ana García"), None),
                entry("U2", None, Some("carlos@example.com")),
            ],
        )
    }

    #[test]
    fn bare_record_resolves_to_defaults() {
        let raw = conversation(json!({ "createdAt": "2024-03-05T23:59:59Z" }));
        let row = normalize(&raw, &directory());

        assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(row.team, DEFAULT_TEAM);
        assert_eq!(row.agent, DEFAULT_AGENT);
        assert_eq!(row.queue, DEFAULT_QUEUE);
        assert_eq!(row.first_response_time_hours, 0.0);
        assert_eq!(row.satisfaction_score, 0.0);
        assert_eq!(row.contact_volume, 1);
    }

    #[test]
    fn date_keeps_the_calendar_day_as_written() {
        let evening = conversation(json!({ "createdAt": "2024-01-01T22:30:00-05:00" }));
        let early = conversation(json!({ "createdAt": "2024-01-02T00:15:00+02:00" }));
        assert_eq!(
            normalize(&evening, &Directory::default()).date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(
            normalize(&early, &Directory::default()).date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn response_time_spans_offsets() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T22:30:00-05:00",
            "firstResponse": { "createdAt": "2024-01-02T05:30:00Z" }
        }));
        assert_eq!(first_resolved(&raw, &FIRST_RESPONSE_RESOLVERS), Some(2.0));
    }

    #[test]
    fn wrong_typed_fields_fall_through_to_fallbacks() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "firstDone": { "time": "n/a", "createdBy": 42, "createdByTeams": "T1" },
            "firstResponse": { "createdAt": 1704106800000_i64 },
            "firstMessageOut": { "sentAt": "2024-01-01T11:00:00Z" },
            "satisfaction": "4",
            "satisfactionLevel": { "answers": [{ "rating": "five" }, { "rating": 3 }] },
            "assignedTeams": "T1",
            "assignedUsers": [null, "U1"],
            "lastDone": { "createdByTeams": ["T2"] },
            "channels": "chat",
            "messageCount": 3.0
        }));
        let row = normalize(&raw, &directory());

        assert_eq!(row.first_response_time_hours, 1.0);
        assert_eq!(row.satisfaction_score, 3.0);
        assert_eq!(row.team, "Billing");
        assert_eq!(row.agent, "Ana García");
        assert_eq!(row.queue, DEFAULT_QUEUE);
        assert_eq!(row.contact_volume, 3);
    }

    #[test]
    fn fractional_message_count_uses_default_volume() {
        let raw = conversation(json!({ "createdAt": "2024-01-01T10:00:00Z", "messageCount": 2.5 }));
        assert_eq!(normalize(&raw, &Directory::default()).contact_volume, 1);
    }

    #[test]
    fn date_ignores_optional_fields() {
        let raw = conversation(json!({
            "createdAt": "2024-03-05T08:15:00Z",
            "firstDone": { "time": 7200000, "createdBy": "U1" },
            "satisfaction": 4,
            "channels": ["chat"],
            "messageCount": 9
        }));
        assert_eq!(
            normalize(&raw, &Directory::default()).date,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }

    #[test]
    fn first_response_prefers_done_time() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "firstDone": { "time": 5400000 },
            "firstResponse": { "createdAt": "2024-01-01T14:00:00Z" }
        }));
        let row = normalize(&raw, &Directory::default());
        assert!((row.first_response_time_hours - 1.5).abs() < 1e-9);
    }

    #[test]
    fn first_response_falls_back_through_timestamps() {
        let from_response = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "firstDone": { "time": 0 },
            "firstResponse": { "createdAt": "2024-01-01T13:00:00Z" },
            "firstMessageOut": { "sentAt": "2024-01-01T11:00:00Z" }
        }));
        assert_eq!(first_resolved(&from_response, &FIRST_RESPONSE_RESOLVERS), Some(3.0));

        let from_outbound = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "firstResponse": { "createdAt": "not a timestamp" },
            "firstMessageOut": { "sentAt": "2024-01-01T10:30:00Z" }
        }));
        assert_eq!(first_resolved(&from_outbound, &FIRST_RESPONSE_RESOLVERS), Some(0.5));
    }

    #[test]
    fn each_response_resolver_is_independent() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "firstMessageOut": { "sentAt": "2024-01-01T12:00:00Z" }
        }));
        assert_eq!(response_hours_from_done_time(&raw), None);
        assert_eq!(response_hours_from_first_response(&raw), None);
        assert_eq!(response_hours_from_first_message_out(&raw), Some(2.0));
    }

    #[test]
    fn response_before_creation_is_not_negative() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "firstResponse": { "createdAt": "2024-01-01T09:00:00Z" }
        }));
        assert_eq!(normalize(&raw, &Directory::default()).first_response_time_hours, 0.0);
    }

    #[test]
    fn satisfaction_uses_last_survey_answer() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "satisfaction": 0,
            "satisfactionLevel": { "answers": [{ "rating": 2 }, { "rating": 5 }] }
        }));
        assert_eq!(satisfaction_direct(&raw), None);
        assert_eq!(normalize(&raw, &Directory::default()).satisfaction_score, 5.0);

        let direct = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "satisfaction": 3.5,
            "satisfactionLevel": { "answers": [{ "rating": 1 }] }
        }));
        assert_eq!(normalize(&direct, &Directory::default()).satisfaction_score, 3.5);

        let empty_survey = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "satisfactionLevel": { "answers": [] }
        }));
        assert_eq!(satisfaction_from_survey(&empty_survey), None);
    }

    #[test]
    fn assigned_team_is_looked_up_in_directory() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "assignedTeams": ["T1"]
        }));
        assert_eq!(normalize(&raw, &directory()).team, "Sales");
    }

    #[test]
    fn team_falls_back_to_completion_events() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "firstDone": { "createdByTeams": [] },
            "lastDone": { "createdByTeams": ["T2", "T1"] }
        }));
        assert_eq!(team_from_first_done(&raw), None);
        assert_eq!(normalize(&raw, &directory()).team, "Billing");
    }

    #[test]
    fn unknown_team_id_uses_default() {
        let raw = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "assignedTeams": ["T9"]
        }));
        assert_eq!(normalize(&raw, &directory()).team, DEFAULT_TEAM);
    }

    #[test]
    fn agent_resolution_order_and_email_fallback() {
        let assigned = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "assignedUsers": ["U1"],
            "firstDone": { "createdBy": "U2" }
        }));
        assert_eq!(normalize(&assigned, &directory()).agent, "Ana García");

        let from_done = conversation(json!({
            "createdAt": "2024-01-01T10:00:00Z",
            "lastDone": { "createdBy": "U2" }
        }));
        assert_eq!(agent_from_first_done(&from_done), None);
        assert_eq!(normalize(&from_done, &directory()).agent, "carlos@example.com");
    }

    #[test]
    fn queue_title_cases_first_channel() {
        assert_eq!(queue_label(&["chat".to_string(), "email".to_string()]), "Chat");
        assert_eq!(queue_label(&["sms".to_string()]), "Sms");
        assert_eq!(queue_label(&[]), "Email");
        assert_eq!(queue_label(&[String::new()]), "Email");
    }

    #[test]
    fn contact_volume_requires_positive_count() {
        let counted = conversation(json!({ "createdAt": "2024-01-01T10:00:00Z", "messageCount": 6 }));
        let negative = conversation(json!({ "createdAt": "2024-01-01T10:00:00Z", "messageCount": -2 }));
        assert_eq!(normalize(&counted, &Directory::default()).contact_volume, 6);
        assert_eq!(normalize(&negative, &Directory::default()).contact_volume, 1);
    }

    #[test]
    fn normalize_all_preserves_order() {
        let records = vec![
            conversation(json!({ "createdAt": "2024-01-02T10:00:00Z" })),
            conversation(json!({ "createdAt": "2024-01-01T10:00:00Z" })),
        ];
        let rows = normalize_all(&records, &Directory::default());
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}
