//! Synthetic helpdesk records used when the live API cannot be reached.
//!
//! Records are shaped like real upstream conversations, with a random mix of
//! response, satisfaction and assignment signals, so they go through the same
//! normalization path as live data.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::models::{
    CompletionEvent, ConversationAttributes, Directory, DirectoryAttributes, DirectoryEntry,
    FirstMessageOut, FirstResponse, Provenance, RawConversation, RecordSet, SatisfactionLevel,
    SurveyAnswer,
};

pub const CONVERSATIONS_PER_DAY: usize = 3;

const TEAMS: [(&str, &str); 4] = [
    ("team-support", "Technical Support"),
    ("team-sales", "Sales"),
    ("team-billing", "Billing"),
    ("team-general", "General"),
];

const AGENTS: [(&str, &str, &str); 4] = [
    ("user-ana", "Ana García", "ana.garcia@example.com"),
    ("user-carlos", "Carlos López", "carlos.lopez@example.com"),
    ("user-maria", "María Rodríguez", "maria.rodriguez@example.com"),
    ("user-juan", "Juan Pérez", "juan.perez@example.com"),
];

const CHANNELS: [&str; 3] = ["email", "chat", "sms"];

pub fn directory() -> Directory {
    let teams = TEAMS
        .iter()
        .map(|(id, name)| DirectoryEntry {
            id: id.to_string(),
            attributes: DirectoryAttributes {
                display_name: Some(name.to_string()),
                name: None,
                email: None,
            },
        })
        .collect();
    let users = AGENTS
        .iter()
        .map(|(id, name, email)| DirectoryEntry {
            id: id.to_string(),
            attributes: DirectoryAttributes {
                display_name: Some(name.to_string()),
                name: None,
                email: Some(email.to_string()),
            },
        })
        .collect();
    Directory::from_entries(teams, users)
}

/// Builds [`CONVERSATIONS_PER_DAY`] conversations for every day in `[start, end]`.
pub fn generate<R: Rng + ?Sized>(start: NaiveDate, end: NaiveDate, rng: &mut R) -> RecordSet {
    let mut records = Vec::new();

    for day in start.iter_days().take_while(|day| *day <= end) {
        let Some(midnight) = day.and_hms_opt(0, 0, 0) else {
            continue;
        };
        let midnight = Utc.from_utc_datetime(&midnight);

        for _ in 0..CONVERSATIONS_PER_DAY {
            let created_at = midnight + Duration::minutes(rng.gen_range(0..24 * 60));
            records.push(conversation(created_at, rng));
        }
    }

    RecordSet {
        records,
        directory: directory(),
        provenance: Provenance::Synthetic,
    }
}

fn pick<'a, R: Rng + ?Sized>(values: &[&'a str], rng: &mut R) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}

fn conversation<R: Rng + ?Sized>(created_at: DateTime<Utc>, rng: &mut R) -> RawConversation {
    let team_ids: Vec<&str> = TEAMS.iter().map(|(id, _)| *id).collect();
    let agent_ids: Vec<&str> = AGENTS.iter().map(|(id, _, _)| *id).collect();

    let mut attributes = ConversationAttributes {
        created_at: created_at.into(),
        channels: vec![pick(&CHANNELS, rng).to_string()],
        message_count: Some(rng.gen_range(1..=10)),
        ..Default::default()
    };

    let response_ms = rng.gen_range(6 * 60_000..5 * 3_600_000_i64);
    let responded_at = (created_at + Duration::milliseconds(response_ms)).to_rfc3339();
    match rng.gen_range(0..10) {
        0..=3 => {
            attributes.first_done = Some(CompletionEvent {
                time: Some(response_ms as f64),
                ..Default::default()
            });
        }
        4..=6 => {
            attributes.first_response = Some(FirstResponse {
                created_at: Some(responded_at),
            });
        }
        7..=8 => {
            attributes.first_message_out = Some(FirstMessageOut {
                sent_at: Some(responded_at),
            });
        }
        _ => {}
    }

    match rng.gen_range(0..10) {
        0..=2 => attributes.satisfaction = Some(f64::from(rng.gen_range(3..=5_u8))),
        3..=6 => {
            let answers = (0..rng.gen_range(1..=2_usize))
                .map(|_| SurveyAnswer {
                    rating: Some(f64::from(rng.gen_range(1..=5_u8))),
                })
                .collect();
            attributes.satisfaction_level = Some(SatisfactionLevel { answers });
        }
        _ => {}
    }

    let team = pick(&team_ids, rng).to_string();
    let agent = pick(&agent_ids, rng).to_string();
    match rng.gen_range(0..20) {
        0..=11 => {
            attributes.assigned_teams = vec![team];
            attributes.assigned_users = vec![agent];
        }
        12..=16 => {
            let done = attributes.first_done.get_or_insert_with(CompletionEvent::default);
            done.created_by_teams = vec![team];
            done.created_by = Some(agent);
        }
        17..=18 => {
            attributes.last_done = Some(CompletionEvent {
                time: None,
                created_by: Some(agent),
                created_by_teams: vec![team],
            });
        }
        _ => {}
    }

    RawConversation {
        id: format!("conv-{}", Uuid::new_v4()),
        attributes,
    }
}
