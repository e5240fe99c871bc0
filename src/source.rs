use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::models::{Directory, DirectoryEntry, Provenance, RawConversation, RecordSet};
use crate::synthetic;

pub const DEFAULT_API_URL: &str = "https://api.prod1.kustomer.com";

/// Connection settings for the upstream helpdesk.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub page_size: u32,
    pub input: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Decodes the `data` array one element at a time so a single bad record
/// does not discard the rest.
fn decode_records<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<Vec<T>, SourceError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|source| SourceError::Envelope {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let items = match envelope.data {
        Some(serde_json::Value::Array(items)) => items,
        Some(serde_json::Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    };

    let mut records = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(record) => records.push(record),
            Err(err) => warn!(endpoint, error = %err, "skipping malformed record"),
        }
    }
    Ok(records)
}

pub struct HelpdeskClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl HelpdeskClient {
    pub fn new(config: &SourceConfig, api_key: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            page_size: config.page_size,
        })
    }

    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, SourceError> {
        let body = self.get(endpoint, query).await?;
        decode_records(endpoint, &body)
    }

    /// Conversations created inside `[start, end]`. An empty filtered listing is
    /// retried once without filters, keeping only records in the window.
    ///
    /// The upstream filter is in UTC while `date` is the day as written in the
    /// record's own offset, so the query is padded by a day on each side.
    pub async fn fetch_conversations(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawConversation>, SourceError> {
        let range = format!(
            "{},{}",
            start_of_day(start.pred_opt().unwrap_or(start)),
            end_of_day(end.succ_opt().unwrap_or(end))
        );
        let filtered: Vec<RawConversation> = self
            .list(
                "/v1/conversations",
                &[
                    ("page[size]", self.page_size.to_string()),
                    ("filter[createdAt]", range),
                    ("include", "assignedTeams,assignedUsers".to_string()),
                ],
            )
            .await?;
        let conversations = if filtered.is_empty() {
            debug!("filtered conversation listing empty, retrying unfiltered");
            self.list("/v1/conversations", &[]).await?
        } else {
            filtered
        };

        Ok(conversations
            .into_iter()
            .filter(|conv| within_window(conv, start, end))
            .collect())
    }

    pub async fn fetch_teams(&self) -> Result<Vec<DirectoryEntry>, SourceError> {
        self.list("/v1/teams", &[]).await
    }

    pub async fn fetch_users(&self) -> Result<Vec<DirectoryEntry>, SourceError> {
        self.list("/v1/users", &[]).await
    }

    /// Directory lookups are optional; a failed listing leaves that side empty.
    pub async fn fetch_directory(&self) -> Directory {
        let teams = self.fetch_teams().await.unwrap_or_else(|err| {
            warn!(error = %err, "team directory unavailable");
            Vec::new()
        });
        let users = self.fetch_users().await.unwrap_or_else(|err| {
            warn!(error = %err, "user directory unavailable");
            Vec::new()
        });
        debug!(teams = teams.len(), users = users.len(), "loaded directory");
        Directory::from_entries(teams, users)
    }

    pub async fn check_connection(&self) -> Result<(), SourceError> {
        self.get("/v1/users/current", &[]).await.map(|_| ())
    }
}

fn within_window(conv: &RawConversation, start: NaiveDate, end: NaiveDate) -> bool {
    let day = conv.attributes.created_at.date_naive();
    let inside = day >= start && day <= end;
    if !inside {
        debug!(id = %conv.id, %day, "dropping conversation outside window");
    }
    inside
}

fn day_boundary(day: NaiveDate, hour: u32, minute: u32, second: u32) -> String {
    day.and_hms_opt(hour, minute, second)
        .map(|at| Utc.from_utc_datetime(&at).to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| day.to_string())
}

fn start_of_day(day: NaiveDate) -> String {
    day_boundary(day, 0, 0, 0)
}

fn end_of_day(day: NaiveDate) -> String {
    day_boundary(day, 23, 59, 59)
}

/// Reads a helpdesk-style envelope (`{"data": [...], "teams": [...], "users": [...]}`) from disk.
pub fn load_file(path: &Path, start: NaiveDate, end: NaiveDate) -> anyhow::Result<RecordSet> {
    #[derive(Deserialize)]
    struct Export {
        #[serde(default)]
        teams: Vec<DirectoryEntry>,
        #[serde(default)]
        users: Vec<DirectoryEntry>,
    }

    let body = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let endpoint = path.display().to_string();
    let records: Vec<RawConversation> = decode_records(&endpoint, &body)?;
    let export: Export = serde_json::from_slice(&body)
        .with_context(|| format!("failed to parse directories in {}", path.display()))?;

    let records = records
        .into_iter()
        .filter(|conv| within_window(conv, start, end))
        .collect();

    Ok(RecordSet {
        records,
        directory: Directory::from_entries(export.teams, export.users),
        provenance: Provenance::File,
    })
}

async fn load_live(
    config: &SourceConfig,
    api_key: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RecordSet, SourceError> {
    let client = HelpdeskClient::new(config, api_key)?;
    let records = client.fetch_conversations(start, end).await?;
    let directory = client.fetch_directory().await;
    Ok(RecordSet {
        records,
        directory,
        provenance: Provenance::Live,
    })
}

/// Picks the record source for `[start, end]`: a file when one is given,
/// otherwise the live API, falling back to synthetic records whenever live
/// retrieval is not configured, fails, or comes back empty.
pub async fn load_records(
    config: &SourceConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<RecordSet> {
    if let Some(path) = &config.input {
        let set = load_file(path, start, end)?;
        info!(records = set.records.len(), path = %path.display(), "loaded conversations from file");
        return Ok(set);
    }

    if let Some(api_key) = config.api_key.as_deref().filter(|key| !key.is_empty()) {
        match load_live(config, api_key, start, end).await {
            Ok(set) if !set.records.is_empty() => {
                info!(records = set.records.len(), "loaded conversations from helpdesk");
                return Ok(set);
            }
            Ok(_) => warn!("helpdesk returned no conversations for the window, using synthetic data"),
            Err(err) => warn!(error = %err, "helpdesk unavailable, using synthetic data"),
        }
    } else {
        info!("no helpdesk API key configured, using synthetic data");
    }

    let set = synthetic::generate(start, end, &mut rand::thread_rng());
    info!(records = set.records.len(), "generated synthetic conversations");
    Ok(set)
}
