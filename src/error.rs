use thiserror::Error;

/// Caller-side contract violations for the metrics core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("date range is missing its {bound} date")]
    MissingDateBound { bound: &'static str },
    #[error("unknown dimension '{0}', expected team, agent or queue")]
    InvalidDimension(String),
}

/// Failures talking to the upstream helpdesk API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("helpdesk request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("helpdesk returned {status} for {endpoint}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },
    #[error("helpdesk response for {endpoint} is not a data envelope: {source}")]
    Envelope {
        endpoint: String,
        source: serde_json::Error,
    },
}
