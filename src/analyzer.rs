use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::scheduler::AnalysisRequest;

pub mod http;
pub mod worker;

pub use http::HttpAnalyzer;
pub use worker::AnalysisWorker;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("analyzer answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("analyzer reported an error: {0}")]
    Service(String),
    #[error("invalid analyzer response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("analysis worker could not be started: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Request body sent to the analyzer.
#[derive(Debug, Serialize)]
pub struct AnalysisPayload<'a> {
    pub text: &'a str,
    pub language: &'a str,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub matches: Vec<AnalysisMatch>,
}

/// One reported issue. Offsets are signed so that malformed spans survive
/// decoding and can be skipped individually.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AnalysisMatch {
    pub offset: i64,
    pub length: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "replacements_from_wire")]
    pub replacements: Vec<String>,
}

impl AnalysisMatch {
    pub fn new(offset: i64, length: i64, message: &str, replacements: &[&str]) -> Self {
        Self {
            offset,
            length,
            message: message.to_string(),
            replacements: replacements.iter().map(|value| value.to_string()).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireReplacement {
    Plain(String),
    Value { value: String },
}

fn replacements_from_wire<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire = Vec::<WireReplacement>::deserialize(deserializer)?;
    Ok(wire
        .into_iter()
        .map(|replacement| match replacement {
            WireReplacement::Plain(value) | WireReplacement::Value { value } => value,
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Failure { error: String },
    Success(AnalysisResponse),
}

/// Decode an analyzer response body, mapping `{"error": ...}` to
/// [`AnalyzerError::Service`].
pub fn parse_response(body: &str) -> Result<AnalysisResponse, AnalyzerError> {
    match serde_json::from_str::<Envelope>(body)? {
        Envelope::Failure { error } => Err(AnalyzerError::Service(error)),
        Envelope::Success(response) => Ok(response),
    }
}

/// A text-analysis backend. Called off the main thread.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalyzerError>;
}

/// A finished request, handed back to the session that issued it.
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub request: AnalysisRequest,
    pub result: Result<AnalysisResponse, AnalyzerError>,
}
