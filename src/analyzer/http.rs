use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{AnalysisPayload, AnalysisResponse, Analyzer, AnalyzerError, parse_response};
use crate::config::AnalyzerConfig;
use crate::scheduler::AnalysisRequest;

/// Talks to an analyzer service over `POST <base_url>/analyze`.
#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    client: Client,
    endpoint: String,
}

impl HttpAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: endpoint_url(&config.base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn endpoint_url(base_url: &str) -> String {
    format!("{}/analyze", base_url.trim_end_matches('/'))
}

impl Analyzer for HttpAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalyzerError> {
        let payload = AnalysisPayload {
            text: &request.text,
            language: &request.language,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(AnalyzerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed = parse_response(&body)?;
        debug!(
            generation = %request.generation,
            matches = parsed.matches.len(),
            "analyzer responded"
        );
        Ok(parsed)
    }
}
