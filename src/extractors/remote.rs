// src/extractors/remote.rs
use crate::loader::client::LoadOptions;
use crate::model::{ScrapedRecord, Selector};
use crate::utils::error::FetchAttemptError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RemoteSelector<'a> {
    selector: &'a str,
    #[serde(rename = "type")]
    extraction_type: &'static str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attribute: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct RemoteOptions {
    javascript: bool,
    timeout: u64,
}

#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    url: &'a str,
    selectors: Vec<RemoteSelector<'a>>,
    options: RemoteOptions,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    success: bool,
    #[serde(default)]
    data: Option<Vec<ScrapedRecord>>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for server-side extraction: the server loads the page and applies the selectors.
#[derive(Debug, Clone)]
pub struct RemoteExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteExtractor {
    pub fn new(endpoint: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("selector_scraper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn extract(
        &self,
        url: &str,
        selectors: &[Selector],
        options: &LoadOptions,
    ) -> Result<Vec<ScrapedRecord>, FetchAttemptError> {
        let request = RemoteRequest {
            url,
            selectors: selectors
                .iter()
                .map(|s| RemoteSelector {
                    selector: &s.css_selector,
                    extraction_type: s.extraction_type.as_str(),
                    name: s.key(),
                    attribute: s.attribute_name.as_deref(),
                })
                .collect(),
            options: RemoteOptions {
                javascript: options.javascript_enabled,
                timeout: options.timeout_ms,
            },
        };

        tracing::info!("Requesting server-side extraction of {} ({} selectors)", url, selectors.len());
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_millis(options.timeout_ms))
            .json(&request)
            .send()
            .await
            .map_err(FetchAttemptError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Remote extraction returned HTTP {} for {}", status, url);
            return Err(FetchAttemptError::Http(status));
        }

        let body: RemoteResponse = response
            .json()
            .await
            .map_err(|e| FetchAttemptError::Malformed(e.to_string()))?;
        if !body.success {
            return Err(FetchAttemptError::Malformed(
                body.error.unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }
        let records = body
            .data
            .ok_or_else(|| FetchAttemptError::Malformed("missing data".to_string()))?;
        tracing::debug!("Server extracted {} records from {}", records.len(), url);
        Ok(records)
    }
}
