//! Request status reporting.
//!
//! The pipeline never mutates a request; it reports lifecycle transitions to
//! a [`StatusSink`]. A failing sink is logged and does not change the outcome
//! of the run.

use crate::models::{Locator, RequestStatus};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// One lifecycle transition of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<Locator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data_url: Option<Locator>,
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(status: RequestStatus) -> Self {
        Self {
            status,
            notes: Vec::new(),
            report_url: None,
            raw_data_url: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: &[String]) -> Self {
        self.notes = notes.to_vec();
        self
    }

    pub fn with_locators(mut self, report_url: Option<Locator>, raw_data_url: Option<Locator>) -> Self {
        self.report_url = report_url;
        self.raw_data_url = raw_data_url;
        self
    }
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, request_id: &str, update: &StatusUpdate) -> Result<()>;
}

/// Writes transitions to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

#[async_trait]
impl StatusSink for TracingStatusSink {
    async fn report(&self, request_id: &str, update: &StatusUpdate) -> Result<()> {
        info!("Request {} -> {}", request_id, update.status);
        for note in &update.notes {
            debug!("  {}", note);
        }
        Ok(())
    }
}

/// PATCHes the request row through a PostgREST-style API.
pub struct RestStatusSink {
    base_url: String,
    table: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl RestStatusSink {
    pub fn new(base_url: &str, table: &str, api_key: Option<String>, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key,
            http_client,
        })
    }
}

#[async_trait]
impl StatusSink for RestStatusSink {
    async fn report(&self, request_id: &str, update: &StatusUpdate) -> Result<()> {
        let url = format!("{}/{}", self.base_url, self.table);

        let mut request = self
            .http_client
            .patch(&url)
            .query(&[("id", format!("eq.{}", request_id))])
            .header("Prefer", "return=minimal")
            .json(update);
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach status endpoint {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Status update rejected ({}): {}", status, body);
        }

        debug!("Request {} status stored as {}", request_id, update.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_serialization() {
        let update = StatusUpdate::new(RequestStatus::Delivered).with_locators(
            Some(Locator("https://blob.example/r.md".to_string())),
            None,
        );
        let json = serde_json::to_value(&update).unwrap();

        assert_eq!(json["status"], "delivered");
        assert_eq!(json["report_url"], "https://blob.example/r.md");
        assert!(json.get("raw_data_url").is_none());
        assert!(json.get("notes").is_none());
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_everything() {
        let update = StatusUpdate::new(RequestStatus::Rejected)
            .with_notes(&["Insufficient data for the requested period".to_string()]);
        assert!(TracingStatusSink.report("req-1", &update).await.is_ok());
    }

    #[tokio::test]
    async fn test_rest_sink_reports_unreachable_endpoint() {
        let sink = RestStatusSink::new("http://127.0.0.1:1", "data_requests", None, 2).unwrap();
        let update = StatusUpdate::new(RequestStatus::Validated);
        assert!(sink.report("req-1", &update).await.is_err());
    }
}
