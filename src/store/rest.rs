//! HTTP data store speaking the PostgREST query dialect.
//!
//! Table rows are decoded into store-local row types and translated into the
//! pipeline's records here, so column names never travel further.

use crate::error::StoreError;
use crate::models::{ConsentRecord, InteractionRecord, Period, ProfileRecord};
use crate::store::DataStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Maximum subject ids per `in.(...)` filter, keeps request URLs bounded.
const SUBJECT_BATCH: usize = 200;

const CONSENT_TABLE: &str = "data_sharing_consents";
const PROFILE_TABLE: &str = "user_profiles";
const INTERACTION_TABLE: &str = "user_interactions";

#[derive(Debug, Deserialize)]
struct ConsentRow {
    user_id: String,
    consent_given: bool,
    #[serde(default)]
    consent_date: Option<DateTime<Utc>>,
    #[serde(default)]
    revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    user_id: String,
    #[serde(default)]
    user_type: Option<String>,
    #[serde(default)]
    birth_date: Option<NaiveDate>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    travel_motives: Option<Vec<String>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct InteractionRow {
    user_id: String,
    interaction_type: String,
    #[serde(default)]
    page_url: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

pub struct RestStore {
    base_url: String,
    api_key: Option<String>,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl RestStore {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_seconds,
            http_client,
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let url = format!("{}/{}", self.base_url, table);
        debug!("GET {} ({} filters)", url, query.len());

        let mut request = self.http_client.get(&url).query(query);
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.timeout_seconds)
            } else {
                StoreError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn window_filters(period: &Period) -> [(&'static str, String); 2] {
    [
        ("created_at", format!("gte.{}", period.starts_at().to_rfc3339())),
        ("created_at", format!("lte.{}", period.ends_at().to_rfc3339())),
    ]
}

#[async_trait]
impl DataStore for RestStore {
    fn name(&self) -> &str {
        "rest"
    }

    async fn consents(&self) -> Result<Vec<ConsentRecord>, StoreError> {
        let rows: Vec<ConsentRow> = self
            .select(
                CONSENT_TABLE,
                &[
                    (
                        "select",
                        "user_id,consent_given,consent_date,revoked_at".to_string(),
                    ),
                    ("consent_given", "eq.true".to_string()),
                    ("revoked_at", "is.null".to_string()),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ConsentRecord {
                subject_id: row.user_id,
                given: row.consent_given,
                granted_at: row.consent_date,
                revoked_at: row.revoked_at,
            })
            .collect())
    }

    async fn completed_profiles(&self, period: &Period) -> Result<Vec<ProfileRecord>, StoreError> {
        let mut query = vec![
            (
                "select",
                "user_id,user_type,birth_date,gender,country,state,city,travel_motives,created_at"
                    .to_string(),
            ),
            ("user_type", "not.is.null".to_string()),
        ];
        query.extend(window_filters(period));

        let rows: Vec<ProfileRow> = self.select(PROFILE_TABLE, &query).await?;
        Ok(rows
            .into_iter()
            .map(|row| ProfileRecord {
                subject_id: row.user_id,
                user_type: row.user_type,
                birth_date: row.birth_date,
                gender: row.gender,
                country: row.country,
                state: row.state,
                city: row.city,
                travel_motives: row.travel_motives.unwrap_or_default(),
                created_at: row.created_at,
            })
            .collect())
    }

    async fn interactions(
        &self,
        subjects: &[String],
        period: &Period,
    ) -> Result<Vec<InteractionRecord>, StoreError> {
        let mut records = Vec::new();

        for batch in subjects.chunks(SUBJECT_BATCH) {
            let mut query = vec![
                (
                    "select",
                    "user_id,interaction_type,page_url,metadata,created_at".to_string(),
                ),
                ("user_id", in_filter(batch)),
            ];
            query.extend(window_filters(period));

            let rows: Vec<InteractionRow> = self.select(INTERACTION_TABLE, &query).await?;
            records.extend(rows.into_iter().map(|row| InteractionRecord {
                subject_id: row.user_id,
                interaction_type: row.interaction_type,
                page_url: row.page_url,
                metadata: row.metadata,
                created_at: row.created_at,
            }));
        }

        Ok(records)
    }
}

/// PostgREST `in.(...)` list with values quoted.
fn in_filter(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "")))
        .collect();
    format!("in.({})", quoted.join(","))
}
