//! Adapter for the upstream tourism-analytics integration.
//!
//! The provider answers with already aggregated figures. Its JSON shape is
//! decoded into [`AnalyticsPayload`] and translated into the shared counters
//! here; the raw payload travels on only as an opaque provider block.

use crate::error::PipelineError;
use crate::models::{CounterSet, Dimension, ProviderBlock, UnavailableReason};
use crate::sources::normalize;
use crate::sources::{AdapterOutcome, FetchContext, PartialFragment, SourceAdapter};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SOURCE_ID: &str = "analytics";

/// Connection settings for the provider.
#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitorDemographics {
    #[serde(default)]
    by_age: BTreeMap<String, u64>,
    #[serde(default)]
    by_gender: BTreeMap<String, u64>,
    #[serde(default)]
    by_country: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PopularDestination {
    #[serde(default)]
    visitors: u64,
    #[serde(default)]
    origin_state: Option<String>,
}

/// Provider-native analytics response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsPayload {
    #[serde(default)]
    visitor_demographics: Option<VisitorDemographics>,
    #[serde(default)]
    popular_destinations: Vec<PopularDestination>,
    #[serde(default)]
    popular_events: Vec<Value>,
    #[serde(default)]
    total_bookings: u64,
}

impl AnalyticsPayload {
    /// `None` when the provider's figures do not fit a `u64`.
    fn record_count(&self) -> Option<u64> {
        (self.popular_destinations.len() as u64)
            .checked_add(self.popular_events.len() as u64)?
            .checked_add(self.total_bookings)
    }
}

/// What the provider call came back with.
#[derive(Debug, Clone)]
enum ProviderReply {
    Disabled(String),
    Unreachable(String),
    Delivered {
        payload: AnalyticsPayload,
        records: u64,
        raw: Value,
    },
}

pub struct AnalyticsAdapter {
    settings: AnalyticsSettings,
    http_client: reqwest::Client,
}

impl AnalyticsAdapter {
    pub fn new(settings: AnalyticsSettings) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;
        Ok(Self {
            settings,
            http_client,
        })
    }

    async fn request(&self, ctx: &FetchContext<'_>) -> ProviderReply {
        if !self.settings.enabled {
            return ProviderReply::Disabled("analytics integration is not enabled".to_string());
        }
        let Some(ref api_key) = self.settings.api_key else {
            return ProviderReply::Disabled("analytics integration has no API key".to_string());
        };

        let url = format!("{}/analytics", self.settings.base_url.trim_end_matches('/'));
        let mut query = vec![
            ("period", format!("{}d", ctx.period.days())),
            ("from", ctx.period.start.to_string()),
            ("to", ctx.period.end.to_string()),
        ];
        if let Some(region) = ctx.geo.and_then(|g| g.state.clone().or_else(|| g.city.clone())) {
            query.push(("region", region));
        }
        debug!("GET {} {:?}", url, query);

        let response = match self
            .http_client
            .get(&url)
            .bearer_auth(api_key)
            .query(&query)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ProviderReply::Unreachable(format!(
                    "request timed out after {}s",
                    self.settings.timeout_seconds
                ))
            }
            Err(e) if e.is_connect() => {
                return ProviderReply::Unreachable(format!(
                    "cannot connect to {}",
                    self.settings.base_url
                ))
            }
            Err(e) => return ProviderReply::Unreachable(format!("request failed: {}", e)),
        };

        if !response.status().is_success() {
            return ProviderReply::Unreachable(format!("provider answered {}", response.status()));
        }

        let raw: Value = match response.json().await {
            Ok(raw) => raw,
            Err(e) => return ProviderReply::Unreachable(format!("unreadable response: {}", e)),
        };
        decode(raw)
    }
}

fn decode(raw: Value) -> ProviderReply {
    let payload = match serde_json::from_value::<AnalyticsPayload>(raw.clone()) {
        Ok(payload) => payload,
        Err(e) => return ProviderReply::Unreachable(format!("unexpected payload shape: {}", e)),
    };
    match payload.record_count() {
        Some(records) => ProviderReply::Delivered {
            payload,
            records,
            raw,
        },
        None => ProviderReply::Unreachable("implausible record count in payload".to_string()),
    }
}

/// Translates the provider vocabulary into shared counters.
fn translate(payload: &AnalyticsPayload) -> CounterSet {
    let mut counters = CounterSet::default();

    if let Some(ref demographics) = payload.visitor_demographics {
        for (label, count) in &demographics.by_age {
            counters.add(Dimension::AgeGroup, normalize::age_bracket_from_label(label), *count);
        }
        for (label, count) in &demographics.by_gender {
            if let Some(gender) = normalize::gender(label) {
                counters.add(Dimension::Gender, gender, *count);
            }
        }
        for (country, count) in &demographics.by_country {
            if let Some(country) = normalize::place(country) {
                counters.add(Dimension::Country, country, *count);
            }
        }
    }

    for destination in &payload.popular_destinations {
        if let Some(state) = destination.origin_state.as_deref().and_then(normalize::place) {
            counters.add(Dimension::State, state, destination.visitors);
        }
    }

    counters
}

/// Maps a provider reply onto an adapter outcome, logging each condition separately.
fn outcome_from_reply(reply: ProviderReply) -> AdapterOutcome {
    match reply {
        ProviderReply::Disabled(note) => {
            info!("Analytics provider disabled: {}", note);
            AdapterOutcome::unavailable(SOURCE_ID, UnavailableReason::Disabled, note)
        }
        ProviderReply::Unreachable(note) => {
            warn!("Analytics provider enabled but unreachable: {}", note);
            AdapterOutcome::unavailable(SOURCE_ID, UnavailableReason::Unreachable, note)
        }
        ProviderReply::Delivered { records: 0, .. } => {
            info!("Analytics provider returned zero records");
            AdapterOutcome::unavailable(
                SOURCE_ID,
                UnavailableReason::NoRecords,
                "provider returned no records for the period",
            )
        }
        ProviderReply::Delivered {
            payload,
            records,
            raw,
        } => {
            let block = ProviderBlock {
                source_id: SOURCE_ID.to_string(),
                note: format!(
                    "Upstream analytics integrated: {} destinations, {} events, {} bookings.",
                    payload.popular_destinations.len(),
                    payload.popular_events.len(),
                    payload.total_bookings
                ),
                payload: raw,
            };
            AdapterOutcome::Fragment(
                PartialFragment::new(SOURCE_ID, records, translate(&payload)).with_provider(block),
            )
        }
    }
}

#[async_trait]
impl SourceAdapter for AnalyticsAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_fragment(&self, ctx: &FetchContext<'_>) -> Result<AdapterOutcome, PipelineError> {
        Ok(outcome_from_reply(self.request(ctx).await))
    }
}
