//! Source adapters.
//!
//! Each adapter turns one provider's native data into a [`PartialFragment`]
//! in the shared counter vocabulary, or reports itself [`AdapterOutcome::Unavailable`].
//! Fragments can only be built inside this module tree, from real provider
//! responses.

pub mod analytics;
pub mod normalize;
pub mod platform;

pub use analytics::{AnalyticsAdapter, AnalyticsSettings};
pub use platform::PlatformAdapter;

use crate::consent::EligibleSubjects;
use crate::error::PipelineError;
use crate::models::{
    CounterSet, GeoFilter, Period, ProviderBlock, UnavailableReason, UnavailableSource,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

/// Everything an adapter may look at for one run.
#[derive(Debug, Clone)]
pub struct FetchContext<'a> {
    pub period: Period,
    pub eligible: &'a EligibleSubjects,
    pub geo: Option<&'a GeoFilter>,
    /// Evaluation instant of the run (age brackets are computed against it).
    pub as_of: DateTime<Utc>,
}

/// Pre-aggregated contribution of one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialFragment {
    source_id: String,
    record_count: u64,
    counters: CounterSet,
    provider: Option<ProviderBlock>,
}

impl PartialFragment {
    pub(in crate::sources) fn new(source_id: &str, record_count: u64, counters: CounterSet) -> Self {
        Self {
            source_id: source_id.to_string(),
            record_count,
            counters,
            provider: None,
        }
    }

    pub(in crate::sources) fn with_provider(mut self, block: ProviderBlock) -> Self {
        self.provider = Some(block);
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn counters(&self) -> &CounterSet {
        &self.counters
    }

    pub fn provider(&self) -> Option<&ProviderBlock> {
        self.provider.as_ref()
    }
}

#[cfg(test)]
impl PartialFragment {
    /// Hand-built fragment for tests outside the adapters.
    pub(crate) fn fixture(source_id: &str, record_count: u64, counters: CounterSet) -> Self {
        Self::new(source_id, record_count, counters)
    }

    /// Hand-built fragment carrying a provider block.
    pub(crate) fn fixture_with_provider(
        source_id: &str,
        record_count: u64,
        counters: CounterSet,
        block: ProviderBlock,
    ) -> Self {
        Self::new(source_id, record_count, counters).with_provider(block)
    }
}

/// Result of asking one adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterOutcome {
    Fragment(PartialFragment),
    Unavailable(UnavailableSource),
}

impl AdapterOutcome {
    pub fn unavailable(source_id: &str, reason: UnavailableReason, note: impl Into<String>) -> Self {
        AdapterOutcome::Unavailable(UnavailableSource {
            source_id: source_id.to_string(),
            reason,
            note: note.into(),
        })
    }

    pub fn source_id(&self) -> &str {
        match self {
            AdapterOutcome::Fragment(f) => f.source_id(),
            AdapterOutcome::Unavailable(u) => &u.source_id,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable provenance id written into fragments and metadata.
    fn id(&self) -> &str;

    /// Fetch and pre-aggregate this provider's data for the run.
    ///
    /// Provider trouble is reported as `Ok(Unavailable)`. `Err` is reserved for
    /// the core data store being unreachable, which aborts the run.
    async fn fetch_fragment(&self, ctx: &FetchContext<'_>) -> Result<AdapterOutcome, PipelineError>;
}

/// Asks one adapter under its own time budget.
pub async fn fetch_with_timeout(
    adapter: &dyn SourceAdapter,
    ctx: &FetchContext<'_>,
    timeout: Duration,
) -> Result<AdapterOutcome, PipelineError> {
    match tokio::time::timeout(timeout, adapter.fetch_fragment(ctx)).await {
        Ok(Ok(outcome)) => {
            match &outcome {
                AdapterOutcome::Fragment(f) => {
                    info!("Source '{}' delivered {} records", adapter.id(), f.record_count())
                }
                AdapterOutcome::Unavailable(u) => {
                    info!("Source '{}' unavailable ({}): {}", adapter.id(), u.reason, u.note)
                }
            }
            Ok(outcome)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(
                "Source '{}' exceeded {}s, continuing without it",
                adapter.id(),
                timeout.as_secs()
            );
            Ok(AdapterOutcome::unavailable(
                adapter.id(),
                UnavailableReason::TimedOut,
                format!("no answer within {}s", timeout.as_secs()),
            ))
        }
    }
}
