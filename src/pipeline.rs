//! Pipeline orchestration.
//!
//! One run resolves consent once, fans out to every source adapter
//! concurrently, merges and validates the result, and only then renders and
//! stores the requested artifacts. Nothing is rendered for an insufficient
//! aggregate.

use crate::analysis::{merge_outcomes, validate};
use crate::consent;
use crate::error::PipelineError;
use crate::models::{
    AggregateData, Locator, PipelineOutcome, ReportRequest, RequestStatus, ValidationVerdict,
};
use crate::report::{self, ArtifactKind, RenderSettings};
use crate::sources::{fetch_with_timeout, AdapterOutcome, FetchContext, SourceAdapter};
use crate::status::{StatusSink, StatusUpdate};
use crate::storage::ArtifactStore;
use crate::store::DataStore;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Budgets and thresholds of a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub threshold: u64,
    /// Budget of the consent read.
    pub store_timeout: Duration,
    /// Budget of each adapter, independently.
    pub adapter_timeout: Duration,
    /// Budget of the whole run.
    pub run_timeout: Duration,
    pub render: RenderSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let render = RenderSettings::default();
        Self {
            threshold: render.threshold,
            store_timeout: Duration::from_secs(30),
            adapter_timeout: Duration::from_secs(60),
            run_timeout: Duration::from_secs(300),
            render,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn DataStore>,
    adapters: Vec<Box<dyn SourceAdapter>>,
    artifacts: Box<dyn ArtifactStore>,
    status: Box<dyn StatusSink>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DataStore>,
        artifacts: Box<dyn ArtifactStore>,
        status: Box<dyn StatusSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            adapters: Vec::new(),
            artifacts,
            status,
            settings,
        }
    }

    pub fn with_adapter(mut self, adapter: Box<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn adapter_ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    /// Full run: validate, then render and store what the request asks for.
    pub async fn run(&self, request: &ReportRequest) -> Result<PipelineOutcome, PipelineError> {
        self.bounded(self.execute(request)).await
    }

    /// Availability check: stops after validation, renders and stores nothing.
    pub async fn check(&self, request: &ReportRequest) -> Result<PipelineOutcome, PipelineError> {
        let (_, verdict) = self.bounded(self.gather(request)).await?;
        Ok(PipelineOutcome::Checked { verdict })
    }

    async fn bounded<T>(
        &self,
        work: impl std::future::Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        let budget = self.settings.run_timeout;
        tokio::time::timeout(budget, work)
            .await
            .map_err(|_| PipelineError::Timeout(budget.as_secs()))?
    }

    async fn execute(&self, request: &ReportRequest) -> Result<PipelineOutcome, PipelineError> {
        let mut status = request.status;
        let (aggregate, verdict) = self.gather(request).await?;

        if !verdict.is_valid {
            self.advance(
                request,
                &mut status,
                StatusUpdate::new(RequestStatus::Rejected).with_notes(&verdict.notes),
            )
            .await;
            return Ok(PipelineOutcome::Rejected { verdict });
        }

        self.advance(
            request,
            &mut status,
            StatusUpdate::new(RequestStatus::Validated).with_notes(&verdict.notes),
        )
        .await;

        let (report_url, raw_data_url) = self.deliver(request, &aggregate).await?;

        self.advance(
            request,
            &mut status,
            StatusUpdate::new(RequestStatus::Delivered)
                .with_locators(report_url.clone(), raw_data_url.clone()),
        )
        .await;

        Ok(PipelineOutcome::Delivered {
            report_url,
            raw_data_url,
            verdict,
        })
    }

    /// Consent, fan-out, merge and validation.
    pub(crate) async fn gather(
        &self,
        request: &ReportRequest,
    ) -> Result<(AggregateData, ValidationVerdict), PipelineError> {
        let as_of = Utc::now();
        info!("Processing request {} for {}", request.id, request.period);

        let eligible = consent::resolve(self.store.as_ref(), self.settings.store_timeout).await?;
        info!("{} subjects hold an active sharing consent", eligible.len());

        let ctx = FetchContext {
            period: request.period,
            eligible: &eligible,
            geo: request.geo.as_ref().filter(|g| !g.is_empty()),
            as_of,
        };

        let outcomes: Vec<AdapterOutcome> = join_all(
            self.adapters
                .iter()
                .map(|adapter| fetch_with_timeout(adapter.as_ref(), &ctx, self.settings.adapter_timeout)),
        )
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

        let aggregate = merge_outcomes(&outcomes)
            .with_period(request.period)
            .generated_at(as_of);
        let verdict = validate(&aggregate, self.settings.threshold);
        debug!(
            "Aggregate: {} records from {:?}",
            aggregate.metadata.total_records, aggregate.metadata.sources
        );

        Ok((aggregate.with_verdict(&verdict), verdict))
    }

    async fn deliver(
        &self,
        request: &ReportRequest,
        aggregate: &AggregateData,
    ) -> Result<(Option<Locator>, Option<Locator>), PipelineError> {
        let mut report_url = None;
        let mut raw_data_url = None;

        for kind in report::requested_kinds(request) {
            let artifact = report::render(kind, request, aggregate, &self.settings.render)?;
            debug!("Rendered {} artifact ({} bytes)", kind, artifact.bytes.len());

            let locator = self
                .artifacts
                .store(&request.id, &artifact)
                .await
                .inspect_err(|e| warn!("{} store failed: {}", self.artifacts.name(), e))?;
            match kind {
                ArtifactKind::Narrative => report_url = Some(locator),
                ArtifactKind::Export => raw_data_url = Some(locator),
            }
        }

        Ok((report_url, raw_data_url))
    }

    /// Report a transition if the lifecycle allows it. Sink failures are logged.
    async fn advance(&self, request: &ReportRequest, current: &mut RequestStatus, update: StatusUpdate) {
        if !current.can_transition_to(update.status) {
            debug!(
                "Request {} already past {} -> {}, not reported",
                request.id, current, update.status
            );
            return;
        }

        if let Err(e) = self.status.report(&request.id, &update).await {
            warn!("Failed to record status {} for {}: {:#}", update.status, request.id, e);
        }
        *current = update.status;
    }
}
