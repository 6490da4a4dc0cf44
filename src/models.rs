//! Data models for the reporting pipeline.
//!
//! This module contains the request, consent and subject records read from
//! the data store, the shared counter vocabulary used by fragments and the
//! canonical aggregate, and the verdict/outcome types handed back to callers.

use crate::error::PipelineError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which deliverables a request asks for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    /// Paginated explanatory document only
    Narrative,
    /// Multi-sheet structured export only
    Export,
    /// Both deliverables (default)
    #[default]
    Both,
}

impl ReportKind {
    pub fn wants_narrative(&self) -> bool {
        matches!(self, ReportKind::Narrative | ReportKind::Both)
    }

    pub fn wants_export(&self) -> bool {
        matches!(self, ReportKind::Export | ReportKind::Both)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Narrative => write!(f, "narrative"),
            ReportKind::Export => write!(f, "export"),
            ReportKind::Both => write!(f, "both"),
        }
    }
}

/// Lifecycle status of a report request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Validated,
    Rejected,
    Delivered,
}

impl RequestStatus {
    /// Whether moving from `self` to `next` follows the request lifecycle.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Validated)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Validated, RequestStatus::Delivered)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Validated => write!(f, "validated"),
            RequestStatus::Rejected => write!(f, "rejected"),
            RequestStatus::Delivered => write!(f, "delivered"),
        }
    }
}

/// Inclusive date window of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// Creates a period, rejecting windows that end before they start.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if end < start {
            return Err(PipelineError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    /// First instant of the window (start date, 00:00:00 UTC).
    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// Last instant of the window (end date, 23:59:59 UTC).
    pub fn ends_at(&self) -> DateTime<Utc> {
        let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&self.end.and_time(last))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.starts_at() && at <= self.ends_at()
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Optional geographic restriction of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl GeoFilter {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.city.is_none()
    }

    /// Case-insensitive match. A record missing a filtered field never matches.
    pub fn matches(&self, state: Option<&str>, city: Option<&str>) -> bool {
        fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
            match wanted {
                None => true,
                Some(w) => actual
                    .map(|a| a.trim().eq_ignore_ascii_case(w.trim()))
                    .unwrap_or(false),
            }
        }
        field_matches(&self.state, state) && field_matches(&self.city, city)
    }
}

impl fmt::Display for GeoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => write!(f, "{}/{}", city, state),
            (Some(city), None) => write!(f, "{}", city),
            (None, Some(state)) => write!(f, "{}", state),
            (None, None) => write!(f, "all regions"),
        }
    }
}

/// Contact details of the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// A validated report request, handed to the pipeline by the intake side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub id: String,
    pub requester: Requester,
    pub kind: ReportKind,
    pub period: Period,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoFilter>,
    #[serde(default)]
    pub status: RequestStatus,
}

/// One data-sharing consent entry of a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub subject_id: String,
    pub given: bool,
    #[serde(default)]
    pub granted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Registration profile of a platform subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub subject_id: String,
    /// `None` until the subject completes registration.
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub travel_motives: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ProfileRecord {
    pub fn is_completed(&self) -> bool {
        self.user_type.is_some()
    }

    pub fn is_tourist(&self) -> bool {
        matches!(
            self.user_type.as_deref().map(str::trim),
            Some("turista") | Some("tourist")
        )
    }

    /// Age in whole years on `on`; `None` without a birth date or when it lies in the future.
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        if birth > on {
            return None;
        }
        let mut years = on.year() - birth.year();
        if (on.month(), on.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// One logged platform interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub subject_id: String,
    pub interaction_type: String,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl InteractionRecord {
    /// Raw search string carried in the metadata, if any.
    pub fn search_query(&self) -> Option<&str> {
        let metadata = self.metadata.as_ref()?;
        metadata
            .get("search_query")
            .or_else(|| metadata.get("query"))
            .and_then(|v| v.as_str())
    }
}

/// Counts keyed by category label.
pub type Counter = BTreeMap<String, u64>;

/// The counter dimensions of the shared vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    AgeGroup,
    Gender,
    State,
    Country,
    TravelPurpose,
    Page,
    Search,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::AgeGroup,
        Dimension::Gender,
        Dimension::State,
        Dimension::Country,
        Dimension::TravelPurpose,
        Dimension::Page,
        Dimension::Search,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::AgeGroup => "Age group",
            Dimension::Gender => "Gender",
            Dimension::State => "State",
            Dimension::Country => "Country",
            Dimension::TravelPurpose => "Travel purpose",
            Dimension::Page => "Page",
            Dimension::Search => "Search term",
        }
    }
}

/// Report facets; each groups one or more dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    Demographics,
    Origins,
    TravelPurpose,
    Interactions,
    Upstream,
}

impl Facet {
    /// Facets in report order.
    pub const ALL: [Facet; 5] = [
        Facet::Demographics,
        Facet::Origins,
        Facet::TravelPurpose,
        Facet::Interactions,
        Facet::Upstream,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Facet::Demographics => "Demographics",
            Facet::Origins => "Origins",
            Facet::TravelPurpose => "Travel Purpose",
            Facet::Interactions => "Interactions",
            Facet::Upstream => "Upstream Provider",
        }
    }

    pub fn dimensions(&self) -> &'static [Dimension] {
        match self {
            Facet::Demographics => &[Dimension::AgeGroup, Dimension::Gender],
            Facet::Origins => &[Dimension::State, Dimension::Country],
            Facet::TravelPurpose => &[Dimension::TravelPurpose],
            Facet::Interactions => &[Dimension::Page, Dimension::Search],
            Facet::Upstream => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub age_groups: Counter,
    #[serde(default)]
    pub gender: Counter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origins {
    #[serde(default)]
    pub states: Counter,
    #[serde(default)]
    pub countries: Counter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interactions {
    #[serde(default)]
    pub pages: Counter,
    #[serde(default)]
    pub searches: Counter,
}

/// Sparse counters shared by fragments and the canonical aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSet {
    #[serde(default)]
    pub demographics: Demographics,
    #[serde(default)]
    pub origins: Origins,
    #[serde(default)]
    pub travel_purposes: Counter,
    #[serde(default)]
    pub interactions: Interactions,
}

impl CounterSet {
    pub fn counter(&self, dimension: Dimension) -> &Counter {
        match dimension {
            Dimension::AgeGroup => &self.demographics.age_groups,
            Dimension::Gender => &self.demographics.gender,
            Dimension::State => &self.origins.states,
            Dimension::Country => &self.origins.countries,
            Dimension::TravelPurpose => &self.travel_purposes,
            Dimension::Page => &self.interactions.pages,
            Dimension::Search => &self.interactions.searches,
        }
    }

    fn counter_mut(&mut self, dimension: Dimension) -> &mut Counter {
        match dimension {
            Dimension::AgeGroup => &mut self.demographics.age_groups,
            Dimension::Gender => &mut self.demographics.gender,
            Dimension::State => &mut self.origins.states,
            Dimension::Country => &mut self.origins.countries,
            Dimension::TravelPurpose => &mut self.travel_purposes,
            Dimension::Page => &mut self.interactions.pages,
            Dimension::Search => &mut self.interactions.searches,
        }
    }

    /// Adds `count` under `key`, creating the category if needed.
    pub fn add(&mut self, dimension: Dimension, key: impl Into<String>, count: u64) {
        let slot = self.counter_mut(dimension).entry(key.into()).or_insert(0);
        *slot = slot.saturating_add(count);
    }

    /// Sums every counter of `other` into `self`.
    pub fn absorb(&mut self, other: &CounterSet) {
        for dimension in Dimension::ALL {
            for (key, count) in other.counter(dimension) {
                self.add(dimension, key.clone(), *count);
            }
        }
    }

    /// Derived interaction total (page views plus searches).
    pub fn total_interactions(&self) -> u64 {
        self.interactions
            .pages
            .values()
            .chain(self.interactions.searches.values())
            .fold(0u64, |sum, count| sum.saturating_add(*count))
    }

    pub fn is_empty(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.counter(*d).is_empty())
    }
}

/// Raw upstream provider payload kept for the explanatory report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBlock {
    pub source_id: String,
    pub note: String,
    pub payload: serde_json::Value,
}

/// Why a source contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    /// Integration switched off or not provisioned
    Disabled,
    /// Enabled, but the provider could not be reached or answered badly
    Unreachable,
    /// Reachable, but nothing to report for the window
    NoRecords,
    /// The adapter exceeded its time budget
    TimedOut,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::Disabled => write!(f, "integration disabled"),
            UnavailableReason::Unreachable => write!(f, "provider unreachable"),
            UnavailableReason::NoRecords => write!(f, "no records in period"),
            UnavailableReason::TimedOut => write!(f, "timed out"),
        }
    }
}

/// A source that was asked but delivered no fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableSource {
    pub source_id: String,
    pub reason: UnavailableReason,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Valid,
    Insufficient,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Pending => write!(f, "pending"),
            ValidationStatus::Valid => write!(f, "valid"),
            ValidationStatus::Insufficient => write!(f, "insufficient"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetadata {
    pub period: Option<Period>,
    pub total_records: u64,
    /// Contributing source ids, sorted and distinct.
    pub sources: Vec<String>,
    /// Record count per contributing source.
    #[serde(default)]
    pub source_records: BTreeMap<String, u64>,
    #[serde(default)]
    pub unavailable: Vec<UnavailableSource>,
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_status: ValidationStatus,
}

/// The canonical, provider-agnostic merged result of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateData {
    pub counters: CounterSet,
    #[serde(default)]
    pub upstream: Vec<ProviderBlock>,
    pub metadata: AggregateMetadata,
}

impl AggregateData {
    pub fn with_period(mut self, period: Period) -> Self {
        self.metadata.period = Some(period);
        self
    }

    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.metadata.generated_at = Some(at);
        self
    }

    pub fn with_verdict(mut self, verdict: &ValidationVerdict) -> Self {
        self.metadata.validation_status = if verdict.is_valid {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Insufficient
        };
        self
    }

    /// Whether the facet has anything to show.
    pub fn has_facet(&self, facet: Facet) -> bool {
        match facet {
            Facet::Upstream => !self.upstream.is_empty(),
            other => other
                .dimensions()
                .iter()
                .any(|d| !self.counters.counter(*d).is_empty()),
        }
    }

    /// Facets with content, in report order.
    pub fn present_facets(&self) -> Vec<Facet> {
        Facet::ALL
            .into_iter()
            .filter(|f| self.has_facet(*f))
            .collect()
    }
}

/// Result of applying the minimum-disclosure rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub total_records: u64,
    pub threshold: u64,
    /// Record count per source, zero for unavailable ones.
    pub source_records: BTreeMap<String, u64>,
    pub notes: Vec<String>,
}

/// Opaque retrievable location of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(pub String);

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the invocation surface hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Delivered {
        #[serde(skip_serializing_if = "Option::is_none")]
        report_url: Option<Locator>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_data_url: Option<Locator>,
        verdict: ValidationVerdict,
    },
    Rejected {
        verdict: ValidationVerdict,
    },
    /// Availability check only; nothing rendered or stored.
    Checked {
        verdict: ValidationVerdict,
    },
}

impl PipelineOutcome {
    pub fn verdict(&self) -> &ValidationVerdict {
        match self {
            PipelineOutcome::Delivered { verdict, .. }
            | PipelineOutcome::Rejected { verdict }
            | PipelineOutcome::Checked { verdict } => verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_rejects_inverted_window() {
        assert!(Period::new(date(2025, 3, 1), date(2025, 2, 1)).is_err());
        let period = Period::new(date(2025, 3, 1), date(2025, 3, 1)).unwrap();
        assert_eq!(period.days(), 1);
    }

    #[test]
    fn test_period_contains_whole_end_day() {
        let period = Period::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 31, 23, 30, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        assert!(period.contains(late));
        assert!(!period.contains(after));
    }

    #[test]
    fn test_status_transitions() {
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Validated));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Rejected));
        assert!(RequestStatus::Validated.can_transition_to(RequestStatus::Delivered));
        assert!(!RequestStatus::Rejected.can_transition_to(RequestStatus::Delivered));
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Delivered));
    }

    #[test]
    fn test_geo_filter_matching() {
        let filter = GeoFilter {
            state: Some("MS".to_string()),
            city: None,
        };
        assert!(filter.matches(Some("ms"), Some("Bonito")));
        assert!(!filter.matches(Some("SP"), None));
        assert!(!filter.matches(None, None));
        assert!(GeoFilter::default().matches(None, None));
    }

    #[test]
    fn test_age_respects_birthday() {
        let profile = ProfileRecord {
            subject_id: "s1".to_string(),
            user_type: Some("tourist".to_string()),
            birth_date: Some(date(1990, 6, 15)),
            gender: None,
            country: None,
            state: None,
            city: None,
            travel_motives: vec![],
            created_at: Utc::now(),
        };
        assert_eq!(profile.age_on(date(2025, 6, 14)), Some(34));
        assert_eq!(profile.age_on(date(2025, 6, 15)), Some(35));
        assert_eq!(profile.age_on(date(1980, 1, 1)), None);
    }

    #[test]
    fn test_search_query_fallback_key() {
        let record = InteractionRecord {
            subject_id: "s1".to_string(),
            interaction_type: "search".to_string(),
            page_url: None,
            metadata: Some(serde_json::json!({ "query": "Bonito" })),
            created_at: Utc::now(),
        };
        assert_eq!(record.search_query(), Some("Bonito"));
    }

    #[test]
    fn test_counter_set_absorb_and_total() {
        let mut left = CounterSet::default();
        left.add(Dimension::Page, "/eventos", 3);
        left.add(Dimension::Search, "bonito", 2);

        let mut right = CounterSet::default();
        right.add(Dimension::Page, "/eventos", 1);
        right.add(Dimension::State, "MS", 4);

        left.absorb(&right);
        assert_eq!(left.interactions.pages.get("/eventos"), Some(&4));
        assert_eq!(left.origins.states.get("MS"), Some(&4));
        assert_eq!(left.total_interactions(), 6);
    }

    #[test]
    fn test_present_facets_skip_empty() {
        let mut aggregate = AggregateData::default();
        assert!(aggregate.present_facets().is_empty());

        aggregate.counters.add(Dimension::Gender, "female", 2);
        aggregate.counters.add(Dimension::Search, "pantanal", 1);
        assert_eq!(
            aggregate.present_facets(),
            vec![Facet::Demographics, Facet::Interactions]
        );
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = PipelineOutcome::Rejected {
            verdict: ValidationVerdict {
                is_valid: false,
                total_records: 3,
                threshold: 10,
                source_records: BTreeMap::new(),
                notes: vec!["insufficient".to_string()],
            },
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"outcome\":\"rejected\""));
    }
}
