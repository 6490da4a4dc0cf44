//! Adapter over the platform's own profile and interaction tables.

use crate::error::PipelineError;
use crate::models::{CounterSet, Dimension, InteractionRecord, ProfileRecord, UnavailableReason};
use crate::sources::normalize;
use crate::sources::{AdapterOutcome, FetchContext, PartialFragment, SourceAdapter};
use crate::store::DataStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

pub const SOURCE_ID: &str = "platform";

pub struct PlatformAdapter {
    store: Arc<dyn DataStore>,
}

impl PlatformAdapter {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourceAdapter for PlatformAdapter {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    async fn fetch_fragment(&self, ctx: &FetchContext<'_>) -> Result<AdapterOutcome, PipelineError> {
        if ctx.eligible.is_empty() {
            return Ok(AdapterOutcome::unavailable(
                SOURCE_ID,
                UnavailableReason::NoRecords,
                "no subject currently holds an active sharing consent",
            ));
        }

        let profiles = self
            .store
            .completed_profiles(&ctx.period)
            .await
            .map_err(|e| PipelineError::DataStore(format!("profiles: {}", e)))?;
        debug!("{} completed profiles in period", profiles.len());

        let consented: Vec<&ProfileRecord> = profiles
            .iter()
            .filter(|p| p.is_completed() && ctx.eligible.contains(&p.subject_id))
            .filter(|p| {
                ctx.geo
                    .map(|g| g.matches(p.state.as_deref(), p.city.as_deref()))
                    .unwrap_or(true)
            })
            .collect();

        if consented.is_empty() {
            return Ok(AdapterOutcome::unavailable(
                SOURCE_ID,
                UnavailableReason::NoRecords,
                format!(
                    "no consented, completed registrations in {}",
                    ctx.period
                ),
            ));
        }

        let mut subjects: Vec<String> = consented.iter().map(|p| p.subject_id.clone()).collect();
        subjects.sort();
        subjects.dedup();

        let mut counters = CounterSet::default();
        tally_profiles(&mut counters, &consented, ctx.as_of.date_naive());

        let interactions = self
            .store
            .interactions(&subjects, &ctx.period)
            .await
            .map_err(|e| PipelineError::DataStore(format!("interactions: {}", e)))?;
        let counted = tally_interactions(&mut counters, &interactions);
        info!(
            "Platform: {} profiles, {} of {} interactions mapped",
            subjects.len(),
            counted,
            interactions.len()
        );

        Ok(AdapterOutcome::Fragment(PartialFragment::new(
            SOURCE_ID,
            subjects.len() as u64,
            counters,
        )))
    }
}

/// Demographics for every profile; origins and motives for tourists only.
fn tally_profiles(counters: &mut CounterSet, profiles: &[&ProfileRecord], today: NaiveDate) {
    for profile in profiles {
        if let Some(age) = profile.age_on(today) {
            counters.add(Dimension::AgeGroup, normalize::age_bracket(age), 1);
        }
        if let Some(gender) = profile.gender.as_deref().and_then(normalize::gender) {
            counters.add(Dimension::Gender, gender, 1);
        }

        if !profile.is_tourist() {
            continue;
        }
        if let Some(state) = profile.state.as_deref().and_then(normalize::place) {
            counters.add(Dimension::State, state, 1);
        }
        if let Some(country) = profile.country.as_deref().and_then(normalize::place) {
            counters.add(Dimension::Country, country, 1);
        }
        for motive in profile.travel_motives.iter().filter_map(|m| normalize::label(m)) {
            counters.add(Dimension::TravelPurpose, motive, 1);
        }
    }
}

/// Returns how many interactions landed in a counter.
fn tally_interactions(counters: &mut CounterSet, interactions: &[InteractionRecord]) -> usize {
    let mut counted = 0;
    for interaction in interactions {
        match interaction.interaction_type.as_str() {
            "page_view" => {
                if let Some(page) = interaction
                    .page_url
                    .as_deref()
                    .and_then(normalize::canonical_page)
                {
                    counters.add(Dimension::Page, page, 1);
                    counted += 1;
                }
            }
            "search" => {
                if let Some(term) = interaction.search_query().and_then(normalize::search_term) {
                    counters.add(Dimension::Search, term, 1);
                    counted += 1;
                }
            }
            _ => {}
        }
    }
    counted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::EligibleSubjects;
    use crate::error::StoreError;
    use crate::models::{ConsentRecord, GeoFilter, Period};
    use crate::store::{Snapshot, SnapshotStore};
    use chrono::{TimeZone, Utc};

    fn period() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
        .unwrap()
    }

    fn tourist(id: &str, state: &str, motives: &[&str]) -> ProfileRecord {
        ProfileRecord {
            subject_id: id.to_string(),
            user_type: Some("turista".to_string()),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1),
            gender: Some("F".to_string()),
            country: Some("Brasil".to_string()),
            state: Some(state.to_string()),
            city: None,
            travel_motives: motives.iter().map(|m| m.to_string()).collect(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap(),
        }
    }

    fn consent(id: &str) -> ConsentRecord {
        ConsentRecord {
            subject_id: id.to_string(),
            given: true,
            granted_at: None,
            revoked_at: None,
        }
    }

    fn interaction(id: &str, kind: &str, url: Option<&str>, query: Option<&str>) -> InteractionRecord {
        InteractionRecord {
            subject_id: id.to_string(),
            interaction_type: kind.to_string(),
            page_url: url.map(String::from),
            metadata: query.map(|q| serde_json::json!({ "search_query": q })),
            created_at: Utc.with_ymd_and_hms(2025, 1, 11, 9, 0, 0).unwrap(),
        }
    }

    fn snapshot() -> Snapshot {
        let mut resident = tourist("r1", "SP", &["Negócios"]);
        resident.user_type = Some("resident".to_string());
        Snapshot {
            consents: vec![consent("t1"), consent("t2"), consent("r1")],
            profiles: vec![
                tourist("t1", "sp", &["Lazer", " lazer "]),
                tourist("t2", "MS", &["Ecoturismo"]),
                tourist("t3", "RJ", &["Lazer"]),
                resident,
            ],
            interactions: vec![
                interaction("t1", "page_view", Some("/descubrams/eventos/9"), None),
                interaction("t2", "page_view", Some("/admin"), None),
                interaction("t2", "search", None, Some("  Bonito ")),
                interaction("t3", "search", None, Some("bonito")),
            ],
        }
    }

    async fn run(store: SnapshotStore, eligible: &EligibleSubjects, geo: Option<&GeoFilter>) -> AdapterOutcome {
        let adapter = PlatformAdapter::new(Arc::new(store));
        let ctx = FetchContext {
            period: period(),
            eligible,
            geo,
            as_of: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        };
        adapter.fetch_fragment(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_counts_only_consented_subjects() {
        let data = snapshot();
        let eligible = EligibleSubjects::from_records(&data.consents);
        let outcome = run(SnapshotStore::new(data), &eligible, None).await;

        let AdapterOutcome::Fragment(fragment) = outcome else {
            panic!("expected a fragment");
        };
        let counters = fragment.counters();
        assert_eq!(fragment.record_count(), 3);
        assert_eq!(counters.demographics.age_groups.get("26-35"), Some(&3));
        assert_eq!(counters.demographics.gender.get("female"), Some(&3));
        // Resident r1 contributes demographics but no origin or motive.
        assert_eq!(counters.origins.states.get("SP"), Some(&1));
        assert_eq!(counters.origins.states.get("MS"), Some(&1));
        assert!(counters.origins.states.get("RJ").is_none());
        assert_eq!(counters.travel_purposes.get("lazer"), Some(&2));
        assert!(counters.travel_purposes.get("negócios").is_none());
        // t3 has no consent: its search is not read.
        assert_eq!(counters.interactions.searches.get("bonito"), Some(&1));
        assert_eq!(counters.interactions.pages.get("/eventos"), Some(&1));
        assert_eq!(counters.interactions.pages.len(), 1);
    }

    #[tokio::test]
    async fn test_geo_filter_limits_profiles() {
        let data = snapshot();
        let eligible = EligibleSubjects::from_records(&data.consents);
        let geo = GeoFilter {
            state: Some("ms".to_string()),
            city: None,
        };
        let outcome = run(SnapshotStore::new(data), &eligible, Some(&geo)).await;

        let AdapterOutcome::Fragment(fragment) = outcome else {
            panic!("expected a fragment");
        };
        assert_eq!(fragment.record_count(), 1);
        assert_eq!(fragment.counters().origins.states.len(), 1);
    }

    #[tokio::test]
    async fn test_no_consent_means_unavailable() {
        let outcome = run(SnapshotStore::new(snapshot()), &EligibleSubjects::default(), None).await;
        assert!(matches!(
            outcome,
            AdapterOutcome::Unavailable(ref u) if u.reason == UnavailableReason::NoRecords
        ));
    }

    struct BrokenProfiles;

    #[async_trait]
    impl DataStore for BrokenProfiles {
        fn name(&self) -> &str {
            "broken"
        }
        async fn consents(&self) -> Result<Vec<ConsentRecord>, StoreError> {
            Ok(vec![consent("t1")])
        }
        async fn completed_profiles(&self, _: &Period) -> Result<Vec<ProfileRecord>, StoreError> {
            Err(StoreError::Timeout(5))
        }
        async fn interactions(
            &self,
            _: &[String],
            _: &Period,
        ) -> Result<Vec<InteractionRecord>, StoreError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let adapter = PlatformAdapter::new(Arc::new(BrokenProfiles));
        let eligible = EligibleSubjects::from_records(&[consent("t1")]);
        let ctx = FetchContext {
            period: period(),
            eligible: &eligible,
            geo: None,
            as_of: Utc::now(),
        };
        let result = adapter.fetch_fragment(&ctx).await;
        assert!(matches!(result, Err(PipelineError::DataStore(_))));
    }
}
