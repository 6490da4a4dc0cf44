//! Consent resolution.
//!
//! The eligibility rule lives here and only here: a subject may be aggregated
//! iff it holds at least one consent with `given = true` and no revocation.
//! Consent is read fresh on every run.

use crate::error::PipelineError;
use crate::models::ConsentRecord;
use crate::store::DataStore;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, error, info};

/// Subject ids cleared for aggregation in the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibleSubjects {
    ids: BTreeSet<String>,
}

impl EligibleSubjects {
    /// Applies the eligibility rule to raw consent entries.
    pub fn from_records(records: &[ConsentRecord]) -> Self {
        let ids = records
            .iter()
            .filter(|r| r.given && r.revoked_at.is_none())
            .map(|r| r.subject_id.clone())
            .collect();
        Self { ids }
    }

    pub fn contains(&self, subject_id: &str) -> bool {
        self.ids.contains(subject_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Reads the consent table and resolves the eligible set.
///
/// An unreachable or slow store is fatal: without consent information no
/// subject data may be used at all.
pub async fn resolve(
    store: &dyn DataStore,
    timeout: Duration,
) -> Result<EligibleSubjects, PipelineError> {
    let records = match tokio::time::timeout(timeout, store.consents()).await {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            error!("Consent store '{}' failed: {}", store.name(), e);
            return Err(PipelineError::ConsentStore(e.to_string()));
        }
        Err(_) => {
            error!(
                "Consent store '{}' did not answer within {}s",
                store.name(),
                timeout.as_secs()
            );
            return Err(PipelineError::ConsentStore(format!(
                "no answer within {}s",
                timeout.as_secs()
            )));
        }
    };

    let eligible = EligibleSubjects::from_records(&records);
    debug!("{} consent entries read", records.len());
    info!("{} subjects eligible for aggregation", eligible.len());
    Ok(eligible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{InteractionRecord, Period, ProfileRecord};
    use crate::store::{Snapshot, SnapshotStore};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn consent(id: &str, given: bool, revoked: bool) -> ConsentRecord {
        ConsentRecord {
            subject_id: id.to_string(),
            given,
            granted_at: None,
            revoked_at: revoked.then(|| Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap()),
        }
    }

    struct DownStore;

    #[async_trait]
    impl DataStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }
        async fn consents(&self) -> Result<Vec<ConsentRecord>, StoreError> {
            Err(StoreError::Status {
                status: 503,
                body: "maintenance".to_string(),
            })
        }
        async fn completed_profiles(&self, _: &Period) -> Result<Vec<ProfileRecord>, StoreError> {
            Ok(vec![])
        }
        async fn interactions(
            &self,
            _: &[String],
            _: &Period,
        ) -> Result<Vec<InteractionRecord>, StoreError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_rule_requires_given_and_not_revoked() {
        let eligible = EligibleSubjects::from_records(&[
            consent("a", true, false),
            consent("b", false, false),
            consent("c", true, true),
        ]);
        assert!(eligible.contains("a"));
        assert!(!eligible.contains("b"));
        assert!(!eligible.contains("c"));
        assert_eq!(eligible.len(), 1);
    }

    #[test]
    fn test_any_active_consent_is_enough() {
        let eligible =
            EligibleSubjects::from_records(&[consent("a", true, true), consent("a", true, false)]);
        assert!(eligible.contains("a"));
    }

    #[test]
    fn test_revocation_after_period_still_excludes() {
        // Requested January; revoked in March; run happens now.
        let revoked_at = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert!(revoked_at < Utc::now() - ChronoDuration::days(1));

        let eligible = EligibleSubjects::from_records(&[ConsentRecord {
            subject_id: "late".to_string(),
            given: true,
            granted_at: Some(Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()),
            revoked_at: Some(revoked_at),
        }]);
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_applies_rule_to_current_rows() {
        let store = SnapshotStore::new(Snapshot {
            consents: vec![consent("a", true, false), consent("b", true, false)],
            ..Snapshot::default()
        });
        let first = resolve(&store, Duration::from_secs(1)).await.unwrap();
        assert!(first.contains("a") && first.contains("b"));
        assert_eq!(first.len(), 2);

        let revoked = SnapshotStore::new(Snapshot {
            consents: vec![consent("a", true, false), consent("b", true, true)],
            ..Snapshot::default()
        });
        let second = resolve(&revoked, Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let result = resolve(&DownStore, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(PipelineError::ConsentStore(_))));
    }
}
